//! Tag-based revision tracking: the revision clock, tag composition, autotracking
//! frames, memoized caches and the per-entity property tag registry.

pub mod cache;
pub mod error;
pub mod property;
pub mod revision;
pub mod tag;
pub mod tracking;
pub mod transaction;
pub mod validator;

pub use cache::{Cache, Memo};
pub use error::TagError;
pub use property::{EntityId, TrackedData};
pub use revision::{Revision, RevisionClock};
pub use tag::{TagId, TagKind};
pub use transaction::{DefaultTransactionEnv, TransactionEnv};
pub use validator::{Validator, ValidatorConfig};
