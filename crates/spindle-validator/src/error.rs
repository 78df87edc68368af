use std::fmt::Display;

use crate::tag::{TagId, TagKind};

/// Tag-discipline violations.
///
/// Apart from `NoOpenFrame` these are only produced while assertions are enabled
/// (see [`crate::ValidatorConfig::assertions`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    Cycle { tag: TagId },
    NotDirtyable { tag: TagId, kind: TagKind },
    NotUpdatable { tag: TagId, kind: TagKind },
    ConsumedInTransaction { message: String },
    NoOpenFrame,
    CacheNotComputed { label: Option<String> },
}

impl std::error::Error for TagError {}

impl Display for TagError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagError::Cycle { tag } => write!(f, "Cycles in tags are not allowed ({tag})"),
            TagError::NotDirtyable { tag, kind } => write!(
                f,
                "Attempted to dirty a tag that was not dirtyable ({tag} is {kind:?})"
            ),
            TagError::NotUpdatable { tag, kind } => write!(
                f,
                "Attempted to update a tag that was not updatable ({tag} is {kind:?})"
            ),
            TagError::ConsumedInTransaction { message } => f.write_str(message),
            TagError::NoOpenFrame => {
                f.write_str("attempted to close a tracking frame, but one was not open")
            }
            TagError::CacheNotComputed { label } => {
                write!(
                    f,
                    "is_const can only be used on a cache once get_value has been called at least once"
                )?;
                if let Some(label) = label {
                    write!(f, " (cache: {label})")?;
                }
                Ok(())
            }
        }
    }
}
