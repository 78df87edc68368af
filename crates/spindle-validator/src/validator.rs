use spindle_contracts::limits;

use crate::property::{EntityId, PropertyTags};
use crate::revision::{Revision, RevisionClock};
use crate::tag::{Subtag, TagArena, TagId, TagKind};
use crate::tracking::{Combined, TrackingStack};
use crate::transaction::{consumed_message, DefaultTransactionEnv, TransactionEnv, TransactionState};
use crate::TagError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// Enables the tag-discipline checks (cycles, tag kinds, write-after-read).
    pub assertions: bool,
    /// Every transaction starts out reporting write-after-read through
    /// [`TransactionEnv::deprecate`] instead of failing.
    pub deprecate_mutations: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            assertions: cfg!(debug_assertions),
            deprecate_mutations: false,
        }
    }
}

impl ValidatorConfig {
    /// Defaults, with `SPINDLE_TAG_ASSERTIONS` applied when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(assertions) = limits::tag_assertions_override() {
            config.assertions = assertions;
        }
        config
    }
}

/// Owner of the revision clock, the tag arena, the tracking frame stack and the
/// property tag registry.
///
/// All reactive state lives here; nothing is global, so independent validators never
/// observe each other's revisions.
pub struct Validator {
    config: ValidatorConfig,
    clock: RevisionClock,
    tags: TagArena,
    tracking: TrackingStack,
    transaction: TransactionState,
    env: Box<dyn TransactionEnv>,
    properties: PropertyTags,
    property_did_change: Option<Box<dyn FnMut()>>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    pub fn new() -> Self {
        Self::with_config(ValidatorConfig::from_env())
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        Self::with_clock(config, RevisionClock::new())
    }

    pub fn with_clock(config: ValidatorConfig, clock: RevisionClock) -> Self {
        Self {
            config,
            clock,
            tags: TagArena::new(),
            tracking: TrackingStack::default(),
            transaction: TransactionState::new(config.deprecate_mutations),
            env: Box::new(DefaultTransactionEnv),
            properties: PropertyTags::default(),
            property_did_change: None,
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn current_revision(&self) -> Revision {
        self.clock.current()
    }

    pub fn bump(&mut self) -> Revision {
        self.clock.bump()
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    // Tags

    pub fn create_tag(&mut self) -> TagId {
        self.tags.create(TagKind::Dirtyable)
    }

    pub fn create_updatable_tag(&mut self) -> TagId {
        self.tags.create(TagKind::Updatable)
    }

    pub fn kind(&self, tag: TagId) -> TagKind {
        self.tags.kind(tag)
    }

    pub fn is_const_tag(&self, tag: TagId) -> bool {
        tag == TagId::CONSTANT
    }

    /// The tag's current revision snapshot.
    pub fn value(&mut self, tag: TagId) -> Result<Revision, TagError> {
        self.tags.compute(tag, &mut self.clock, self.config.assertions)
    }

    /// Whether nothing reachable from `tag` changed since `snapshot` was taken.
    pub fn validate(&mut self, tag: TagId, snapshot: Revision) -> Result<bool, TagError> {
        let value = self.value(tag)?;
        Ok(!value.is_volatile() && !snapshot.is_volatile() && snapshot >= value)
    }

    pub fn dirty(&mut self, tag: TagId) -> Result<(), TagError> {
        if self.config.assertions {
            self.tags.check_dirtyable(tag)?;
            self.assert_tag_not_consumed(tag, None, None, false)?;
        }
        self.dirty_unchecked(tag);
        Ok(())
    }

    fn dirty_unchecked(&mut self, tag: TagId) {
        let revision = self.clock.bump();
        self.tags.set_revision(tag, revision);
    }

    pub fn update(&mut self, tag: TagId, subtag: TagId) -> Result<(), TagError> {
        self.tags
            .update(tag, subtag, &mut self.clock, self.config.assertions)
    }

    /// Combines tags into one: constants are dropped, an empty set is the constant
    /// tag, a single tag is returned as is.
    pub fn combine(&mut self, tags: &[TagId]) -> TagId {
        let optimized: Vec<TagId> = tags
            .iter()
            .copied()
            .filter(|tag| *tag != TagId::CONSTANT)
            .collect();
        match optimized.as_slice() {
            [] => TagId::CONSTANT,
            [single] => *single,
            _ => self.tags.create_combinator(optimized),
        }
    }

    /// Lets `tag` be computed re-entrantly without a cycle error.
    pub fn allow_cycles(&mut self, tag: TagId) {
        self.tags.allow_cycles(tag);
    }

    // Tracking frames

    pub fn begin_track_frame(&mut self) {
        self.tracking.begin();
    }

    pub fn end_track_frame(&mut self) -> Result<TagId, TagError> {
        match self.tracking.end().ok_or(TagError::NoOpenFrame)? {
            Combined::Constant => Ok(TagId::CONSTANT),
            Combined::Single(tag) => Ok(tag),
            Combined::Many(tags) => Ok(self.combine(&tags)),
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.is_tracking()
    }

    pub fn frame_depth(&self) -> usize {
        self.tracking.depth()
    }

    /// Registers a read of `tag` against the innermost open frame, if any.
    pub fn consume(&mut self, tag: TagId) {
        if self.tracking.consume(tag) && self.config.assertions {
            self.mark_tag_as_consumed(tag);
        }
    }

    /// Runs `f` in a fresh frame (and transaction) and returns the combined tag of
    /// everything it read.
    pub fn track<F>(&mut self, debugging_context: Option<&str>, f: F) -> Result<TagId, TagError>
    where
        F: FnOnce(&mut Validator),
    {
        self.begin_track_frame();
        self.run_in_transaction(debugging_context, f);
        self.end_track_frame()
    }

    /// Runs `f` with tracking suspended, hiding its reads from every open frame.
    pub fn untrack<R>(&mut self, f: impl FnOnce(&mut Validator) -> R) -> R {
        self.tracking.begin_untracked();
        let result = f(self);
        self.tracking.end_untracked();
        result
    }

    // Autotracking transactions

    pub fn set_transaction_env(&mut self, env: Box<dyn TransactionEnv>) {
        self.env = env;
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_active()
    }

    /// Runs `f` inside an autotracking transaction, joining the open one if present.
    /// Inside the transaction, writing any tag that was read is an error (or a
    /// deprecation when `deprecate_mutations` is configured).
    pub fn run_in_transaction<R>(
        &mut self,
        debugging_context: Option<&str>,
        f: impl FnOnce(&mut Validator) -> R,
    ) -> R {
        if !self.config.assertions {
            return f(self);
        }
        let scope = self.transaction.enter(debugging_context);
        let result = f(self);
        self.transaction.exit(scope);
        result
    }

    /// Runs `f` with write-after-read downgraded to a deprecation for the current
    /// transaction. A nested `run_in_transaction` switches back to hard errors.
    pub fn deprecate_mutations_in_transaction<R>(
        &mut self,
        f: impl FnOnce(&mut Validator) -> R,
    ) -> R {
        let previous = self.transaction.set_deprecate(true);
        let result = f(self);
        self.transaction.set_deprecate(previous);
        result
    }

    fn mark_tag_as_consumed(&mut self, tag: TagId) {
        if !self.transaction.mark(tag) {
            return;
        }
        match self.tags.subtag(tag) {
            Subtag::None => {}
            Subtag::One(sub) => self.mark_tag_as_consumed(sub),
            Subtag::Many(subs) => {
                for sub in subs.iter() {
                    self.mark_tag_as_consumed(*sub);
                }
            }
        }
    }

    /// Fails (or deprecation-warns) when `tag` was read earlier in the open transaction.
    pub fn assert_tag_not_consumed(
        &mut self,
        tag: TagId,
        target: Option<&str>,
        key: Option<&str>,
        force_hard_error: bool,
    ) -> Result<(), TagError> {
        if !self.config.assertions {
            return Ok(());
        }
        let Some(context) = self.transaction.consumed_context(tag) else {
            return Ok(());
        };
        let message = consumed_message(self.env.as_ref(), context, target, key);
        if self.transaction.deprecating() && !force_hard_error {
            self.env.deprecate(&message);
            Ok(())
        } else {
            self.env
                .assert(&message)
                .map_err(|message| TagError::ConsumedInTransaction { message })
        }
    }

    // Property tags

    /// Allocates a new trackable entity; `label` names it in diagnostics.
    pub fn new_entity(&mut self, label: impl Into<String>) -> EntityId {
        self.properties.new_entity(label.into())
    }

    pub fn entity_label(&self, entity: EntityId) -> Option<&str> {
        self.properties.label(entity)
    }

    /// The tag for `(entity, key)`, created on first access.
    pub fn tag_for(&mut self, entity: EntityId, key: &str) -> TagId {
        if let Some(tag) = self.properties.get(entity, key) {
            return tag;
        }
        let tag = self.create_updatable_tag();
        self.properties.insert(entity, key, tag);
        tag
    }

    pub fn tag_meta_for(&self, entity: EntityId) -> Vec<(String, TagId)> {
        self.properties.tags_of(entity)
    }

    /// Dirties the `(entity, key)` tag if one was ever handed out.
    pub fn dirty_tag_for(&mut self, entity: EntityId, key: &str) -> Result<(), TagError> {
        let Some(tag) = self.properties.get(entity, key) else {
            return Ok(());
        };
        if self.config.assertions {
            let label = self.properties.label(entity).map(str::to_string);
            self.assert_tag_not_consumed(tag, label.as_deref(), Some(key), false)?;
        }
        self.dirty_unchecked(tag);
        if let Some(callback) = self.property_did_change.as_mut() {
            callback();
        }
        Ok(())
    }

    pub fn set_property_did_change(&mut self, callback: impl FnMut() + 'static) {
        self.property_did_change = Some(Box::new(callback));
    }
}
