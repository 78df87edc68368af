use std::fmt;
use std::rc::Rc;

use crate::revision::{Revision, RevisionClock};
use crate::TagError;

/// Index of a tag in a validator's tag arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(u32);

impl TagId {
    pub const CONSTANT: TagId = TagId(0);
    pub const VOLATILE: TagId = TagId(1);
    pub const CURRENT: TagId = TagId(2);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tag#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Dirtyable,
    Updatable,
    Combinator,
    Constant,
    Volatile,
    Current,
}

#[derive(Debug, Clone)]
pub(crate) enum Subtag {
    None,
    One(TagId),
    Many(Rc<[TagId]>),
}

#[derive(Debug, Clone)]
struct TagSlot {
    kind: TagKind,
    revision: Revision,
    last_checked: Revision,
    last_value: Revision,
    is_updating: bool,
    subtag: Subtag,
    subtag_buffer: Option<Revision>,
    allow_cycles: bool,
}

impl TagSlot {
    fn new(kind: TagKind) -> Self {
        Self {
            kind,
            revision: Revision::INITIAL,
            last_checked: Revision::INITIAL,
            last_value: Revision::INITIAL,
            is_updating: false,
            subtag: Subtag::None,
            subtag_buffer: None,
            allow_cycles: false,
        }
    }
}

/// Storage for every tag created through a validator. Tags are never freed.
#[derive(Debug, Clone)]
pub(crate) struct TagArena {
    slots: Vec<TagSlot>,
}

impl TagArena {
    pub(crate) fn new() -> Self {
        let mut arena = Self { slots: Vec::new() };
        arena.alloc(TagSlot::new(TagKind::Constant));
        arena.alloc(TagSlot::new(TagKind::Volatile));
        arena.alloc(TagSlot::new(TagKind::Current));
        arena
    }

    fn alloc(&mut self, slot: TagSlot) -> TagId {
        let id = TagId(self.slots.len() as u32);
        self.slots.push(slot);
        id
    }

    pub(crate) fn create(&mut self, kind: TagKind) -> TagId {
        self.alloc(TagSlot::new(kind))
    }

    pub(crate) fn create_combinator(&mut self, tags: Vec<TagId>) -> TagId {
        let mut slot = TagSlot::new(TagKind::Combinator);
        slot.subtag = Subtag::Many(tags.into());
        self.alloc(slot)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn kind(&self, tag: TagId) -> TagKind {
        self.slots[tag.index()].kind
    }

    pub(crate) fn subtag(&self, tag: TagId) -> Subtag {
        self.slots[tag.index()].subtag.clone()
    }

    pub(crate) fn allow_cycles(&mut self, tag: TagId) {
        self.slots[tag.index()].allow_cycles = true;
    }

    /// Computes the tag's current value, reusing `last_value` when nothing has been
    /// checked since the clock last moved.
    pub(crate) fn compute(
        &mut self,
        tag: TagId,
        clock: &mut RevisionClock,
        assertions: bool,
    ) -> Result<Revision, TagError> {
        let idx = tag.index();
        match self.slots[idx].kind {
            TagKind::Volatile => return Ok(Revision::VOLATILE),
            TagKind::Current => return Ok(clock.current()),
            _ => {}
        }

        let current = clock.current();
        let slot = &mut self.slots[idx];
        if slot.is_updating {
            if assertions && !slot.allow_cycles {
                return Err(TagError::Cycle { tag });
            }
            slot.last_checked = clock.bump();
        } else if slot.last_checked != current {
            slot.is_updating = true;
            slot.last_checked = current;
            let computed = self.compute_from_subtags(tag, clock, assertions);
            let slot = &mut self.slots[idx];
            slot.is_updating = false;
            slot.last_value = computed?;
            log::trace!("computed {tag} = {}", slot.last_value);
        }

        Ok(self.slots[idx].last_value)
    }

    fn compute_from_subtags(
        &mut self,
        tag: TagId,
        clock: &mut RevisionClock,
        assertions: bool,
    ) -> Result<Revision, TagError> {
        let idx = tag.index();
        let revision = self.slots[idx].revision;
        match self.slots[idx].subtag.clone() {
            Subtag::None => Ok(revision),
            Subtag::Many(subtags) => {
                let mut revision = revision;
                for sub in subtags.iter() {
                    revision = revision.max_with(self.compute(*sub, clock, assertions)?);
                }
                Ok(revision)
            }
            Subtag::One(sub) => {
                let value = self.compute(sub, clock, assertions)?;
                let slot = &mut self.slots[idx];
                if !value.is_volatile() && slot.subtag_buffer == Some(value) {
                    Ok(revision.max_with(slot.last_value))
                } else {
                    slot.subtag_buffer = None;
                    Ok(revision.max_with(value))
                }
            }
        }
    }

    /// Replaces an updatable tag's subtag. The new subtag's value is buffered so that
    /// adopting an older-but-larger revision does not back-date the parent.
    pub(crate) fn update(
        &mut self,
        tag: TagId,
        subtag: TagId,
        clock: &mut RevisionClock,
        assertions: bool,
    ) -> Result<(), TagError> {
        let kind = self.kind(tag);
        if assertions && kind != TagKind::Updatable {
            return Err(TagError::NotUpdatable { tag, kind });
        }

        if subtag == TagId::CONSTANT {
            self.slots[tag.index()].subtag = Subtag::None;
        } else {
            let buffered = self.compute(subtag, clock, assertions)?;
            let slot = &mut self.slots[tag.index()];
            slot.subtag_buffer = Some(buffered);
            slot.subtag = Subtag::One(subtag);
        }
        Ok(())
    }

    pub(crate) fn check_dirtyable(&self, tag: TagId) -> Result<(), TagError> {
        let kind = self.kind(tag);
        match kind {
            TagKind::Dirtyable | TagKind::Updatable => Ok(()),
            _ => Err(TagError::NotDirtyable { tag, kind }),
        }
    }

    pub(crate) fn set_revision(&mut self, tag: TagId, revision: Revision) {
        self.slots[tag.index()].revision = revision;
    }
}
