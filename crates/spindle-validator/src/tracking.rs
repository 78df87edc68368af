use std::collections::HashSet;

use crate::tag::TagId;

/// The tags consumed while one tracking frame was open.
#[derive(Debug, Default)]
pub(crate) struct Tracker {
    seen: HashSet<TagId>,
    tags: Vec<TagId>,
    last: Option<TagId>,
}

impl Tracker {
    pub(crate) fn add(&mut self, tag: TagId) {
        if self.seen.insert(tag) {
            self.tags.push(tag);
        }
        self.last = Some(tag);
    }

    /// What the frame collapses to: nothing read, exactly one tag, or all of them.
    pub(crate) fn into_combined(self) -> Combined {
        match (self.tags.len(), self.last) {
            (0, _) | (_, None) => Combined::Constant,
            (1, Some(last)) => Combined::Single(last),
            _ => Combined::Many(self.tags),
        }
    }
}

pub(crate) enum Combined {
    Constant,
    Single(TagId),
    Many(Vec<TagId>),
}

/// The stack of open frames. `None` entries are untracked regions.
#[derive(Debug, Default)]
pub(crate) struct TrackingStack {
    current: Option<Tracker>,
    open: Vec<Option<Tracker>>,
}

impl TrackingStack {
    pub(crate) fn begin(&mut self) {
        self.open.push(self.current.take());
        self.current = Some(Tracker::default());
    }

    pub(crate) fn end(&mut self) -> Option<Combined> {
        let restored = self.open.pop()?;
        let finished = std::mem::replace(&mut self.current, restored);
        Some(finished.map(Tracker::into_combined).unwrap_or(Combined::Constant))
    }

    pub(crate) fn begin_untracked(&mut self) {
        self.open.push(self.current.take());
    }

    pub(crate) fn end_untracked(&mut self) {
        self.current = self.open.pop().flatten();
    }

    pub(crate) fn is_tracking(&self) -> bool {
        self.current.is_some()
    }

    pub(crate) fn depth(&self) -> usize {
        self.open.len()
    }

    /// Records `tag` against the innermost frame; returns whether a frame was open.
    pub(crate) fn consume(&mut self, tag: TagId) -> bool {
        match &mut self.current {
            Some(tracker) => {
                tracker.add(tag);
                true
            }
            None => false,
        }
    }
}
