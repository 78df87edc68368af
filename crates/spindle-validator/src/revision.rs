use std::fmt;

/// A stamp from the revision clock.
///
/// `VOLATILE` never validates: any tag reporting it is considered changed on every
/// check, and it absorbs every `max` it takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Revision(u64);

impl Revision {
    pub const CONSTANT: Revision = Revision(0);
    pub const INITIAL: Revision = Revision(1);
    pub const VOLATILE: Revision = Revision(u64::MAX);

    pub const fn new(value: u64) -> Self {
        Revision(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub fn is_volatile(self) -> bool {
        self == Revision::VOLATILE
    }

    pub(crate) fn max_with(self, other: Revision) -> Revision {
        if self.is_volatile() || other.is_volatile() {
            Revision::VOLATILE
        } else {
            Revision(self.0.max(other.0))
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_volatile() {
            f.write_str("volatile")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// The monotonically increasing global revision.
///
/// One clock is owned by each [`crate::Validator`]; a fresh validator starts a fresh
/// clock, which keeps tests isolated from each other.
#[derive(Debug, Clone)]
pub struct RevisionClock {
    current: u64,
}

impl RevisionClock {
    pub fn new() -> Self {
        Self {
            current: Revision::INITIAL.get(),
        }
    }

    pub fn current(&self) -> Revision {
        Revision(self.current)
    }

    /// Advances the clock and returns the new revision.
    pub fn bump(&mut self) -> Revision {
        self.current += 1;
        Revision(self.current)
    }

    pub fn reset(&mut self) {
        self.current = Revision::INITIAL.get();
    }
}

impl Default for RevisionClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volatile_absorbs_max() {
        assert_eq!(Revision::new(7).max_with(Revision::VOLATILE), Revision::VOLATILE);
        assert_eq!(Revision::new(7).max_with(Revision::new(3)), Revision::new(7));
    }

    #[test]
    fn bump_is_strictly_increasing() {
        let mut clock = RevisionClock::new();
        let a = clock.current();
        let b = clock.bump();
        let c = clock.bump();
        assert!(a < b && b < c);
        clock.reset();
        assert_eq!(clock.current(), Revision::INITIAL);
    }
}
