//! Message sequence sets.

use super::SeqNum;

/// A message set argument for FETCH, STORE, and friends.
///
/// The same shape serves both sequence-number and UID commands; the command
/// layer decides which interpretation applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceSet {
    /// A single number.
    Single(SeqNum),
    /// An inclusive range.
    Range(SeqNum, SeqNum),
    /// From a number through the end of the mailbox.
    RangeFrom(SeqNum),
    /// The last message (`*`).
    All,
    /// A comma-joined list of sets.
    Set(Vec<Self>),
}

impl SequenceSet {
    /// A set containing one number; `None` for 0.
    #[must_use]
    pub fn single(n: u32) -> Option<Self> {
        SeqNum::new(n).map(Self::Single)
    }

    /// An inclusive range; `None` if either bound is 0.
    #[must_use]
    pub fn range(start: u32, end: u32) -> Option<Self> {
        Some(Self::Range(SeqNum::new(start)?, SeqNum::new(end)?))
    }

    /// Everything in the mailbox (`1:*`).
    #[must_use]
    pub fn all() -> Self {
        Self::RangeFrom(SeqNum(std::num::NonZeroU32::MIN))
    }
}

impl std::fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(n) => write!(f, "{n}"),
            Self::Range(start, end) => write!(f, "{start}:{end}"),
            Self::RangeFrom(start) => write!(f, "{start}:*"),
            Self::All => write!(f, "*"),
            Self::Set(items) => {
                let parts: Vec<_> = items.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn zero_bounds_are_rejected() {
        assert!(SequenceSet::single(0).is_none());
        assert!(SequenceSet::range(0, 5).is_none());
        assert!(SequenceSet::range(1, 0).is_none());
    }

    #[test]
    fn all_renders_open_range() {
        assert_eq!(SequenceSet::all().to_string(), "1:*");
    }
}
