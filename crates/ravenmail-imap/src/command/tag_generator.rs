//! Command tag generation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Produces the unique tags that correlate commands with completions.
///
/// Tags are sequential per connection, formatted as `R0`, `R1`, and so on.
/// A 64-bit counter cannot realistically wrap within one session.
#[derive(Debug)]
pub struct TagGenerator {
    counter: AtomicU64,
    prefix: char,
}

impl TagGenerator {
    /// Creates a generator with the given prefix character.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self {
            counter: AtomicU64::new(0),
            prefix,
        }
    }

    /// Generates the next tag.
    #[must_use]
    pub fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}{n}", self.prefix)
    }

    /// Number of tags handed out so far.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('R')
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_sequential() {
        let tags = TagGenerator::default();
        assert_eq!(tags.next(), "R0");
        assert_eq!(tags.next(), "R1");
        assert_eq!(tags.next(), "R2");
        assert_eq!(tags.issued(), 3);
    }

    #[test]
    fn custom_prefix() {
        let tags = TagGenerator::new('T');
        assert_eq!(tags.next(), "T0");
    }

    #[test]
    fn tags_never_repeat() {
        let tags = TagGenerator::default();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(tags.next()));
        }
    }
}
