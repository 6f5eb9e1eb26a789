//! Token estimation.
//!
//! The transcript only ever asks "how many tokens is this text?", so the
//! policy is a single-method trait. The default is the classic heuristic of
//! one token per four bytes, rounded down.

/// Maps message text to an approximate token cost. Must be pure and deterministic.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, content: &str) -> usize;
}

impl<F> TokenEstimator for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn estimate(&self, content: &str) -> usize {
        self(content)
    }
}

/// `len(content) / chars_per_token`, integer division.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharRatioEstimator {
    chars_per_token: usize,
}

impl CharRatioEstimator {
    pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

    /// A ratio of zero is treated as one so the estimate never divides by zero.
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }

    pub fn chars_per_token(&self) -> usize {
        self.chars_per_token
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CHARS_PER_TOKEN)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, content: &str) -> usize {
        content.len() / self.chars_per_token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(CharRatioEstimator::default().estimate(""), 0);
    }

    #[test]
    fn rounds_down() {
        let est = CharRatioEstimator::default();
        assert_eq!(est.estimate("hi"), 0);
        assert_eq!(est.estimate("test"), 1);
        assert_eq!(est.estimate("hello"), 1);
        assert_eq!(est.estimate(&"a".repeat(100)), 25);
    }

    #[test]
    fn counts_bytes_not_chars() {
        // "é" is two bytes
        assert_eq!(CharRatioEstimator::new(2).estimate("éé"), 2);
    }

    #[test]
    fn zero_ratio_is_clamped() {
        let est = CharRatioEstimator::new(0);
        assert_eq!(est.chars_per_token(), 1);
        assert_eq!(est.estimate("abc"), 3);
    }

    #[test]
    fn closures_are_estimators() {
        let words = |text: &str| text.split_whitespace().count();
        assert_eq!(words.estimate("one two three"), 3);
    }
}
