//! Evidence preparation for the interpretation step

pub mod pruner;
pub mod tier;

pub use pruner::EvidencePruner;
pub use tier::{classify_matrix_tier, MatrixTier};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Line and character ceilings for a pruned excerpt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneBudget {
    /// Byte ceiling on the emitted text
    pub max_chars: usize,
    pub max_lines: usize,
}

impl Default for PruneBudget {
    fn default() -> Self {
        Self {
            max_chars: 6000,
            max_lines: 80,
        }
    }
}

impl PruneBudget {
    pub fn new(max_chars: usize, max_lines: usize) -> Self {
        Self {
            max_chars,
            max_lines,
        }
    }
}

/// A bounded excerpt of a fetched document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrunedEvidence(String);

impl PrunedEvidence {
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn line_count(&self) -> usize {
        if self.0.is_empty() {
            0
        } else {
            self.0.lines().count()
        }
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PrunedEvidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Longest prefix of `text` no longer than `max_bytes` that ends on a
/// character boundary.
pub fn truncate_on_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundary() {
        assert_eq!(truncate_on_char_boundary("hello 😀 world", 8), "hello ");
        assert_eq!(truncate_on_char_boundary("hello 😀 world", 10), "hello 😀");
        assert_eq!(truncate_on_char_boundary("short", 100), "short");
        assert_eq!(truncate_on_char_boundary("ééé", 1), "");
    }

    #[test]
    fn test_default_budget() {
        let budget = PruneBudget::default();
        assert_eq!(budget.max_chars, 6000);
        assert_eq!(budget.max_lines, 80);
    }
}
