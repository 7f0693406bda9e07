//! Detected-name to canonical-entry matching

pub mod matcher;
pub mod tables;

pub use matcher::NameMatcher;
pub use tables::{normalize_name, MatcherTables};

use crate::catalog::CanonicalEntry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The pass that produced a match, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPass {
    Alias,
    Exact,
    Normalized,
    RoleStripped,
    ForwardPrefix,
    ReversePrefix,
    WordSubset,
}

impl fmt::Display for MatchPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MatchPass::Alias => "alias",
            MatchPass::Exact => "exact",
            MatchPass::Normalized => "normalized",
            MatchPass::RoleStripped => "role-stripped",
            MatchPass::ForwardPrefix => "forward-prefix",
            MatchPass::ReversePrefix => "reverse-prefix",
            MatchPass::WordSubset => "word-subset",
        };
        f.write_str(label)
    }
}

/// Entries produced by a single pass. Empty means "not a known addon".
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult<'a> {
    pub entries: Vec<&'a CanonicalEntry>,
    pub pass: Option<MatchPass>,
}

impl<'a> MatchResult<'a> {
    pub fn none() -> Self {
        Self {
            entries: Vec::new(),
            pass: None,
        }
    }

    fn from_pass(pass: MatchPass, entries: Vec<&'a CanonicalEntry>) -> Self {
        if entries.is_empty() {
            return Self::none();
        }
        Self {
            entries,
            pass: Some(pass),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn first(&self) -> Option<&'a CanonicalEntry> {
        self.entries.first().copied()
    }

    pub fn names(&self) -> Vec<&'a str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }
}
