//! Multi-pass name matcher

use super::tables::{normalize_name, MatcherTables};
use super::{MatchPass, MatchResult};
use crate::catalog::CanonicalEntry;
use std::collections::{HashMap, HashSet};

/// Names shorter than this skip the fuzzy passes.
const MIN_FUZZY_LEN: usize = 4;

struct IndexedEntry<'a> {
    entry: &'a CanonicalEntry,
    lower_name: String,
}

/// Resolves detected workload names to catalog entries.
///
/// Entries are indexed in a canonical order (lowercase name, then name) so
/// the result and its ordering never depend on how the catalog was stored.
pub struct NameMatcher<'a> {
    entries: Vec<IndexedEntry<'a>>,
    first_by_lower: HashMap<String, usize>,
    tables: MatcherTables,
}

impl<'a> NameMatcher<'a> {
    pub fn new(entries: &'a [CanonicalEntry], tables: MatcherTables) -> Self {
        let mut indexed: Vec<IndexedEntry<'a>> = entries
            .iter()
            .map(|entry| IndexedEntry {
                entry,
                lower_name: entry.name.to_lowercase(),
            })
            .collect();
        indexed.sort_by(|a, b| {
            a.lower_name
                .cmp(&b.lower_name)
                .then_with(|| a.entry.name.cmp(&b.entry.name))
                .then_with(|| {
                    a.entry
                        .compatibility_matrix_url
                        .cmp(&b.entry.compatibility_matrix_url)
                })
        });

        let mut first_by_lower = HashMap::with_capacity(indexed.len());
        for (idx, item) in indexed.iter().enumerate() {
            first_by_lower.entry(item.lower_name.clone()).or_insert(idx);
        }

        Self {
            entries: indexed,
            first_by_lower,
            tables,
        }
    }

    pub fn with_default_tables(entries: &'a [CanonicalEntry]) -> Self {
        Self::new(entries, MatcherTables::default())
    }

    /// Run the passes in order and return the output of the first one that
    /// matches anything.
    pub fn find(&self, detected_name: &str) -> MatchResult<'a> {
        let mut lower = detected_name.to_lowercase();

        if let Some(canonical) = self.tables.alias_for(&lower) {
            lower = canonical.to_string();
            if let Some(entry) = self.exact(&lower) {
                return MatchResult::from_pass(MatchPass::Alias, vec![entry]);
            }
        }

        if let Some(entry) = self.exact(&lower) {
            return MatchResult::from_pass(MatchPass::Exact, vec![entry]);
        }

        let normalized = normalize_name(detected_name);
        if normalized != lower {
            if let Some(entry) = self.exact(&normalized) {
                return MatchResult::from_pass(MatchPass::Normalized, vec![entry]);
            }
        }

        let stripped = self.tables.strip_role_suffix(&normalized);
        if let Some(core) = stripped {
            if let Some(entry) = self.exact(core) {
                return MatchResult::from_pass(MatchPass::RoleStripped, vec![entry]);
            }
        }
        let core = stripped.unwrap_or(&normalized);

        if normalized.chars().count() < MIN_FUZZY_LEN {
            return MatchResult::none();
        }

        for candidate in [lower.as_str(), normalized.as_str(), core] {
            let hits = self.forward_prefix(candidate);
            if !hits.is_empty() {
                return MatchResult::from_pass(MatchPass::ForwardPrefix, hits);
            }
        }

        let hits = self.reverse_prefix(&normalized);
        if !hits.is_empty() {
            return MatchResult::from_pass(MatchPass::ReversePrefix, hits);
        }

        if core.split_whitespace().count() >= 2 {
            let hits = self.word_subset(core);
            return MatchResult::from_pass(MatchPass::WordSubset, hits);
        }

        MatchResult::none()
    }

    fn exact(&self, lower: &str) -> Option<&'a CanonicalEntry> {
        self.first_by_lower
            .get(lower)
            .map(|&idx| self.entries[idx].entry)
    }

    /// Catalog names that start with the candidate plus a separator.
    fn forward_prefix(&self, candidate: &str) -> Vec<&'a CanonicalEntry> {
        self.entries
            .iter()
            .filter(|item| has_separated_prefix(&item.lower_name, candidate))
            .map(|item| item.entry)
            .collect()
    }

    /// Catalog names that are themselves a separated prefix of the detected name.
    fn reverse_prefix(&self, normalized: &str) -> Vec<&'a CanonicalEntry> {
        self.entries
            .iter()
            .filter(|item| item.lower_name.chars().count() >= MIN_FUZZY_LEN)
            .filter(|item| has_separated_prefix(normalized, &item.lower_name))
            .map(|item| item.entry)
            .collect()
    }

    fn word_subset(&self, core: &str) -> Vec<&'a CanonicalEntry> {
        self.entries
            .iter()
            .filter(|item| {
                let words: HashSet<&str> = item.lower_name.split_whitespace().collect();
                core.split_whitespace().all(|w| words.contains(w))
            })
            .map(|item| item.entry)
            .collect()
    }
}

fn has_separated_prefix(text: &str, prefix: &str) -> bool {
    text.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with(' ') || rest.starts_with('-'))
}
