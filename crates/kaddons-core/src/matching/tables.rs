//! Alias and role-suffix tables for the name matcher

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("nodelocaldns", "nodelocal dnscache"),
    ("node-local-dns", "nodelocal dnscache"),
];

const DEFAULT_ROLE_SUFFIXES: &[&str] = &[
    "node",
    "controller",
    "master",
    "replica",
    "replicas",
    "server",
    "agent",
    "webhook",
    "init",
    "snapshotter",
    "operator",
    "scheduler",
    "driver",
];

/// Immutable lookup data handed to [`super::NameMatcher`] at construction.
///
/// Aliases cover irregular names that normalization cannot derive. Keys and
/// values are lowercase. Role suffixes mark a workload as a sub-component of
/// a parent addon (`ebs-csi-node` is part of `ebs-csi`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherTables {
    pub aliases: HashMap<String, String>,
    pub role_suffixes: HashSet<String>,
}

impl Default for MatcherTables {
    fn default() -> Self {
        Self {
            aliases: DEFAULT_ALIASES
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
            role_suffixes: DEFAULT_ROLE_SUFFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl MatcherTables {
    /// Tables with no aliases and no role suffixes.
    pub fn empty() -> Self {
        Self {
            aliases: HashMap::new(),
            role_suffixes: HashSet::new(),
        }
    }

    pub fn with_alias(mut self, detected: &str, canonical: &str) -> Self {
        self.aliases
            .insert(detected.to_lowercase(), canonical.to_lowercase());
        self
    }

    pub fn with_role_suffix(mut self, suffix: &str) -> Self {
        self.role_suffixes.insert(suffix.to_lowercase());
        self
    }

    pub fn alias_for(&self, lower: &str) -> Option<&str> {
        self.aliases.get(lower).map(String::as_str)
    }

    /// Drop the last word of a normalized name if it is a role suffix.
    /// Single-word names are never stripped.
    pub fn strip_role_suffix<'n>(&self, normalized: &'n str) -> Option<&'n str> {
        let idx = normalized.rfind(' ')?;
        if idx == 0 {
            return None;
        }
        let last = &normalized[idx + 1..];
        self.role_suffixes
            .contains(last)
            .then(|| &normalized[..idx])
    }
}

/// Lowercase, hyphens to spaces, collapse whitespace, `amazon ` to `aws `.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase().replace('-', " ");
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.strip_prefix("amazon ") {
        Some(rest) => format!("aws {}", rest),
        None => collapsed,
    }
}
