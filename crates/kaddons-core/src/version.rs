//! Numeric version tuples.
//!
//! All version ordering goes through [`VersionTuple`]. Components are
//! compared left to right as integers and a missing trailing component counts
//! as zero, so "1.10" sorts after "1.9" and "1.30" equals "1.30.0".

use std::cmp::Ordering;
use std::fmt;

/// Dot-separated integer version, e.g. `1.15.3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionTuple(Vec<u64>);

impl VersionTuple {
    /// Parse a strictly numeric dotted token. Empty segments or any
    /// non-digit character reject the whole token.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }
        raw.split('.')
            .map(|segment| {
                if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                    None
                } else {
                    segment.parse::<u64>().ok()
                }
            })
            .collect::<Option<Vec<_>>>()
            .map(VersionTuple)
    }

    /// Parse an installed version as reported by a workload: a leading `v`
    /// is dropped and any pre-release or build suffix (`-rc1`,
    /// `-eksbuild.28`, `+meta`) is ignored.
    pub fn parse_installed(raw: &str) -> Option<Self> {
        let cleaned = strip_v(raw.trim());
        let core = cleaned.split(['-', '+']).next().unwrap_or_default();
        Self::parse(core)
    }

    pub fn components(&self) -> &[u64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Component-wise prefix test; equal tuples count as a prefix.
    pub fn is_prefix_of(&self, other: &VersionTuple) -> bool {
        self.len() <= other.len() && other.0[..self.len()] == self.0[..]
    }

    /// Compare with zero-padding of the shorter tuple.
    pub fn compare(&self, other: &VersionTuple) -> Ordering {
        let width = self.len().max(other.len());
        for idx in 0..width {
            let left = self.0.get(idx).copied().unwrap_or(0);
            let right = other.0.get(idx).copied().unwrap_or(0);
            match left.cmp(&right) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }

    /// Truncate to at most major.minor.
    pub fn major_minor(&self) -> VersionTuple {
        VersionTuple(self.0.iter().take(2).copied().collect())
    }
}

impl fmt::Display for VersionTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        f.write_str(&parts.join("."))
    }
}

/// Drop one leading `v` or `V`.
pub fn strip_v(raw: &str) -> &str {
    raw.strip_prefix('v')
        .or_else(|| raw.strip_prefix('V'))
        .unwrap_or(raw)
}

/// Reduce a platform version to its `major.minor` text form:
/// `v1.28.5` → `1.28`, `1.30` → `1.30`, `1` → `1`. A trailing `+` on a
/// component (as some providers report the minor) is dropped.
pub fn normalize_platform_version(raw: &str) -> String {
    let cleaned = strip_v(raw.trim());
    cleaned
        .split('.')
        .take(2)
        .map(|part| part.trim_end_matches('+'))
        .collect::<Vec<_>>()
        .join(".")
}

/// Compare two platform versions on major.minor only. `None` when either
/// side is not numeric.
pub fn compare_platform_versions(left: &str, right: &str) -> Option<Ordering> {
    let left = VersionTuple::parse(&normalize_platform_version(left))?;
    let right = VersionTuple::parse(&normalize_platform_version(right))?;
    Some(left.compare(&right))
}
