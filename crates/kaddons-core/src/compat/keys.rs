//! Matrix key parsing and scoring
//!
//! A matrix key names an addon version, a version family or a version range.
//! Keys that do not begin with a digit after cleaning (`master`, `main`,
//! `cis-1.6`, `≥0.18.x`) are labels, not versions, and never match.

use crate::version::{strip_v, VersionTuple};

/// How a key matched the installed version. Declaration order is the
/// preference order: a later variant beats an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyMatch {
    /// `A-B` with A <= installed <= B
    Range,
    /// Same major.minor as a 3-component key, installed at or above it
    PatchLine,
    /// `X.Y.x` whose base is a prefix of the installed version
    Wildcard,
    /// Key is a strict component prefix of the installed version
    Prefix,
    Exact,
}

/// Trim, lowercase and drop a leading `v`.
pub fn clean_key(raw: &str) -> String {
    strip_v(raw.trim().to_lowercase().as_str()).to_string()
}

fn starts_with_digit(text: &str) -> bool {
    text.chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// Split a two-sided numeric range like `v2.0.0-v2.1.3`. Both sides must be
/// dotted numbers, so `0.3.4-7` is not a range.
pub fn parse_range(key: &str) -> Option<(VersionTuple, VersionTuple)> {
    let idx = key.find('-')?;
    if idx == 0 || idx + 1 >= key.len() {
        return None;
    }
    let left = strip_v(key[..idx].trim());
    let right = strip_v(key[idx + 1..].trim());
    if !left.contains('.') || !right.contains('.') {
        return None;
    }
    Some((VersionTuple::parse(left)?, VersionTuple::parse(right)?))
}

/// Score a matrix key against an installed version.
pub fn score_key(raw_key: &str, installed: &str) -> Option<KeyMatch> {
    let key = clean_key(raw_key);
    if !starts_with_digit(&key) {
        return None;
    }

    let installed_clean = clean_key(installed);
    if key == installed_clean {
        return Some(KeyMatch::Exact);
    }

    let current = VersionTuple::parse_installed(installed)?;

    if let Some(key_version) = VersionTuple::parse(&key) {
        if key_version.components() == current.components() {
            return Some(KeyMatch::Exact);
        }
        if key_version.is_prefix_of(&current) {
            return Some(KeyMatch::Prefix);
        }
        if is_patch_line(&key_version, &current) {
            return Some(KeyMatch::PatchLine);
        }
        return None;
    }

    if let Some(base) = key.strip_suffix(".x") {
        return VersionTuple::parse(base)
            .filter(|base| base.is_prefix_of(&current))
            .map(|_| KeyMatch::Wildcard);
    }

    let (low, high) = parse_range(&key)?;
    let in_range = low.compare(&current).is_le() && current.compare(&high).is_le();
    in_range.then_some(KeyMatch::Range)
}

fn is_patch_line(key: &VersionTuple, current: &VersionTuple) -> bool {
    key.len() == 3
        && current.len() >= 2
        && key.components()[..2] == current.components()[..2]
        && current.compare(key).is_ge()
}

/// Keys written in a "this version or newer" convention.
pub fn is_threshold_key(raw_key: &str) -> bool {
    let key = raw_key.trim().to_lowercase();
    key.starts_with(">=") || key.contains(".x") || key.ends_with('+')
}

/// Leading numeric floor of a key, ignoring `>=`, `v`, `+`, `.x` and any
/// pre-release suffix.
pub fn threshold_floor(raw_key: &str) -> Option<VersionTuple> {
    let lowered = raw_key.trim().to_lowercase();
    let key = lowered.strip_prefix(">=").unwrap_or(&lowered).trim();
    let key = strip_v(key).trim_end_matches('+');
    let key = key.strip_suffix(".x").unwrap_or(key);
    let key = key.split('-').next().unwrap_or_default();
    VersionTuple::parse(key)
}

/// Ordering tuple used when picking the newest key: the upper bound of a
/// range, otherwise the key's floor.
pub fn key_ordering_tuple(raw_key: &str) -> Option<VersionTuple> {
    let key = clean_key(raw_key);
    if !starts_with_digit(&key) {
        return None;
    }
    match parse_range(&key) {
        Some((_, high)) => Some(high),
        None => threshold_floor(&key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_key_forms() {
        for (key, installed, want) in [
            ("1.15", "1.15", Some(KeyMatch::Exact)),
            ("1.15", "1.15.0", Some(KeyMatch::Prefix)),
            ("1.15", "1.15.3", Some(KeyMatch::Prefix)),
            ("1.9.x", "1.9.5", Some(KeyMatch::Wildcard)),
            ("1.9.x", "1.9", Some(KeyMatch::Wildcard)),
            ("1.29.X", "1.29.3", Some(KeyMatch::Wildcard)),
            ("1.15", "1.16.0", None),
            ("v1.15", "1.15.0", Some(KeyMatch::Prefix)),
            ("1.30.0", "v1.30.0", Some(KeyMatch::Exact)),
            ("1.30.0", "v1.30", Some(KeyMatch::PatchLine)),
        ] {
            assert_eq!(score_key(key, installed), want, "key {} installed {}", key, installed);
        }
    }

    #[test]
    fn test_non_semver_keys_never_match() {
        for key in ["master", "HEAD", "main", "latest", "cis-1.6", "cis-1.11", "≥0.18.x", "≤0.9.x", ""] {
            assert_eq!(score_key(key, "1.0.0"), None, "key {}", key);
            assert_eq!(score_key(key, "0.18.0"), None, "key {}", key);
        }
    }

    #[test]
    fn test_range_keys() {
        for (key, installed, matched) in [
            ("v2.0.0-v2.1.3", "2.1.0", true),
            ("v2.0.0-v2.1.3", "2.0.0", true),
            ("v2.0.0-v2.1.3", "2.1.3", true),
            ("v2.0.0-v2.1.3", "1.9.0", false),
            ("v2.0.0-v2.1.3", "2.2.0", false),
            ("1.124.17-1.128.3", "1.125.0", true),
            ("1.124.17-1.128.3", "1.124.16", false),
            ("1.124.17-1.128.3", "1.128.4", false),
            ("v0.6.0-v0.12.0", "0.9.0", true),
            ("v0.6.0-v0.12.0", "0.12.0", true),
            ("v0.6.0-v0.12.0", "0.13.0", false),
            ("0.3.4-7", "0.3.5", false),
        ] {
            let got = score_key(key, installed);
            assert_eq!(got.is_some(), matched, "key {} installed {}", key, installed);
            if matched {
                assert_eq!(got, Some(KeyMatch::Range));
            }
        }
    }

    #[test]
    fn test_patch_line() {
        assert_eq!(score_key("v1.11.3", "v1.11.4-eksbuild.28"), Some(KeyMatch::PatchLine));
        assert_eq!(score_key("v1.11.3", "v1.11.2"), None);
        assert_eq!(score_key("v1.11.3", "v1.12.0"), None);
    }

    #[test]
    fn test_prefix_is_component_wise() {
        assert_eq!(score_key("1.1", "1.15.0"), None);
        assert_eq!(score_key("1.1", "1.1.5"), Some(KeyMatch::Prefix));
    }

    #[test]
    fn test_preference_order() {
        assert!(KeyMatch::Exact > KeyMatch::Prefix);
        assert!(KeyMatch::Prefix > KeyMatch::Wildcard);
        assert!(KeyMatch::Wildcard > KeyMatch::PatchLine);
        assert!(KeyMatch::PatchLine > KeyMatch::Range);
    }

    #[test]
    fn test_threshold_detection_and_floor() {
        assert!(is_threshold_key(">= 1.0.5"));
        assert!(is_threshold_key("1.2.x"));
        assert!(is_threshold_key("0.37+"));
        assert!(!is_threshold_key("1.15"));

        assert_eq!(threshold_floor(">= 1.0.5").unwrap().components(), &[1, 0, 5]);
        assert_eq!(threshold_floor("v2.5.0+").unwrap().components(), &[2, 5, 0]);
        assert_eq!(threshold_floor("1.9.x").unwrap().components(), &[1, 9]);
        assert_eq!(threshold_floor("1.0.0-rc.1").unwrap().components(), &[1, 0, 0]);
        assert!(threshold_floor("master").is_none());
    }

    #[test]
    fn test_ordering_tuple_uses_range_upper_bound() {
        assert_eq!(key_ordering_tuple("v2.0.0-v2.1.3").unwrap().components(), &[2, 1, 3]);
        assert_eq!(key_ordering_tuple("1.10").unwrap().components(), &[1, 10]);
        assert!(key_ordering_tuple("main").is_none());
    }
}
