//! Stored-data compatibility resolver
//!
//! Precedence, first success wins:
//! 1. direct matrix match on the best-scoring key
//! 2. threshold fallback ("this version or newer") over matrix floors
//! 3. min/max platform bounds
//!
//! Matrix keys are always visited in sorted order so the verdict never
//! depends on map iteration order.

use super::keys::{is_threshold_key, key_ordering_tuple, score_key, threshold_floor, KeyMatch};
use super::{cite_source, CompatibilityVerdict, StoredResolution};
use crate::catalog::CanonicalEntry;
use crate::version::{compare_platform_versions, normalize_platform_version, VersionTuple};
use crate::{DataSource, TriState};
use std::cmp::Ordering;
use std::collections::HashMap;

pub const NO_STORED_DATA_NOTE: &str = "No stored compatibility data for this version.";

type Matrix = HashMap<String, Vec<String>>;

/// Evaluates a catalog entry's stored compatibility data.
#[derive(Debug, Default, Clone, Copy)]
pub struct VersionCompatibilityResolver;

impl VersionCompatibilityResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(
        &self,
        entry: &CanonicalEntry,
        installed_version: &str,
        target_platform_version: &str,
    ) -> StoredResolution {
        let target = normalize_platform_version(target_platform_version);
        let source = entry.source_url();
        let matrix = &entry.compatibility_matrix;

        if let Some((key, versions)) = self.direct_match(matrix, installed_version) {
            let supported = lists_platform(versions, &target);
            let note = if supported {
                format!(
                    "Stored compatibility matrix: version {} supports Kubernetes {}.",
                    key, target
                )
            } else {
                format!(
                    "Stored compatibility matrix: version {} supports Kubernetes {}, not {}.",
                    key,
                    versions.join(", "),
                    target
                )
            };
            tracing::debug!("{}: direct matrix key {} (supported: {})", entry.name, key, supported);
            let mut verdict =
                CompatibilityVerdict::new(TriState::from(supported), note, DataSource::Stored);
            verdict.matched_key = Some(key.to_string());
            verdict.latest_compatible_version =
                latest_compatible_key(matrix, &target, Some(key)).map(str::to_string);
            return StoredResolution::Verdict(verdict.cite(source));
        }

        if let Some((key, floor)) = self.threshold_match(matrix, installed_version, &target) {
            let note = format!(
                "Stored compatibility matrix: installed {} meets threshold {} (>= {}) which supports Kubernetes {}.",
                installed_version, key, floor, target
            );
            tracing::debug!("{}: threshold matrix key {}", entry.name, key);
            let mut verdict = CompatibilityVerdict::new(TriState::Yes, note, DataSource::Stored);
            verdict.matched_key = Some(key.to_string());
            return StoredResolution::Verdict(verdict.cite(source));
        }

        if let Some(verdict) = resolve_bounds(entry, &target) {
            tracing::debug!("{}: resolved from min/max bounds", entry.name);
            return StoredResolution::Verdict(verdict.cite(source));
        }

        StoredResolution::Undetermined {
            note: cite_source(NO_STORED_DATA_NOTE, source),
        }
    }

    /// Best-scoring key for the installed version. Ties keep the first key
    /// in sorted order.
    pub fn direct_match<'m>(
        &self,
        matrix: &'m Matrix,
        installed_version: &str,
    ) -> Option<(&'m str, &'m Vec<String>)> {
        let mut best: Option<(KeyMatch, &'m str, &'m Vec<String>)> = None;
        for (key, versions) in sorted_rows(matrix) {
            let Some(score) = score_key(key, installed_version) else {
                continue;
            };
            if best.map_or(true, |(top, _, _)| score > top) {
                best = Some((score, key, versions));
            }
        }
        best.map(|(_, key, versions)| (key, versions))
    }

    /// Closest threshold floor at or below the installed version whose row
    /// lists the target. Only used when the matrix has threshold-style keys.
    pub fn threshold_match<'m>(
        &self,
        matrix: &'m Matrix,
        installed_version: &str,
        target: &str,
    ) -> Option<(&'m str, VersionTuple)> {
        if !matrix.keys().any(|k| is_threshold_key(k)) {
            return None;
        }
        let installed = VersionTuple::parse_installed(installed_version)?;

        let mut best: Option<(&'m str, VersionTuple)> = None;
        for (key, versions) in sorted_rows(matrix) {
            let Some(floor) = threshold_floor(key) else {
                continue;
            };
            if floor.compare(&installed) == Ordering::Greater || !lists_platform(versions, target) {
                continue;
            }
            let better = best
                .as_ref()
                .map_or(true, |(_, top)| floor.compare(top) == Ordering::Greater);
            if better {
                best = Some((key, floor));
            }
        }
        best
    }
}

/// Highest key (numerically) whose row lists the target, optionally
/// skipping one key. Ties keep the first key in sorted order.
pub fn latest_compatible_key<'m>(
    matrix: &'m Matrix,
    target: &str,
    exclude: Option<&str>,
) -> Option<&'m str> {
    let target = normalize_platform_version(target);
    let mut best: Option<(&'m str, VersionTuple)> = None;
    for (key, versions) in sorted_rows(matrix) {
        if Some(key) == exclude || !lists_platform(versions, &target) {
            continue;
        }
        let Some(order) = key_ordering_tuple(key) else {
            continue;
        };
        let better = best
            .as_ref()
            .map_or(true, |(_, top)| order.compare(top) == Ordering::Greater);
        if better {
            best = Some((key, order));
        }
    }
    best.map(|(key, _)| key)
}

fn sorted_rows(matrix: &Matrix) -> Vec<(&str, &Vec<String>)> {
    let mut rows: Vec<(&str, &Vec<String>)> =
        matrix.iter().map(|(k, v)| (k.as_str(), v)).collect();
    rows.sort_by(|a, b| a.0.cmp(b.0));
    rows
}

fn lists_platform(versions: &[String], target: &str) -> bool {
    versions
        .iter()
        .any(|v| normalize_platform_version(v) == target)
}

fn resolve_bounds(entry: &CanonicalEntry, target: &str) -> Option<CompatibilityVerdict> {
    let min = entry
        .min_platform_version
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let max = entry
        .max_platform_version
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let above_min = min.and_then(|m| compare_platform_versions(target, m).map(|o| (m, o.is_ge())));
    let below_max = max.and_then(|m| compare_platform_versions(target, m).map(|o| (m, o.is_le())));
    if above_min.is_none() && below_max.is_none() {
        return None;
    }

    let compatible = above_min.map_or(true, |(_, ok)| ok) && below_max.map_or(true, |(_, ok)| ok);
    let range = match (above_min, below_max) {
        (Some((lo, _)), Some((hi, _))) => format!("{} to {}", lo, hi),
        (Some((lo, _)), None) => format!("{} and newer", lo),
        (None, Some((hi, _))) => format!("up to {}", hi),
        (None, None) => String::new(),
    };
    let note = if compatible {
        format!("Stored version bounds: Kubernetes {} is within {}.", target, range)
    } else {
        format!("Stored version bounds: Kubernetes {} is outside {}.", target, range)
    };
    Some(CompatibilityVerdict::new(
        TriState::from(compatible),
        note,
        DataSource::Stored,
    ))
}
