//! Compatibility report

use crate::catalog::{CanonicalEntry, DetectedWorkload};
use crate::compat::CompatibilityVerdict;
use crate::{CoreError, CoreResult, DataSource, TriState};
use serde::{Deserialize, Serialize};

/// Verdict for one matched workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonReport {
    pub name: String,
    pub namespace: String,
    pub installed_version: String,
    /// Catalog entry the workload was matched to
    pub canonical_name: String,
    pub compatible: TriState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_compatible_version: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
    pub data_source: DataSource,
}

impl AddonReport {
    pub fn new(workload: &DetectedWorkload, entry: &CanonicalEntry, verdict: CompatibilityVerdict) -> Self {
        Self {
            name: workload.name.clone(),
            namespace: workload.namespace.clone(),
            installed_version: workload.installed_version.clone(),
            canonical_name: entry.name.clone(),
            compatible: verdict.compatible,
            latest_compatible_version: verdict.latest_compatible_version,
            note: verdict.note,
            data_source: verdict.data_source,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub compatible: usize,
    pub incompatible: usize,
    pub unknown: usize,
}

impl ReportSummary {
    pub fn from_addons(addons: &[AddonReport]) -> Self {
        addons.iter().fold(
            Self {
                total: addons.len(),
                ..Default::default()
            },
            |mut summary, addon| {
                match addon.compatible {
                    TriState::Yes => summary.compatible += 1,
                    TriState::No => summary.incompatible += 1,
                    TriState::Indeterminate => summary.unknown += 1,
                }
                summary
            },
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityReport {
    pub k8s_version: String,
    pub addons: Vec<AddonReport>,
    pub summary: ReportSummary,
}

impl CompatibilityReport {
    pub fn new(k8s_version: impl Into<String>, addons: Vec<AddonReport>) -> Self {
        let summary = ReportSummary::from_addons(&addons);
        Self {
            k8s_version: k8s_version.into(),
            addons,
            summary,
        }
    }

    pub fn to_json(&self) -> CoreResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::Config(format!("JSON serialization failed: {}", e)))
    }
}
