//! Deterministic compatibility resolution from stored data

pub mod keys;
pub mod resolver;

pub use resolver::VersionCompatibilityResolver;

use crate::{DataSource, TriState};
use serde::{Deserialize, Serialize};

/// Compatibility verdict for one workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityVerdict {
    pub compatible: TriState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_compatible_version: Option<String>,
    #[serde(default)]
    pub note: String,
    pub data_source: DataSource,
    /// Matrix key the verdict was derived from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_key: Option<String>,
}

impl CompatibilityVerdict {
    pub fn new(compatible: TriState, note: impl Into<String>, data_source: DataSource) -> Self {
        Self {
            compatible,
            latest_compatible_version: None,
            note: note.into(),
            data_source,
            matched_key: None,
        }
    }

    pub fn unknown(note: impl Into<String>, data_source: DataSource) -> Self {
        Self::new(TriState::Indeterminate, note, data_source)
    }

    pub fn is_compatible(&self) -> bool {
        self.compatible == TriState::Yes
    }

    pub fn is_incompatible(&self) -> bool {
        self.compatible == TriState::No
    }

    pub fn is_indeterminate(&self) -> bool {
        self.compatible == TriState::Indeterminate
    }

    /// Append ` Source: <url>` when a non-empty URL is known.
    pub fn cite(mut self, source_url: Option<&str>) -> Self {
        self.note = cite_source(&self.note, source_url);
        self
    }
}

/// Append a source citation to a note.
pub fn cite_source(note: &str, source_url: Option<&str>) -> String {
    match source_url.map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) if note.is_empty() => format!("Source: {}", url),
        Some(url) => format!("{} Source: {}", note.trim_end(), url),
        None => note.to_string(),
    }
}

/// Outcome of evaluating stored data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredResolution {
    Verdict(CompatibilityVerdict),
    /// Nothing stored decides this workload; later strategies should try
    Undetermined { note: String },
}

impl StoredResolution {
    pub fn verdict(&self) -> Option<&CompatibilityVerdict> {
        match self {
            StoredResolution::Verdict(v) => Some(v),
            StoredResolution::Undetermined { .. } => None,
        }
    }

    pub fn is_determined(&self) -> bool {
        matches!(self, StoredResolution::Verdict(_))
    }

    /// Collapse to a verdict, using `unknown` when undetermined.
    pub fn into_verdict(self) -> CompatibilityVerdict {
        match self {
            StoredResolution::Verdict(v) => v,
            StoredResolution::Undetermined { note } => {
                CompatibilityVerdict::unknown(note, DataSource::Stored)
            }
        }
    }
}
