//! kaddons core engine
//!
//! This crate reconciles workload names detected in a cluster against a
//! canonical addon catalog, derives Kubernetes compatibility verdicts from
//! stored version-support data, and prunes fetched documentation into a
//! bounded excerpt for the external interpretation step.

pub mod catalog;
pub mod compat;
pub mod eol;
pub mod evidence;
pub mod matching;
pub mod pipeline;
pub mod report;
pub mod validate;
pub mod version;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

pub use catalog::{CanonicalEntry, Catalog, DetectedWorkload};
pub use compat::{CompatibilityVerdict, StoredResolution, VersionCompatibilityResolver};
pub use eol::{EolCycle, EolField, EolStatus};
pub use evidence::{EvidencePruner, PruneBudget, PrunedEvidence};
pub use matching::{MatchPass, MatchResult, MatcherTables, NameMatcher};
pub use pipeline::{PipelineConfig, ResolutionPipeline};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Tri-state compatibility value.
///
/// Serialized as the strings `"true"`, `"false"` and `"unknown"`. Input is
/// accepted as a boolean, a string or null; anything unrecognised becomes
/// `Indeterminate` so "insufficient evidence" never masquerades as a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TriState {
    Yes,
    No,
    #[default]
    Indeterminate,
}

impl TriState {
    pub fn is_yes(&self) -> bool {
        matches!(self, TriState::Yes)
    }

    pub fn is_no(&self) -> bool {
        matches!(self, TriState::No)
    }

    pub fn is_indeterminate(&self) -> bool {
        matches!(self, TriState::Indeterminate)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TriState::Yes => "true",
            TriState::No => "false",
            TriState::Indeterminate => "unknown",
        }
    }

    fn from_text(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "true" => TriState::Yes,
            "false" => TriState::No,
            _ => TriState::Indeterminate,
        }
    }
}

impl From<bool> for TriState {
    fn from(value: bool) -> Self {
        if value {
            TriState::Yes
        } else {
            TriState::No
        }
    }
}

impl fmt::Display for TriState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TriState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TriState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TriStateVisitor;

        impl<'de> Visitor<'de> for TriStateVisitor {
            type Value = TriState;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a boolean, a string or null")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<TriState, E> {
                Ok(TriState::from(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<TriState, E> {
                Ok(TriState::from_text(v))
            }

            fn visit_i64<E: de::Error>(self, _: i64) -> Result<TriState, E> {
                Ok(TriState::Indeterminate)
            }

            fn visit_u64<E: de::Error>(self, _: u64) -> Result<TriState, E> {
                Ok(TriState::Indeterminate)
            }

            fn visit_f64<E: de::Error>(self, _: f64) -> Result<TriState, E> {
                Ok(TriState::Indeterminate)
            }

            fn visit_unit<E: de::Error>(self) -> Result<TriState, E> {
                Ok(TriState::Indeterminate)
            }

            fn visit_none<E: de::Error>(self) -> Result<TriState, E> {
                Ok(TriState::Indeterminate)
            }
        }

        deserializer.deserialize_any(TriStateVisitor)
    }
}

/// Where a verdict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Stored compatibility data in the catalog
    Stored,
    /// External interpretation of fetched evidence
    Runtime,
    /// Local fallback when nothing else produced a verdict
    Local,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Stored => write!(f, "stored"),
            DataSource::Runtime => write!(f, "runtime"),
            DataSource::Local => write!(f, "local"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tristate() {
        assert!(TriState::Yes.is_yes());
        assert!(TriState::No.is_no());
        assert!(TriState::Indeterminate.is_indeterminate());
    }

    #[test]
    fn test_tristate_serializes_as_strings() {
        let json = serde_json::to_string(&vec![TriState::Yes, TriState::No, TriState::Indeterminate]).unwrap();
        assert_eq!(json, r#"["true","false","unknown"]"#);
    }

    #[test]
    fn test_tristate_accepts_booleans_strings_and_null() {
        let parsed: Vec<TriState> =
            serde_json::from_str(r#"[true, false, "true", "FALSE", "unknown", null, "maybe", 1]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                TriState::Yes,
                TriState::No,
                TriState::Yes,
                TriState::No,
                TriState::Indeterminate,
                TriState::Indeterminate,
                TriState::Indeterminate,
                TriState::Indeterminate,
            ]
        );
    }

    #[test]
    fn test_data_source_lowercase() {
        assert_eq!(serde_json::to_string(&DataSource::Runtime).unwrap(), r#""runtime""#);
    }
}
