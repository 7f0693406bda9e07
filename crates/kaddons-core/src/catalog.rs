//! Canonical addon catalog and detected workloads

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

static EMBEDDED_CATALOG: &str = include_str!("../data/addons.json");

/// A known addon in the catalog.
///
/// `name` is the matching key. Stored compatibility data is evaluated in
/// strict precedence: the matrix first, then the min/max bounds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository: String,
    /// Where the addon documents its Kubernetes support (the source URL
    /// cited in verdict notes)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compatibility_matrix_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub changelog_location: String,
    /// Addon version key -> supported Kubernetes `X.Y` versions
    #[serde(
        default,
        rename = "kubernetes_compatibility",
        skip_serializing_if = "HashMap::is_empty"
    )]
    pub compatibility_matrix: HashMap<String, Vec<String>>,
    #[serde(
        default,
        rename = "kubernetes_min_version",
        skip_serializing_if = "Option::is_none"
    )]
    pub min_platform_version: Option<String>,
    #[serde(
        default,
        rename = "kubernetes_max_version",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_platform_version: Option<String>,
}

impl CanonicalEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder-style matrix row, mostly for tests and fixtures.
    pub fn with_matrix_row(mut self, key: &str, versions: &[&str]) -> Self {
        self.compatibility_matrix.insert(
            key.to_string(),
            versions.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    pub fn with_bounds(mut self, min: Option<&str>, max: Option<&str>) -> Self {
        self.min_platform_version = min.map(str::to_string);
        self.max_platform_version = max.map(str::to_string);
        self
    }

    pub fn with_source_url(mut self, url: &str) -> Self {
        self.compatibility_matrix_url = url.to_string();
        self
    }

    /// Source URL, if one is recorded.
    pub fn source_url(&self) -> Option<&str> {
        let url = self.compatibility_matrix_url.trim();
        (!url.is_empty()).then_some(url)
    }

    pub fn has_stored_compatibility(&self) -> bool {
        !self.compatibility_matrix.is_empty()
            || self.min_platform_version.as_deref().is_some_and(|v| !v.is_empty())
            || self.max_platform_version.as_deref().is_some_and(|v| !v.is_empty())
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct CatalogFile {
    addons: Vec<CanonicalEntry>,
}

/// Immutable list of canonical entries, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CanonicalEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<CanonicalEntry>) -> Self {
        Self { entries }
    }

    /// The dataset compiled into the binary.
    pub fn embedded() -> CoreResult<Self> {
        Self::from_json(EMBEDDED_CATALOG)
    }

    pub fn from_json(json: &str) -> CoreResult<Self> {
        let file: CatalogFile = serde_json::from_str(json)
            .map_err(|e| CoreError::Catalog(format!("parsing addon catalog: {}", e)))?;
        if file.addons.is_empty() {
            return Err(CoreError::Catalog("addon catalog is empty".to_string()));
        }
        tracing::debug!("Loaded {} catalog entries", file.addons.len());
        Ok(Self::new(file.addons))
    }

    pub fn from_path(path: &Path) -> CoreResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn entries(&self) -> &[CanonicalEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A workload reported by the discovery collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedWorkload {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    /// May be empty when discovery could not determine a version
    #[serde(default, rename = "version", alias = "installed_version")]
    pub installed_version: String,
    #[serde(default)]
    pub source: String,
}

impl DetectedWorkload {
    pub fn new(name: &str, namespace: &str, installed_version: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            installed_version: installed_version.to_string(),
            source: String::new(),
        }
    }

    /// Stable composite key used to order workloads before processing.
    pub fn sort_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.name.to_lowercase(),
            self.namespace.to_lowercase(),
            self.installed_version.to_lowercase()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_catalog_loads() {
        let catalog = Catalog::embedded().unwrap();
        assert!(!catalog.is_empty());
        assert!(catalog.entries().iter().all(|e| !e.name.is_empty()));
    }

    #[test]
    fn test_has_stored_compatibility() {
        assert!(CanonicalEntry::new("a").with_matrix_row("1.5", &["1.28"]).has_stored_compatibility());
        assert!(CanonicalEntry::new("a").with_bounds(Some("1.20"), None).has_stored_compatibility());
        assert!(CanonicalEntry::new("a").with_bounds(None, Some("1.28")).has_stored_compatibility());
        assert!(!CanonicalEntry::new("a").has_stored_compatibility());
    }

    #[test]
    fn test_entry_json_uses_catalog_field_names() {
        let entry = CanonicalEntry::new("cert-manager")
            .with_matrix_row("1.15", &["1.28", "1.29"])
            .with_source_url("https://cert-manager.io/docs/releases/");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"kubernetes_compatibility\""));
        assert!(json.contains("\"compatibility_matrix_url\""));
        assert!(!json.contains("kubernetes_min_version"));
        assert!(!json.contains("project_url"));
    }

    #[test]
    fn test_empty_catalog_is_rejected() {
        assert!(matches!(
            Catalog::from_json(r#"{"addons": []}"#),
            Err(CoreError::Catalog(_))
        ));
        assert!(Catalog::from_json("not json").is_err());
    }

    #[test]
    fn test_workload_accepts_version_field() {
        let parsed: DetectedWorkload =
            serde_json::from_str(r#"{"name":"istio","namespace":"istio-system","version":"1.22.0","source":"deployment"}"#)
                .unwrap();
        assert_eq!(parsed.installed_version, "1.22.0");
        assert_eq!(parsed.sort_key(), "istio|istio-system|1.22.0");
    }
}
