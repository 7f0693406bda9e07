//! Stored-data diagnostics
//!
//! The resolver treats malformed catalog data as non-matching. This module
//! is where such data is reported instead.

use crate::catalog::CanonicalEntry;
use crate::compat::keys::parse_range;
use crate::evidence::MatrixTier;
use crate::version::{strip_v, VersionTuple};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

static PLATFORM_VERSION_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\d+$").expect("valid version format regex"));

const MATRIX_FIELD: &str = "kubernetes_compatibility";

/// One data-quality problem in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDataProblem {
    pub addon_name: String,
    pub field: String,
    pub value: String,
    pub reason: String,
}

impl StoredDataProblem {
    fn new(entry: &CanonicalEntry, field: impl Into<String>, value: impl Into<String>, reason: &str) -> Self {
        Self {
            addon_name: entry.name.clone(),
            field: field.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

fn is_platform_version(value: &str) -> bool {
    PLATFORM_VERSION_FORMAT.is_match(value)
}

/// Numeric version token as the resolver parses it, e.g. `15`, `1.28` or `2.1.3`.
fn is_numeric_version_token(token: &str) -> bool {
    VersionTuple::parse(token).is_some()
}

/// Whether the stored resolver understands this key form at all.
pub fn is_resolver_supported_key(raw_key: &str) -> bool {
    let key = raw_key.trim().to_lowercase();
    if key.is_empty() {
        return false;
    }
    if parse_range(strip_v(&key)).is_some() {
        return true;
    }

    let key = key.strip_prefix(">=").unwrap_or(&key).trim();
    let key = strip_v(key).trim_end_matches('+');
    if key.is_empty() {
        return false;
    }
    if let Some(base) = key.strip_suffix(".x") {
        return is_numeric_version_token(base);
    }
    let core = match key.find('-') {
        Some(idx) if idx > 0 => &key[..idx],
        _ => key,
    };
    is_numeric_version_token(core)
}

pub fn validate_stored_data(entries: &[CanonicalEntry]) -> Vec<StoredDataProblem> {
    let mut problems = Vec::new();

    for entry in entries {
        let min = entry.min_platform_version.as_deref().unwrap_or_default();
        let max = entry.max_platform_version.as_deref().unwrap_or_default();

        if !min.is_empty() && !is_platform_version(min) {
            problems.push(StoredDataProblem::new(
                entry,
                "kubernetes_min_version",
                min,
                "must match format X.Y (e.g. 1.28)",
            ));
        }
        if !max.is_empty() && !is_platform_version(max) {
            problems.push(StoredDataProblem::new(
                entry,
                "kubernetes_max_version",
                max,
                "must match format X.Y (e.g. 1.28)",
            ));
        }
        if is_platform_version(min) && is_platform_version(max) {
            let ordered = VersionTuple::parse(min)
                .zip(VersionTuple::parse(max))
                .map(|(lo, hi)| lo.compare(&hi).is_le())
                .unwrap_or(true);
            if !ordered {
                problems.push(StoredDataProblem::new(
                    entry,
                    "kubernetes_min_version / kubernetes_max_version",
                    format!("{} / {}", min, max),
                    "min version must not exceed max version",
                ));
            }
        }

        let mut keys: Vec<&String> = entry.compatibility_matrix.keys().collect();
        keys.sort();

        let mut non_empty_keys = 0;
        let mut supported_keys = 0;
        for key in keys {
            if key.trim().is_empty() {
                problems.push(StoredDataProblem::new(
                    entry,
                    MATRIX_FIELD,
                    "(empty key)",
                    "addon version key must be non-empty",
                ));
                continue;
            }
            non_empty_keys += 1;
            if is_resolver_supported_key(key) {
                supported_keys += 1;
            }

            let versions = &entry.compatibility_matrix[key];
            if versions.is_empty() {
                problems.push(StoredDataProblem::new(
                    entry,
                    MATRIX_FIELD,
                    key.as_str(),
                    "K8s version list must be non-empty",
                ));
                continue;
            }
            for version in versions {
                if !is_platform_version(version) {
                    problems.push(StoredDataProblem::new(
                        entry,
                        format!("{}[{}]", MATRIX_FIELD, key),
                        version.as_str(),
                        "K8s version must match format X.Y (e.g. 1.28)",
                    ));
                }
            }
        }
        if non_empty_keys > 0 && supported_keys == 0 {
            problems.push(StoredDataProblem::new(
                entry,
                MATRIX_FIELD,
                "(all keys unsupported)",
                "matrix must contain at least one key format supported by stored resolver",
            ));
        }
    }

    problems
}

/// Render problems as a Markdown table.
pub fn render_problems_markdown(problems: &[StoredDataProblem]) -> String {
    let mut out = String::new();
    writeln!(out, "## Stored data problems ({})\n", problems.len()).ok();
    out.push_str("| Addon | Field | Value | Problem |\n");
    out.push_str("|-------|-------|-------|---------|\n");
    for p in problems {
        writeln!(
            out,
            "| {} | {} | {} | {} |",
            escape_cell(&p.addon_name),
            escape_cell(&p.field),
            escape_cell(&p.value),
            escape_cell(&p.reason)
        )
        .ok();
    }
    out
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

/// A catalog link and the entries/fields that reference it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReference {
    pub addon_name: String,
    pub field: &'static str,
}

/// Collect every URL in the catalog, keyed and ordered by URL.
pub fn collect_links(entries: &[CanonicalEntry]) -> BTreeMap<String, Vec<LinkReference>> {
    let mut links: BTreeMap<String, Vec<LinkReference>> = BTreeMap::new();
    for entry in entries {
        let fields: [(&'static str, &str); 4] = [
            ("project_url", &entry.project_url),
            ("repository", &entry.repository),
            ("compatibility_matrix_url", &entry.compatibility_matrix_url),
            ("changelog_location", &entry.changelog_location),
        ];
        for (field, url) in fields {
            let url = url.trim();
            if url.is_empty() {
                continue;
            }
            links.entry(url.to_string()).or_default().push(LinkReference {
                addon_name: entry.name.clone(),
                field,
            });
        }
    }
    links
}

/// Field whose pages are fetched and classified rather than only probed
pub const MATRIX_URL_FIELD: &str = "compatibility_matrix_url";

/// Which catalog links `validate` checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkMode {
    /// Every link; matrix pages are also classified
    #[default]
    All,
    /// Every link, reachability only
    LinksOnly,
    /// Matrix pages only
    MatrixOnly,
}

/// One unique URL to check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTask {
    pub url: String,
    /// Fetch the page and classify its matrix tier
    pub needs_content: bool,
    pub references: Vec<LinkReference>,
}

/// Unique URLs in the catalog, ordered by URL, filtered by mode.
pub fn link_tasks(entries: &[CanonicalEntry], mode: LinkMode) -> Vec<LinkTask> {
    collect_links(entries)
        .into_iter()
        .filter_map(|(url, references)| {
            let is_matrix = references.iter().any(|r| r.field == MATRIX_URL_FIELD);
            let needs_content = match mode {
                LinkMode::All => is_matrix,
                LinkMode::LinksOnly => false,
                LinkMode::MatrixOnly if is_matrix => true,
                LinkMode::MatrixOnly => return None,
            };
            Some(LinkTask {
                url,
                needs_content,
                references,
            })
        })
        .collect()
}

/// Result of checking one link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Reachable; the tier is set when the page was classified
    Reachable(Option<MatrixTier>),
    Unreachable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenLink {
    pub addon_name: String,
    pub field: &'static str,
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixProblem {
    pub addon_name: String,
    pub url: String,
    pub tier: MatrixTier,
}

/// Broken links and matrix pages without platform data
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkReport {
    pub broken: Vec<BrokenLink>,
    pub matrix_problems: Vec<MatrixProblem>,
}

impl LinkReport {
    /// Pair each task with its outcome. A task with no outcome is broken.
    pub fn new(tasks: &[LinkTask], outcomes: &[LinkOutcome]) -> Self {
        let mut report = LinkReport::default();
        for (index, task) in tasks.iter().enumerate() {
            match outcomes.get(index) {
                None => report.push_broken(task, "missing validation result"),
                Some(LinkOutcome::Unreachable(error)) => report.push_broken(task, error),
                Some(LinkOutcome::Reachable(Some(MatrixTier::NoMatrix))) if task.needs_content => {
                    for reference in task.references.iter().filter(|r| r.field == MATRIX_URL_FIELD) {
                        report.matrix_problems.push(MatrixProblem {
                            addon_name: reference.addon_name.clone(),
                            url: task.url.clone(),
                            tier: MatrixTier::NoMatrix,
                        });
                    }
                }
                Some(LinkOutcome::Reachable(_)) => {}
            }
        }
        report
    }

    fn push_broken(&mut self, task: &LinkTask, error: &str) {
        for reference in &task.references {
            self.broken.push(BrokenLink {
                addon_name: reference.addon_name.clone(),
                field: reference.field,
                url: task.url.clone(),
                error: error.to_string(),
            });
        }
    }

    pub fn is_clean(&self) -> bool {
        self.broken.is_empty() && self.matrix_problems.is_empty()
    }

    /// Markdown tables for broken links and missing matrix data.
    pub fn render_markdown(&self, mode: LinkMode) -> String {
        if self.is_clean() {
            return match mode {
                LinkMode::LinksOnly => "All links are healthy.\n".to_string(),
                _ => "All validations passed.\n".to_string(),
            };
        }

        let mut out = String::new();
        if !self.broken.is_empty() {
            let addons: BTreeSet<&str> = self.broken.iter().map(|b| b.addon_name.as_str()).collect();
            writeln!(
                out,
                "Found **{}** broken links across **{}** addons.\n",
                self.broken.len(),
                addons.len()
            )
            .ok();
            out.push_str("| Addon Name | Field | URL | Error |\n");
            out.push_str("|------------|-------|-----|-------|\n");
            for b in &self.broken {
                writeln!(
                    out,
                    "| {} | `{}` | {} | {} |",
                    escape_cell(&b.addon_name),
                    b.field,
                    escape_cell(&b.url),
                    escape_cell(&b.error)
                )
                .ok();
            }
        }
        if !self.matrix_problems.is_empty() {
            if !self.broken.is_empty() {
                out.push('\n');
            }
            writeln!(
                out,
                "Found **{}** addons with missing K8s matrix data.\n",
                self.matrix_problems.len()
            )
            .ok();
            out.push_str("| Addon Name | URL | Status |\n");
            out.push_str("|------------|-----|--------|\n");
            for p in &self.matrix_problems {
                writeln!(out, "| {} | {} | {} |", escape_cell(&p.addon_name), escape_cell(&p.url), p.tier).ok();
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_catalog_is_clean() {
        let catalog = crate::Catalog::embedded().unwrap();
        let problems = validate_stored_data(catalog.entries());
        assert!(problems.is_empty(), "{:?}", problems);
    }

    #[test]
    fn test_bad_bounds() {
        let entry = CanonicalEntry::new("a").with_bounds(Some("1.30"), Some("1.2x"));
        let problems = validate_stored_data(&[entry]);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].field, "kubernetes_max_version");

        let entry = CanonicalEntry::new("a").with_bounds(Some("1.30"), Some("1.28"));
        let problems = validate_stored_data(&[entry]);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].reason, "min version must not exceed max version");
    }

    #[test]
    fn test_min_max_compare_numerically() {
        let entry = CanonicalEntry::new("a").with_bounds(Some("1.9"), Some("1.10"));
        assert!(validate_stored_data(&[entry]).is_empty());
    }

    #[test]
    fn test_matrix_problems() {
        let entry = CanonicalEntry::new("a")
            .with_matrix_row("", &["1.28"])
            .with_matrix_row("1.2", &[])
            .with_matrix_row("1.3", &["1.28", "v1.29", "1.30.1"]);
        let problems = validate_stored_data(&[entry]);
        let reasons: Vec<(&str, &str)> = problems
            .iter()
            .map(|p| (p.field.as_str(), p.value.as_str()))
            .collect();
        assert_eq!(
            reasons,
            vec![
                ("kubernetes_compatibility", "(empty key)"),
                ("kubernetes_compatibility", "1.2"),
                ("kubernetes_compatibility[1.3]", "v1.29"),
                ("kubernetes_compatibility[1.3]", "1.30.1"),
            ]
        );
    }

    #[test]
    fn test_all_keys_unsupported() {
        let entry = CanonicalEntry::new("a")
            .with_matrix_row("master", &["1.28"])
            .with_matrix_row("main", &["1.29"]);
        let problems = validate_stored_data(&[entry]);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].value, "(all keys unsupported)");
    }

    #[test]
    fn test_supported_key_forms() {
        for key in ["1.15", "15", "v2", "v1.15.3", "1.2.x", ">= 1.0.5", "v2.5.0+", "v2.0.0-v2.1.3", "1.5.0-rc1"] {
            assert!(is_resolver_supported_key(key), "key {}", key);
        }
        for key in ["master", "1.x.x", "", "cis-1.6", ">=", "latest"] {
            assert!(!is_resolver_supported_key(key), "key {}", key);
        }
    }

    #[test]
    fn test_markdown_escapes_pipes() {
        let entry = CanonicalEntry::new("a|b").with_bounds(Some("x"), None);
        let md = render_problems_markdown(&validate_stored_data(&[entry]));
        assert!(md.contains("| a\\|b | kubernetes_min_version | x |"));
    }

    #[test]
    fn test_collect_links_groups_by_url() {
        let mut a = CanonicalEntry::new("a").with_source_url("https://x.io/docs");
        a.project_url = "https://x.io".to_string();
        let b = CanonicalEntry::new("b").with_source_url("https://x.io/docs");
        let links = collect_links(&[a, b]);
        assert_eq!(links.len(), 2);
        assert_eq!(links["https://x.io/docs"].len(), 2);
        assert_eq!(links["https://x.io"][0].field, "project_url");
    }

    fn linked_catalog() -> Vec<CanonicalEntry> {
        let mut a = CanonicalEntry::new("a").with_source_url("https://a.io/compat");
        a.project_url = "https://a.io".to_string();
        a.repository = "https://github.com/a/a".to_string();
        let mut b = CanonicalEntry::new("b").with_source_url("https://b.io/docs");
        b.changelog_location = "https://a.io".to_string();
        vec![a, b]
    }

    #[test]
    fn test_link_tasks_cover_every_field() {
        let tasks = link_tasks(&linked_catalog(), LinkMode::All);
        let urls: Vec<(&str, bool)> = tasks.iter().map(|t| (t.url.as_str(), t.needs_content)).collect();
        assert_eq!(
            urls,
            vec![
                ("https://a.io", false),
                ("https://a.io/compat", true),
                ("https://b.io/docs", true),
                ("https://github.com/a/a", false),
            ]
        );
        let shared: Vec<&str> = tasks[0].references.iter().map(|r| r.field).collect();
        assert_eq!(shared, vec!["project_url", "changelog_location"]);
    }

    #[test]
    fn test_link_modes() {
        let links_only = link_tasks(&linked_catalog(), LinkMode::LinksOnly);
        assert_eq!(links_only.len(), 4);
        assert!(links_only.iter().all(|t| !t.needs_content));

        let matrix_only = link_tasks(&linked_catalog(), LinkMode::MatrixOnly);
        let urls: Vec<&str> = matrix_only.iter().map(|t| t.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.io/compat", "https://b.io/docs"]);
    }

    #[test]
    fn test_link_report_tables() {
        let tasks = link_tasks(&linked_catalog(), LinkMode::All);
        let outcomes = vec![
            LinkOutcome::Unreachable("HTTP 404".to_string()),
            LinkOutcome::Reachable(Some(MatrixTier::NoMatrix)),
            LinkOutcome::Reachable(Some(MatrixTier::PartialMatrix)),
        ];
        let report = LinkReport::new(&tasks, &outcomes);

        // The shared URL is reported once per referencing field; the
        // fourth task has no outcome at all.
        let broken: Vec<(&str, &str, &str)> = report
            .broken
            .iter()
            .map(|b| (b.addon_name.as_str(), b.field, b.error.as_str()))
            .collect();
        assert_eq!(
            broken,
            vec![
                ("a", "project_url", "HTTP 404"),
                ("b", "changelog_location", "HTTP 404"),
                ("a", "repository", "missing validation result"),
            ]
        );
        assert_eq!(report.matrix_problems.len(), 1);
        assert_eq!(report.matrix_problems[0].url, "https://a.io/compat");

        let md = report.render_markdown(LinkMode::All);
        assert!(md.contains("Found **3** broken links across **2** addons."));
        assert!(md.contains("| b | `changelog_location` | https://a.io | HTTP 404 |"));
        assert!(md.contains("| a | https://a.io/compat | no-matrix |"));
    }

    #[test]
    fn test_clean_link_report() {
        let tasks = link_tasks(&linked_catalog(), LinkMode::LinksOnly);
        let outcomes = vec![LinkOutcome::Reachable(None); tasks.len()];
        let report = LinkReport::new(&tasks, &outcomes);
        assert!(report.is_clean());
        assert_eq!(report.render_markdown(LinkMode::LinksOnly), "All links are healthy.\n");
        assert_eq!(report.render_markdown(LinkMode::All), "All validations passed.\n");
    }
}
