//! End-to-end resolution of detected workloads into a compatibility report
//!
//! Workloads are filtered, ordered, matched to catalog entries and
//! deduplicated per canonical addon. Each addon then runs through the
//! strategy chain (stored data, external interpretation, local fallback)
//! with bounded concurrency. Output order is the canonical name order and
//! does not depend on completion order.

pub mod gather;
pub mod strategy;

use crate::catalog::{CanonicalEntry, Catalog, DetectedWorkload};
use crate::compat::CompatibilityVerdict;
use crate::eol::{EolCycle, EolProduct};
use crate::evidence::PruneBudget;
use crate::matching::{MatcherTables, NameMatcher};
use crate::report::{AddonReport, CompatibilityReport};
use crate::version::{normalize_platform_version, VersionTuple};
use crate::{CoreError, CoreResult, DataSource, TriState};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use gather::EvidenceGatherer;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use strategy::{
    InterpretationStrategy, LocalOnlyStrategy, ResolutionContext, StoredStrategy, VerdictStrategy,
};
use tracing::{debug, info};

pub use strategy::INTERPRETATION_NOT_CONFIGURED;

/// Fetches a document as plain text.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> CoreResult<String>;
}

/// Release-cycle data source (endoflife.date or equivalent).
#[async_trait]
pub trait EolProvider: Send + Sync {
    async fn products(&self) -> CoreResult<Vec<EolProduct>>;
    async fn cycles(&self, slug: &str) -> CoreResult<Vec<EolCycle>>;
}

/// Turns pruned evidence into a verdict.
#[async_trait]
pub trait Interpreter: Send + Sync {
    async fn interpret(&self, request: &InterpretationRequest) -> CoreResult<InterpretedVerdict>;
}

/// Everything the interpreter sees about one workload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpretationRequest {
    pub target_platform_version: String,
    pub name: String,
    pub namespace: String,
    pub installed_version: String,
    pub canonical_name: String,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub pruned_evidence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub eol_summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub eol_cycles: Vec<EolCycle>,
}

/// Interpreter answer. Missing or malformed fields fall back to unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpretedVerdict {
    #[serde(default)]
    pub compatible: TriState,
    #[serde(default)]
    pub latest_compatible_version: Option<String>,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub target_platform_version: String,
    /// Addons resolved in parallel
    pub concurrency: usize,
    pub prune: PruneBudget,
    pub interpretation_timeout_ms: u64,
    /// Lowercase workload names to keep; empty keeps all
    pub addons: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_platform_version: String::new(),
            concurrency: 10,
            prune: PruneBudget::default(),
            interpretation_timeout_ms: 60_000,
            addons: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn new(target_platform_version: &str) -> Self {
        Self {
            target_platform_version: target_platform_version.to_string(),
            ..Default::default()
        }
    }

    /// Parse a comma-separated addon filter.
    pub fn with_addon_filter(mut self, filter: &str) -> Self {
        self.addons = filter
            .split(',')
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
        self
    }

    /// Validated `major.minor` target.
    pub fn normalized_target(&self) -> CoreResult<String> {
        let target = normalize_platform_version(&self.target_platform_version);
        match VersionTuple::parse(&target) {
            Some(tuple) if tuple.len() == 2 => Ok(target),
            _ => Err(CoreError::Config(format!(
                "invalid Kubernetes version {:?}, expected X.Y",
                self.target_platform_version
            ))),
        }
    }
}

pub struct ResolutionPipeline {
    catalog: Catalog,
    config: PipelineConfig,
    tables: MatcherTables,
    fetcher: Option<Arc<dyn DocumentFetcher>>,
    eol: Option<Arc<dyn EolProvider>>,
    interpreter: Option<Arc<dyn Interpreter>>,
}

impl ResolutionPipeline {
    pub fn new(catalog: Catalog, config: PipelineConfig) -> Self {
        Self {
            catalog,
            config,
            tables: MatcherTables::default(),
            fetcher: None,
            eol: None,
            interpreter: None,
        }
    }

    pub fn with_matcher_tables(mut self, tables: MatcherTables) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn DocumentFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_eol_provider(mut self, eol: Arc<dyn EolProvider>) -> Self {
        self.eol = Some(eol);
        self
    }

    pub fn with_interpreter(mut self, interpreter: Arc<dyn Interpreter>) -> Self {
        self.interpreter = Some(interpreter);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Filter, order, match and deduplicate workloads.
    ///
    /// Returns one workload per canonical entry, ordered by lowercase
    /// canonical name. When several workloads map to the same entry the
    /// last in sorted order wins, except that a versioned workload is never
    /// replaced by an unversioned one.
    pub fn select(&self, workloads: Vec<DetectedWorkload>) -> Vec<(DetectedWorkload, &CanonicalEntry)> {
        let filter: HashSet<&str> = self.config.addons.iter().map(String::as_str).collect();

        let mut workloads: Vec<DetectedWorkload> = workloads
            .into_iter()
            .filter(|w| filter.is_empty() || filter.contains(w.name.to_lowercase().as_str()))
            .collect();
        workloads.sort_by_cached_key(DetectedWorkload::sort_key);

        let matcher = NameMatcher::new(self.catalog.entries(), self.tables.clone());
        let mut selected: BTreeMap<String, (DetectedWorkload, &CanonicalEntry)> = BTreeMap::new();

        for workload in workloads {
            let result = matcher.find(&workload.name);
            let Some(entry) = result.first() else {
                debug!("No catalog match for {}", workload.name);
                continue;
            };
            if let Some(pass) = result.pass {
                debug!("{} matched {} via {}", workload.name, entry.name, pass);
            }

            let key = entry.name.to_lowercase();
            let keep_existing = selected.get(&key).is_some_and(|(existing, _)| {
                !existing.installed_version.is_empty() && workload.installed_version.is_empty()
            });
            if keep_existing {
                debug!("Skipping duplicate {} for {}", workload.name, entry.name);
                continue;
            }
            selected.insert(key, (workload, entry));
        }

        selected.into_values().collect()
    }

    fn strategies(&self) -> Vec<Box<dyn VerdictStrategy>> {
        let mut chain: Vec<Box<dyn VerdictStrategy>> = vec![Box::new(StoredStrategy::new())];
        if let Some(interpreter) = &self.interpreter {
            chain.push(Box::new(InterpretationStrategy::new(
                interpreter.clone(),
                Duration::from_millis(self.config.interpretation_timeout_ms),
            )));
        }
        chain.push(Box::new(LocalOnlyStrategy));
        chain
    }

    pub async fn run(&self, workloads: Vec<DetectedWorkload>) -> CoreResult<CompatibilityReport> {
        let target = self.config.normalized_target()?;
        let selected = self.select(workloads);
        info!("Matched {} known addons", selected.len());

        let gatherer = EvidenceGatherer::new(self.fetcher.clone(), self.eol.clone());
        let strategies = self.strategies();

        let addons: Vec<AddonReport> = stream::iter(selected.iter())
            .map(|(workload, entry)| {
                let ctx = ResolutionContext::new(workload, entry, &target, &gatherer, self.config.prune);
                let strategies = &strategies;
                async move {
                    let verdict = resolve(&ctx, strategies).await;
                    AddonReport::new(workload, entry, verdict)
                }
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        Ok(CompatibilityReport::new(target, addons))
    }
}

async fn resolve(ctx: &ResolutionContext<'_>, strategies: &[Box<dyn VerdictStrategy>]) -> CompatibilityVerdict {
    for strategy in strategies {
        if let Some(verdict) = strategy.attempt(ctx).await {
            debug!("{}: resolved by {} strategy", ctx.workload.name, strategy.name());
            return verdict;
        }
    }
    CompatibilityVerdict::unknown(INTERPRETATION_NOT_CONFIGURED, DataSource::Local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eol::EolField;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const SHARED_URL: &str = "https://shared.example/docs";

    struct CountingFetcher {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingFetcher {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl DocumentFetcher for CountingFetcher {
        async fn fetch(&self, _url: &str) -> CoreResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CoreError::Collaborator("HTTP 503".to_string()));
            }
            Ok("Compatibility matrix\nSupported on Kubernetes 1.30".to_string())
        }
    }

    struct StaticEol;

    #[async_trait]
    impl EolProvider for StaticEol {
        async fn products(&self) -> CoreResult<Vec<EolProduct>> {
            Err(CoreError::Collaborator("products unavailable".to_string()))
        }

        async fn cycles(&self, slug: &str) -> CoreResult<Vec<EolCycle>> {
            match slug {
                "redis" => Ok(vec![
                    EolCycle::new("8.0", EolField::StillSupported).with_latest("v8.0.2"),
                    EolCycle::new("7.4", EolField::StillSupported).with_latest("7.4.5"),
                ]),
                _ => Ok(Vec::new()),
            }
        }
    }

    enum Behavior {
        Answer,
        Fail,
        Hang,
    }

    struct FakeInterpreter {
        behavior: Behavior,
        requests: Mutex<Vec<InterpretationRequest>>,
    }

    impl FakeInterpreter {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Interpreter for FakeInterpreter {
        async fn interpret(&self, request: &InterpretationRequest) -> CoreResult<InterpretedVerdict> {
            self.requests.lock().unwrap().push(request.clone());
            match self.behavior {
                Behavior::Answer => Ok(InterpretedVerdict {
                    compatible: TriState::Yes,
                    latest_compatible_version: Some(" ".to_string()),
                    note: "Docs list 1.30.".to_string(),
                }),
                Behavior::Fail => Err(CoreError::Collaborator("model unavailable".to_string())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(InterpretedVerdict::default())
                }
            }
        }
    }

    fn catalog() -> Catalog {
        Catalog::new(vec![
            CanonicalEntry::new("Redis").with_source_url(SHARED_URL),
            CanonicalEntry::new("Cert Manager")
                .with_matrix_row("1.14", &["1.29", "1.30"])
                .with_source_url("https://cert-manager.io/docs/releases/"),
            CanonicalEntry::new("Valkey").with_source_url(SHARED_URL),
            CanonicalEntry::new("Bare Addon"),
        ])
    }

    fn pipeline() -> ResolutionPipeline {
        ResolutionPipeline::new(catalog(), PipelineConfig::new("v1.30"))
    }

    fn workloads() -> Vec<DetectedWorkload> {
        vec![
            DetectedWorkload::new("redis", "data", "8.0.0"),
            DetectedWorkload::new("cert-manager", "cert-manager", "v1.14.2"),
            DetectedWorkload::new("valkey", "data", "7.2.0"),
        ]
    }

    #[test]
    fn test_config_target_validation() {
        assert_eq!(PipelineConfig::new("v1.30.2").normalized_target().unwrap(), "1.30");
        assert!(matches!(
            PipelineConfig::new("latest").normalized_target(),
            Err(CoreError::Config(_))
        ));
        assert!(PipelineConfig::new("").normalized_target().is_err());
    }

    #[test]
    fn test_addon_filter_parsing() {
        let config = PipelineConfig::new("1.30").with_addon_filter(" Redis, ,cert-manager ");
        assert_eq!(config.addons, vec!["redis", "cert-manager"]);
    }

    #[test]
    fn test_select_filters_and_orders_by_canonical_name() {
        let mut pipeline = pipeline();
        pipeline.config.addons = vec!["redis".to_string(), "cert-manager".to_string()];
        let selected = pipeline.select(workloads());
        let names: Vec<&str> = selected.iter().map(|(_, e)| e.name.as_str()).collect();
        assert_eq!(names, vec!["Cert Manager", "Redis"]);
    }

    #[test]
    fn test_select_last_versioned_duplicate_wins() {
        let pipeline = pipeline();
        let selected = pipeline.select(vec![
            DetectedWorkload::new("cert-manager", "a", ""),
            DetectedWorkload::new("cert-manager", "b", "v1.14.2"),
            DetectedWorkload::new("cert-manager", "c", "v1.15.0"),
        ]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].0.namespace, "c");
    }

    #[test]
    fn test_select_never_trades_version_for_none() {
        let pipeline = pipeline();
        let selected = pipeline.select(vec![
            DetectedWorkload::new("cert-manager", "a", "v1.14.2"),
            DetectedWorkload::new("cert-manager", "b", ""),
        ]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].0.namespace, "a");

        let selected = pipeline.select(vec![
            DetectedWorkload::new("cert-manager", "a", ""),
            DetectedWorkload::new("cert-manager", "b", ""),
        ]);
        assert_eq!(selected[0].0.namespace, "b");
    }

    #[test]
    fn test_select_drops_unmatched() {
        let pipeline = pipeline();
        let selected = pipeline.select(vec![DetectedWorkload::new("my-app", "default", "1.0.0")]);
        assert!(selected.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_target_is_config_error() {
        let pipeline = ResolutionPipeline::new(catalog(), PipelineConfig::new("next"));
        assert!(matches!(pipeline.run(workloads()).await, Err(CoreError::Config(_))));
    }

    #[tokio::test]
    async fn test_stored_verdict_skips_fetching() {
        let fetcher = CountingFetcher::new(false);
        let report = pipeline()
            .with_fetcher(fetcher.clone())
            .run(vec![DetectedWorkload::new("cert-manager", "cert-manager", "v1.14.2")])
            .await
            .unwrap();

        assert_eq!(report.k8s_version, "1.30");
        let addon = &report.addons[0];
        assert_eq!(addon.canonical_name, "Cert Manager");
        assert_eq!(addon.compatible, TriState::Yes);
        assert_eq!(addon.data_source, DataSource::Stored);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_local_only_note_without_data() {
        let report = pipeline()
            .run(vec![DetectedWorkload::new("bare-addon", "default", "1.0.0")])
            .await
            .unwrap();
        let addon = &report.addons[0];
        assert_eq!(addon.note, INTERPRETATION_NOT_CONFIGURED);
        assert_eq!(addon.compatible, TriState::Indeterminate);
        assert_eq!(addon.data_source, DataSource::Local);
    }

    #[tokio::test]
    async fn test_local_only_note_carries_eol_data() {
        let report = pipeline()
            .with_eol_provider(Arc::new(StaticEol))
            .run(vec![DetectedWorkload::new("redis", "data", "8.0.0")])
            .await
            .unwrap();
        let note = &report.addons[0].note;
        assert!(note.starts_with(INTERPRETATION_NOT_CONFIGURED), "{}", note);
        assert!(note.contains("v8.0.2"), "{}", note);
        assert!(note.contains("cycle 8.0"), "{}", note);
        assert!(note.ends_with(&format!("Source: {}", SHARED_URL)), "{}", note);
    }

    #[tokio::test]
    async fn test_shared_url_fetched_once() {
        let fetcher = CountingFetcher::new(false);
        let interpreter = FakeInterpreter::new(Behavior::Answer);
        let report = pipeline()
            .with_fetcher(fetcher.clone())
            .with_interpreter(interpreter.clone())
            .run(workloads())
            .await
            .unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.addons.len(), 3);
        assert_eq!(report.summary.compatible, 3);

        let redis = report.addons.iter().find(|a| a.name == "redis").unwrap();
        assert_eq!(redis.data_source, DataSource::Runtime);
        assert_eq!(redis.latest_compatible_version, None);
        assert_eq!(redis.note, format!("Docs list 1.30. Source: {}", SHARED_URL));

        let requests = interpreter.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.pruned_evidence.contains("Kubernetes 1.30")));
        assert!(requests.iter().all(|r| r.target_platform_version == "1.30"));
    }

    #[tokio::test]
    async fn test_fetch_error_reaches_interpreter() {
        let interpreter = FakeInterpreter::new(Behavior::Answer);
        pipeline()
            .with_fetcher(CountingFetcher::new(true))
            .with_interpreter(interpreter.clone())
            .run(vec![DetectedWorkload::new("redis", "data", "8.0.0")])
            .await
            .unwrap();

        let requests = interpreter.requests.lock().unwrap();
        assert!(requests[0].pruned_evidence.is_empty());
        assert!(requests[0].fetch_error.as_deref().unwrap().contains("HTTP 503"));
    }

    #[tokio::test]
    async fn test_interpreter_failure_becomes_unknown() {
        let report = pipeline()
            .with_fetcher(CountingFetcher::new(false))
            .with_interpreter(FakeInterpreter::new(Behavior::Fail))
            .run(vec![DetectedWorkload::new("redis", "data", "8.0.0")])
            .await
            .unwrap();
        let addon = &report.addons[0];
        assert_eq!(addon.compatible, TriState::Indeterminate);
        assert_eq!(addon.data_source, DataSource::Local);
        assert!(addon.note.starts_with("External interpretation failed"), "{}", addon.note);
        assert!(addon.note.contains("model unavailable"));
    }

    #[tokio::test]
    async fn test_interpreter_timeout_becomes_unknown() {
        let mut config = PipelineConfig::new("1.30");
        config.interpretation_timeout_ms = 20;
        let report = ResolutionPipeline::new(catalog(), config)
            .with_interpreter(FakeInterpreter::new(Behavior::Hang))
            .run(vec![DetectedWorkload::new("valkey", "data", "7.2.0")])
            .await
            .unwrap();
        let addon = &report.addons[0];
        assert!(addon.compatible.is_indeterminate());
        assert!(addon.note.contains("timed out"), "{}", addon.note);
    }

    #[tokio::test]
    async fn test_report_order_independent_of_concurrency() {
        let mut config = PipelineConfig::new("1.30");
        config.concurrency = 1;
        let sequential = ResolutionPipeline::new(catalog(), config)
            .run(workloads())
            .await
            .unwrap();
        let mut reversed = workloads();
        reversed.reverse();
        let parallel = pipeline().run(reversed).await.unwrap();
        assert_eq!(sequential, parallel);
    }
}
