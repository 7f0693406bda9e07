//! Verdict strategies, tried in order until one answers

use super::gather::EvidenceGatherer;
use super::{InterpretationRequest, Interpreter};
use crate::catalog::{CanonicalEntry, DetectedWorkload};
use crate::compat::{CompatibilityVerdict, StoredResolution, VersionCompatibilityResolver};
use crate::eol::{matching_cycle, resolve_eol_status, EolCycle};
use crate::evidence::{EvidencePruner, PruneBudget};
use crate::{DataSource, TriState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

pub const INTERPRETATION_NOT_CONFIGURED: &str = "External interpretation not configured";

/// Per-workload state shared by the strategy chain
pub struct ResolutionContext<'a> {
    pub workload: &'a DetectedWorkload,
    pub entry: &'a CanonicalEntry,
    /// Normalized `major.minor` target
    pub target: &'a str,
    gatherer: &'a EvidenceGatherer,
    budget: PruneBudget,
    eol: OnceCell<Vec<EolCycle>>,
}

impl<'a> ResolutionContext<'a> {
    pub fn new(
        workload: &'a DetectedWorkload,
        entry: &'a CanonicalEntry,
        target: &'a str,
        gatherer: &'a EvidenceGatherer,
        budget: PruneBudget,
    ) -> Self {
        Self {
            workload,
            entry,
            target,
            gatherer,
            budget,
            eol: OnceCell::new(),
        }
    }

    pub fn source_url(&self) -> Option<&'a str> {
        self.entry.source_url()
    }

    /// EOL cycles for this addon, fetched at most once.
    pub async fn eol_cycles(&self) -> &[EolCycle] {
        self.eol
            .get_or_init(|| async {
                self.gatherer
                    .eol_cycles(&[self.entry.name.as_str(), self.workload.name.as_str()])
                    .await
            })
            .await
    }

    /// Human-readable EOL facts for the installed version, empty when none.
    pub async fn eol_summary(&self) -> String {
        let cycles = self.eol_cycles().await;
        let installed = self.workload.installed_version.as_str();
        let Some(cycle) = matching_cycle(installed, cycles) else {
            return String::new();
        };

        let mut parts = Vec::new();
        if cycle.latest.is_empty() {
            parts.push(format!("Release cycle {}", cycle.cycle));
        } else {
            parts.push(format!("Latest release {} (cycle {})", cycle.latest, cycle.cycle));
        }

        let status = resolve_eol_status(installed, cycles);
        match (status.supported, status.supported_until.is_empty()) {
            (TriState::Yes, false) => parts.push(format!("Supported until {}", status.supported_until)),
            (TriState::Yes, true) => parts.push("Still supported".to_string()),
            (TriState::No, false) => parts.push(format!("End of life since {}", status.supported_until)),
            (TriState::No, true) => parts.push("No longer supported".to_string()),
            (TriState::Indeterminate, _) => {}
        }
        parts.join(". ")
    }

    /// Fetch and prune the source document.
    async fn evidence(&self) -> (String, Option<String>) {
        let Some(url) = self.source_url() else {
            return (String::new(), Some("no source URL in catalog".to_string()));
        };
        match self.gatherer.document(url).await {
            Ok(text) => (
                EvidencePruner::new().prune(&text, self.budget).into_string(),
                None,
            ),
            Err(e) => (String::new(), Some(e)),
        }
    }

    /// A local note: the reason, then any EOL facts, then the source.
    async fn local_note(&self, reason: &str) -> String {
        let summary = self.eol_summary().await;
        let note = if summary.is_empty() {
            reason.to_string()
        } else {
            format!("{}. {}.", reason.trim_end_matches('.'), summary)
        };
        crate::compat::cite_source(&note, self.source_url())
    }
}

#[async_trait]
pub trait VerdictStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` hands the workload to the next strategy.
    async fn attempt(&self, ctx: &ResolutionContext<'_>) -> Option<CompatibilityVerdict>;
}

/// Answers from the catalog's stored matrix and bounds.
#[derive(Debug, Default)]
pub struct StoredStrategy {
    resolver: VersionCompatibilityResolver,
}

impl StoredStrategy {
    pub fn new() -> Self {
        Self {
            resolver: VersionCompatibilityResolver::new(),
        }
    }
}

#[async_trait]
impl VerdictStrategy for StoredStrategy {
    fn name(&self) -> &'static str {
        "stored"
    }

    async fn attempt(&self, ctx: &ResolutionContext<'_>) -> Option<CompatibilityVerdict> {
        match self
            .resolver
            .resolve(ctx.entry, &ctx.workload.installed_version, ctx.target)
        {
            StoredResolution::Verdict(verdict) => Some(verdict),
            StoredResolution::Undetermined { note } => {
                debug!("{}: stored data undetermined ({})", ctx.entry.name, note);
                None
            }
        }
    }
}

/// Hands pruned evidence to an external interpreter.
///
/// Always answers: interpreter failures and timeouts become an unknown
/// verdict carrying the reason.
pub struct InterpretationStrategy {
    interpreter: Arc<dyn Interpreter>,
    timeout: Duration,
}

impl InterpretationStrategy {
    pub fn new(interpreter: Arc<dyn Interpreter>, timeout: Duration) -> Self {
        Self {
            interpreter,
            timeout,
        }
    }
}

#[async_trait]
impl VerdictStrategy for InterpretationStrategy {
    fn name(&self) -> &'static str {
        "interpretation"
    }

    async fn attempt(&self, ctx: &ResolutionContext<'_>) -> Option<CompatibilityVerdict> {
        let (pruned_evidence, fetch_error) = ctx.evidence().await;
        let eol_cycles = ctx.eol_cycles().await.to_vec();
        let request = InterpretationRequest {
            target_platform_version: ctx.target.to_string(),
            name: ctx.workload.name.clone(),
            namespace: ctx.workload.namespace.clone(),
            installed_version: ctx.workload.installed_version.clone(),
            canonical_name: ctx.entry.name.clone(),
            source_url: ctx.source_url().unwrap_or_default().to_string(),
            pruned_evidence,
            fetch_error,
            eol_summary: ctx.eol_summary().await,
            eol_cycles,
        };

        let reason = match tokio::time::timeout(self.timeout, self.interpreter.interpret(&request)).await {
            Ok(Ok(interpreted)) => {
                let mut verdict = CompatibilityVerdict::new(
                    interpreted.compatible,
                    interpreted.note.trim(),
                    DataSource::Runtime,
                );
                verdict.latest_compatible_version = interpreted
                    .latest_compatible_version
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                let source = ctx.source_url().filter(|url| !verdict.note.contains(*url));
                return Some(verdict.cite(source));
            }
            Ok(Err(e)) => format!("External interpretation failed: {}", e),
            Err(_) => format!(
                "External interpretation timed out after {}s",
                self.timeout.as_secs_f64()
            ),
        };

        warn!("{}: {}", ctx.workload.name, reason);
        Some(CompatibilityVerdict::unknown(
            ctx.local_note(&reason).await,
            DataSource::Local,
        ))
    }
}

/// Last resort: an unknown verdict annotated with whatever EOL data exists.
#[derive(Debug, Default)]
pub struct LocalOnlyStrategy;

#[async_trait]
impl VerdictStrategy for LocalOnlyStrategy {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn attempt(&self, ctx: &ResolutionContext<'_>) -> Option<CompatibilityVerdict> {
        Some(CompatibilityVerdict::unknown(
            ctx.local_note(INTERPRETATION_NOT_CONFIGURED).await,
            DataSource::Local,
        ))
    }
}
