//! Run-scoped evidence gathering with per-URL caching

use super::{DocumentFetcher, EolProvider};
use crate::eol::{EolCycle, EolSlugIndex};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

type DocumentCell = Arc<OnceCell<Result<String, String>>>;

/// Fetches documents and EOL data for one pipeline run.
///
/// Every URL is fetched at most once per run. Concurrent callers asking for
/// the same URL wait on the same in-flight fetch.
pub struct EvidenceGatherer {
    fetcher: Option<Arc<dyn DocumentFetcher>>,
    eol: Option<Arc<dyn EolProvider>>,
    documents: Mutex<HashMap<String, DocumentCell>>,
    slug_index: OnceCell<EolSlugIndex>,
}

impl EvidenceGatherer {
    pub fn new(fetcher: Option<Arc<dyn DocumentFetcher>>, eol: Option<Arc<dyn EolProvider>>) -> Self {
        Self {
            fetcher,
            eol,
            documents: Mutex::new(HashMap::new()),
            slug_index: OnceCell::new(),
        }
    }

    /// Document text, or the fetch error as a string.
    pub async fn document(&self, url: &str) -> Result<String, String> {
        let Some(fetcher) = self.fetcher.as_ref() else {
            return Err("document fetching is disabled".to_string());
        };

        let cell = {
            let mut documents = self.documents.lock().await;
            documents
                .entry(url.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        cell.get_or_init(|| async {
            debug!("Fetching {}", url);
            fetcher.fetch(url).await.map_err(|e| {
                warn!("Fetch failed for {}: {}", url, e);
                e.to_string()
            })
        })
        .await
        .clone()
    }

    /// Release cycles for an addon, empty when no product slug is known or
    /// the provider fails.
    pub async fn eol_cycles(&self, names: &[&str]) -> Vec<EolCycle> {
        let Some(provider) = self.eol.as_ref() else {
            return Vec::new();
        };

        let index = self
            .slug_index
            .get_or_init(|| async {
                match provider.products().await {
                    Ok(products) => {
                        debug!("Loaded {} EOL products", products.len());
                        EolSlugIndex::new().with_products(&products)
                    }
                    Err(e) => {
                        warn!("EOL product catalog unavailable, using built-in aliases: {}", e);
                        EolSlugIndex::new()
                    }
                }
            })
            .await;

        let Some(slug) = names.iter().find_map(|name| index.lookup(name)) else {
            return Vec::new();
        };

        match provider.cycles(slug).await {
            Ok(cycles) => cycles,
            Err(e) => {
                warn!("EOL data fetch failed for {}: {}", slug, e);
                Vec::new()
            }
        }
    }
}
