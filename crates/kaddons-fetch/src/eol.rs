//! endoflife.date client

use crate::{FetchError, FetchResult, HttpFetcher};
use async_trait::async_trait;
use kaddons_core::eol::{EolCycle, EolProduct};
use kaddons_core::pipeline::EolProvider;
use kaddons_core::CoreResult;
use serde::Deserialize;
use url::Url;

const JSON: &str = "application/json";
const MAX_CYCLES_BYTES: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct ProductsResponse {
    #[serde(default)]
    result: Vec<EolProduct>,
}

/// Product slugs are used as a path segment.
fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '.' | '_'))
        && !slug.starts_with('.')
}

pub fn parse_cycles(body: &str) -> FetchResult<Vec<EolCycle>> {
    serde_json::from_str(body).map_err(|e| FetchError::Parse(format!("EOL data: {}", e)))
}

pub fn parse_products(body: &str) -> FetchResult<Vec<EolProduct>> {
    serde_json::from_str::<ProductsResponse>(body)
        .map(|parsed| parsed.result)
        .map_err(|e| FetchError::Parse(format!("EOL product catalog: {}", e)))
}

impl HttpFetcher {
    fn eol_url(&self, path: &str) -> FetchResult<Url> {
        let base = self.config().eol_base_url.trim_end_matches('/');
        Url::parse(&format!("{}{}", base, path)).map_err(|e| FetchError::InvalidUrl(e.to_string()))
    }

    /// Release cycles for one product slug.
    pub async fn eol_cycles(&self, slug: &str) -> FetchResult<Vec<EolCycle>> {
        if !is_valid_slug(slug) {
            return Err(FetchError::InvalidUrl(format!("invalid product slug: {}", slug)));
        }
        let url = self.eol_url(&format!("/api/{}.json", slug))?;
        let body = self.get_text(&url, JSON, MAX_CYCLES_BYTES).await?;
        parse_cycles(&body)
    }

    /// The full product catalog, used to build the runtime slug index.
    pub async fn eol_products(&self) -> FetchResult<Vec<EolProduct>> {
        let url = self.eol_url("/api/v1/products")?;
        let body = self.get_text(&url, JSON, self.config().max_body_bytes).await?;
        parse_products(&body)
    }
}

#[async_trait]
impl EolProvider for HttpFetcher {
    async fn products(&self) -> CoreResult<Vec<EolProduct>> {
        Ok(self.eol_products().await?)
    }

    async fn cycles(&self, slug: &str) -> CoreResult<Vec<EolCycle>> {
        Ok(self.eol_cycles(slug).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaddons_core::eol::EolField;

    #[test]
    fn test_parse_cycles() {
        let body = r#"[
            {"cycle": "8.0", "releaseDate": "2025-05-02", "eol": false, "latest": "8.0.2"},
            {"cycle": 7, "eol": "2024-02-28", "latest": "7.4.5"},
            {"cycle": "6.2", "eol": true}
        ]"#;
        let cycles = parse_cycles(body).unwrap();
        assert_eq!(cycles.len(), 3);
        assert_eq!(cycles[0].eol, EolField::StillSupported);
        assert_eq!(cycles[0].release_date, "2025-05-02");
        assert_eq!(cycles[1].cycle, "7");
        assert!(matches!(cycles[1].eol, EolField::SupportedUntil(_)));
        assert_eq!(cycles[2].eol, EolField::AlreadyUnsupported);
    }

    #[test]
    fn test_parse_products() {
        let body = r#"{"schema_version": "1.0.0", "total": 2, "result": [
            {"name": "argo-cd", "label": "Argo CD", "aliases": ["argocd"], "category": "app"},
            {"name": "redis", "label": "Redis"}
        ]}"#;
        let products = parse_products(body).unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].aliases, vec!["argocd"]);
        assert!(products[1].aliases.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_cycles("<html>"), Err(FetchError::Parse(_))));
        assert!(matches!(parse_products("[]"), Err(FetchError::Parse(_))));
    }

    #[test]
    fn test_slug_validation() {
        assert!(is_valid_slug("grafana-loki"));
        assert!(is_valid_slug("argo-cd"));
        assert!(!is_valid_slug("../secrets"));
        assert!(!is_valid_slug("Redis"));
        assert!(!is_valid_slug(""));
    }

    #[tokio::test]
    async fn test_invalid_slug_never_requested() {
        let fetcher = HttpFetcher::new(crate::FetchConfig::default()).unwrap();
        let err = fetcher.eol_cycles("a/b").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }
}
