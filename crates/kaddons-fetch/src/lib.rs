//! kaddons fetch - HTTPS documentation and endoflife.date client
//!
//! Fetches compatibility pages for the resolution pipeline. Every URL is
//! checked against a public-https policy, GitHub pages are rewritten to raw
//! content, HTML is reduced to line-oriented text, and transient failures
//! are retried with deterministic backoff.

pub mod eol;
pub mod normalize;
pub mod policy;
pub mod retry;

use async_trait::async_trait;
use kaddons_core::pipeline::DocumentFetcher;
use kaddons_core::{CoreError, CoreResult};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub use policy::{github_raw_url, validate_public_https_url};
pub use retry::RetryPolicy;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("Blocked by URL policy: {0}")]
    Policy(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type FetchResult<T> = Result<T, FetchError>;

impl FetchError {
    /// Timeouts, connection failures and 429/5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Http(e) => {
                e.is_timeout() || e.is_connect() || retry::is_transient_message(&e.to_string())
            }
            FetchError::Status(status) => retry::is_retryable_status(*status),
            _ => false,
        }
    }
}

impl From<FetchError> for CoreError {
    fn from(e: FetchError) -> Self {
        CoreError::Collaborator(e.to_string())
    }
}

/// Configuration for the HTTP client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,

    /// Per-request timeout (seconds)
    pub timeout_secs: u64,

    /// Response bodies are read up to this many bytes
    pub max_body_bytes: usize,

    /// Normalized text is capped at this many bytes
    pub max_text_bytes: usize,

    pub max_redirects: usize,

    pub retry: RetryPolicy,

    /// endoflife.date API root
    pub eol_base_url: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("kaddons/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 15,
            max_body_bytes: 2 * 1024 * 1024, // 2 MiB
            max_text_bytes: 120_000,
            max_redirects: 10,
            retry: RetryPolicy::default(),
            eol_base_url: "https://endoflife.date".to_string(),
        }
    }
}

/// HTTP client for documentation pages and EOL data
pub struct HttpFetcher {
    config: FetchConfig,
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch a compatibility page as normalized text.
    pub async fn fetch_document(&self, page_url: &str) -> FetchResult<String> {
        let page = validate_public_https_url(page_url)?;
        let (target, is_raw) = match github_raw_url(page.as_str()) {
            Some(raw) => (validate_public_https_url(&raw)?, true),
            None => (page, false),
        };

        tracing::debug!("GET {} (raw: {})", target, is_raw);
        let body = self
            .get_text(
                &target,
                "text/html,application/xhtml+xml,text/plain;q=0.9,*/*;q=0.8",
                self.config.max_body_bytes,
            )
            .await?;

        Ok(normalize::normalize_fetched_content(
            &body,
            is_raw,
            self.config.max_text_bytes,
        ))
    }

    /// Check a catalog link: HEAD, falling back to GET when the server
    /// refuses HEAD with 403 or 405. Any status of 400 or above fails.
    pub async fn check_link(&self, link: &str) -> FetchResult<()> {
        let url = validate_public_https_url(link)?;
        let mut status = self.send(Method::HEAD, &url, "*/*").await?.status();
        if status == StatusCode::METHOD_NOT_ALLOWED || status == StatusCode::FORBIDDEN {
            tracing::debug!("HEAD {} returned {}, retrying with GET", url, status.as_u16());
            status = self.send(Method::GET, &url, "*/*").await?.status();
        }
        if status.as_u16() >= 400 {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(())
    }

    /// GET with retry, fail on any non-success status, read a capped body.
    pub(crate) async fn get_text(&self, url: &Url, accept: &str, max_bytes: usize) -> FetchResult<String> {
        let response = self.send(Method::GET, url, accept).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        read_capped(response, max_bytes).await
    }

    /// Send with retry. A retryable status is returned as-is on the last
    /// attempt so callers see the real response.
    async fn send(&self, method: Method, url: &Url, accept: &str) -> FetchResult<reqwest::Response> {
        let policy = self.config.retry;
        let attempts = policy.attempts.max(1);

        retry::retry(&policy, FetchError::is_retryable, |attempt| {
            let request = self
                .client
                .request(method.clone(), url.clone())
                .header(reqwest::header::ACCEPT, accept);
            async move {
                let response = request.send().await?;
                let status = response.status().as_u16();
                if retry::is_retryable_status(status) && attempt < attempts {
                    return Err(FetchError::Status(status));
                }
                Ok(response)
            }
        })
        .await
    }
}

async fn read_capped(mut response: reqwest::Response, max_bytes: usize) -> FetchResult<String> {
    let mut body: Vec<u8> = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let remaining = max_bytes.saturating_sub(body.len());
        if chunk.len() >= remaining {
            body.extend_from_slice(&chunk[..remaining]);
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> CoreResult<String> {
        Ok(self.fetch_document(url).await?)
    }
}
