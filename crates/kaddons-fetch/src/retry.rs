//! Deterministic retry with exponential backoff

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "temporarily unavailable",
    "connection refused",
    "connection reset",
    "unexpected eof",
    "service unavailable",
    "too many requests",
    "429",
];

/// Attempts and backoff. No jitter, so retries are reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 1000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.initial_delay_ms == 0 {
            return Duration::ZERO;
        }
        let multiplier = if self.multiplier > 0.0 { self.multiplier } else { 2.0 };
        let scaled = self.initial_delay_ms as f64 * multiplier.powi(attempt as i32 - 1);
        let capped = if self.max_delay_ms > 0 {
            scaled.min(self.max_delay_ms as f64)
        } else {
            scaled
        };
        Duration::from_millis(capped as u64)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent. `op` receives the 1-based attempt number.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, is_retryable: impl Fn(&E) -> bool, mut op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts || !is_retryable(&e) => return Err(e),
            Err(e) => {
                let delay = policy.backoff(attempt);
                tracing::debug!("Attempt {}/{} failed ({}), retrying in {:?}", attempt, attempts, e, delay);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || status >= 500
}

/// Heuristic for transport-level transient failures described only by text.
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_default_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(1000));
        assert_eq!(policy.backoff(0), Duration::ZERO);
    }

    #[test]
    fn test_status_classification() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(200));
    }

    #[test]
    fn test_transient_messages() {
        assert!(is_transient_message("read: Connection reset by peer"));
        assert!(is_transient_message("unexpected EOF"));
        assert!(!is_transient_message("invalid api key"));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry(&fast(), |_| true, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err("timeout".to_string())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_on_permanent_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry(&fast(), |e: &String| e == "timeout", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("forbidden".to_string()) }
        })
        .await;
        assert_eq!(result, Err("forbidden".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhausted_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry(&fast(), |_| true, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(format!("timeout {}", attempt)) }
        })
        .await;
        assert_eq!(result, Err("timeout 3".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
