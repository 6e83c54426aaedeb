//! Retry with exponential backoff for transient adapter failures

use crate::config::RetryConfig;
use crate::error::{RagError, Result};
use std::future::Future;
use std::time::Duration;

/// Execute an async operation, retrying transient errors with exponential backoff.
///
/// Permanent errors (bad request, parse failures, auth) return immediately.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, label: &str, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !is_retryable(&e) || attempt >= config.max_retries {
                    return Err(e);
                }

                let backoff_ms = compute_backoff(config, attempt);
                tracing::warn!(
                    call = label,
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}

/// Transport failures, timeouts, rate limits and server errors are worth retrying.
pub fn is_retryable(err: &RagError) -> bool {
    match err {
        RagError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        RagError::Timeout { .. } => true,
        RagError::ExternalError(message) => {
            message.contains("HTTP 429") || message.contains("HTTP 5")
        }
        _ => false,
    }
}

/// Pure exponential backoff, capped.
pub fn compute_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    base.min(config.max_backoff_ms as f64) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_growth_and_cap() {
        let config = RetryConfig::default();
        assert_eq!(compute_backoff(&config, 0), 300);
        assert_eq!(compute_backoff(&config, 1), 600);
        assert_eq!(compute_backoff(&config, 2), 1200);
        assert_eq!(compute_backoff(&config, 10), 5000);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&RagError::ExternalError(
            "LLM service error (HTTP 503 Service Unavailable): busy".into()
        )));
        assert!(is_retryable(&RagError::ExternalError(
            "LLM service error (HTTP 429 Too Many Requests): slow down".into()
        )));
        assert!(!is_retryable(&RagError::ExternalError(
            "LLM service error (HTTP 401 Unauthorized): no".into()
        )));
        assert!(!is_retryable(&RagError::Llm("bad json".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default();

        let result = with_retry(&config, "test", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(RagError::ExternalError("HTTP 502 Bad Gateway".into()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default();

        let result: Result<()> = with_retry(&config, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RagError::Llm("malformed".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_is_bounded() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_retries: 2,
            ..RetryConfig::default()
        };

        let result: Result<()> = with_retry(&config, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RagError::ExternalError("HTTP 500".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
