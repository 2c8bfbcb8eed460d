//! Retry Engine (spec §4.D): wraps an attempt function, retrying only errors
//! classified as transient, with exponential backoff plus jitter.

use crate::config::RetryConfig;
use crate::error::ProxyHawkError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// `delay_n = min(initial * factor^n, max) + uniform jitter in [0, 0.25 * delay_n]`.
fn backoff_delay(cfg: &RetryConfig, attempt: u32) -> Duration {
    let base = cfg.initial_retry_delay_ms as f64 * cfg.backoff_factor.powi(attempt as i32);
    let capped = base.min(cfg.max_retry_delay_ms as f64);
    let jitter = rand::thread_rng().gen_range(0.0..=0.25 * capped);
    Duration::from_millis((capped + jitter).round() as u64)
}

/// Runs `attempt_fn` up to `cfg.max_retries + 1` times, retrying only on
/// transient errors (spec §4.D). Non-transient errors return immediately.
/// On exhaustion returns `ProxyHawkError::RetryExhausted`.
pub async fn with_retry<F, Fut, T>(
    cfg: &RetryConfig,
    trace_id: &str,
    mut attempt_fn: F,
) -> Result<T, ProxyHawkError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProxyHawkError>>,
{
    let max_attempts = if cfg.enabled { cfg.max_retries + 1 } else { 1 };
    let mut last_err: Option<ProxyHawkError> = None;

    for attempt in 0..max_attempts {
        match attempt_fn().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if !e.is_transient(&cfg.retryable_errors) {
                    return Err(e);
                }
                debug!(%trace_id, attempt, error = %e, "transient error, considering retry");
                last_err = Some(e);
                if attempt + 1 < max_attempts {
                    let delay = backoff_delay(cfg, attempt);
                    tokio::time::sleep(delay).await;
                }
            },
        }
    }

    let last = last_err.unwrap_or(ProxyHawkError::Timeout);
    Err(ProxyHawkError::RetryExhausted { attempts: max_attempts, last: Box::new(last) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn cfg(max_retries: u32) -> RetryConfig {
        RetryConfig {
            enabled: true,
            max_retries,
            initial_retry_delay_ms: 5,
            max_retry_delay_ms: 50,
            backoff_factor: 2.0,
            retryable_errors: vec!["timeout".to_string()],
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<u32, ProxyHawkError> =
            with_retry(&cfg(3), "t", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_up_to_max_plus_one_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<u32, ProxyHawkError> =
            with_retry(&cfg(3), "t", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(ProxyHawkError::Timeout)
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn does_not_retry_non_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<u32, ProxyHawkError> =
            with_retry(&cfg(3), "t", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(ProxyHawkError::Config("bad".into()))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_retry_makes_exactly_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let mut cfg = cfg(3);
        cfg.enabled = false;
        let result: Result<u32, ProxyHawkError> =
            with_retry(&cfg, "t", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(ProxyHawkError::Timeout)
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tls_certificate_errors_are_not_retried_unless_configured() {
        use crate::error::TransientReason;
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<u32, ProxyHawkError> =
            with_retry(&cfg(3), "t", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(ProxyHawkError::Transient(TransientReason::TlsCertificate))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let mut opted_in = cfg(3);
        opted_in.retryable_errors.push("tls_certificate".to_string());
        let calls2 = Arc::new(AtomicU32::new(0));
        let c2 = calls2.clone();
        let result2: Result<u32, ProxyHawkError> =
            with_retry(&opted_in, "t", || {
                let c2 = c2.clone();
                async move {
                    c2.fetch_add(1, Ordering::SeqCst);
                    Err(ProxyHawkError::Transient(TransientReason::TlsCertificate))
                }
            })
            .await;
        assert!(result2.is_err());
        assert_eq!(calls2.load(Ordering::SeqCst), 4);
    }
}
