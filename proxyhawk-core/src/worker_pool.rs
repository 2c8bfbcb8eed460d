//! Worker Pool (spec §4.J): runs N concurrent workers over a queue of
//! candidates, rate-limits per-candidate dispatch, recovers panics, and
//! supports cooperative cancellation mid-run.

use crate::config::ProxyHawkConfig;
use crate::hooks::{NullObserver, ValidationObserver};
use crate::model::{Candidate, ProxyResult};
use crate::orchestrator::Orchestrator;
use crate::rate_limit::{RateLimitMode, RateLimiter};
use dashmap::DashMap;
use futures::future::{AssertUnwindSafe, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Guarded (DashMap-backed) map of candidates currently in flight, keyed by
/// candidate URL, for external observers (UI/metrics) to poll (spec §4.J).
/// Entries are inserted when a worker picks up a candidate and removed when
/// that candidate's `ProxyResult` is assembled.
pub type ActiveChecks = Arc<DashMap<String, Instant>>;

/// The Worker Pool of spec §4.J. One instance validates one batch of
/// candidates; create a fresh pool per run.
pub struct WorkerPool {
    cfg: Arc<ProxyHawkConfig>,
    orchestrator: Arc<Orchestrator>,
    rate_limiter: Arc<RateLimiter>,
    observer: Arc<dyn ValidationObserver>,
    cancel: CancellationToken,
    active_checks: ActiveChecks,
}

impl WorkerPool {
    pub fn new(cfg: Arc<ProxyHawkConfig>) -> Self {
        Self::with_observer(cfg, Arc::new(NullObserver))
    }

    pub fn with_observer(cfg: Arc<ProxyHawkConfig>, observer: Arc<dyn ValidationObserver>) -> Self {
        let mode = RateLimitMode::from_flags(cfg.rate_limit.per_host, cfg.rate_limit.per_proxy);
        let rate_limiter = Arc::new(RateLimiter::new(
            if cfg.rate_limit.enabled { mode } else { RateLimitMode::Off },
            std::time::Duration::from_millis(cfg.rate_limit.delay_ms),
        ));
        Self {
            orchestrator: Arc::new(Orchestrator::new(cfg.clone())),
            rate_limiter,
            observer,
            cancel: CancellationToken::new(),
            active_checks: Arc::new(DashMap::new()),
            cfg,
        }
    }

    /// A token the caller can cancel to stop dispatching new work and abort
    /// in-flight candidates cooperatively (spec §4.J "graceful shutdown").
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The shared `active_checks` map (spec §4.J): one entry per candidate
    /// currently in flight. An observer can poll this independently of the
    /// per-candidate hooks to render "what's running right now".
    pub fn active_checks(&self) -> ActiveChecks {
        self.active_checks.clone()
    }

    /// Validates every candidate, bounded to `cfg.concurrency` concurrent
    /// workers. Results are delivered in completion order, not input order
    /// (spec §4.J). Candidates are deduplicated on their normalized target
    /// first (falling back to the trimmed raw string when normalization
    /// fails) so the result set size matches spec §3's "the result set size
    /// equals the deduplicated input size" invariant; the first occurrence of
    /// a duplicate is the one kept.
    pub async fn run(&self, candidates: Vec<Candidate>) -> Vec<ProxyResult> {
        let candidates = dedup_candidates(candidates);
        let total = candidates.len();

        let semaphore = Arc::new(Semaphore::new(self.cfg.concurrency.max(1)));
        let mut in_flight = FuturesUnordered::new();

        for candidate in candidates {
            let semaphore = semaphore.clone();
            let orchestrator = self.orchestrator.clone();
            let rate_limiter = self.rate_limiter.clone();
            let observer = self.observer.clone();
            let cancel = self.cancel.clone();
            let active_checks = self.active_checks.clone();

            in_flight.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return ProxyResult::failed_for_raw(candidate.raw, "worker pool shut down"),
                };

                let raw = candidate.raw.clone();
                observer.on_start(&raw);
                active_checks.insert(raw.clone(), Instant::now());

                let result = if cancel.is_cancelled() {
                    ProxyResult::failed_for_raw(raw.clone(), "cancelled before dispatch")
                } else {
                    let host_key = raw.clone();
                    rate_limiter.acquire(&host_key, &host_key).await;

                    let outcome = AssertUnwindSafe(orchestrator.run(candidate, &cancel)).catch_unwind().await;
                    match outcome {
                        Ok(r) => r,
                        Err(panic) => {
                            let msg = panic_message(&panic);
                            error!(candidate = %raw, %msg, "worker panicked");
                            ProxyResult::failed_for_raw(raw.clone(), format!("system panic: {msg}"))
                        },
                    }
                };

                active_checks.remove(&raw);
                for check in &result.check_results {
                    observer.on_progress(&raw, &check.url, check);
                }
                if let Some(err) = &result.error {
                    observer.on_error(&raw, err);
                }
                observer.on_complete(&result);

                result
            }));
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = in_flight.next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(join_err) => {
                    warn!(error = %join_err, "worker task join error");
                    self.observer.on_error("", &join_err.to_string());
                },
            }
        }

        info!(total, completed = results.len(), "worker pool run finished");
        results
    }
}

/// Drops later duplicates, keyed on the normalized target URL when a
/// candidate normalizes cleanly, or the trimmed raw string otherwise (spec
/// §3: "the result set size equals the deduplicated input size").
fn dedup_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|c| {
            let key = crate::normalize::normalize(&c.raw)
                .map(|t| t.url())
                .unwrap_or_else(|_| c.raw.trim().to_string());
            seen.insert(key)
        })
        .collect()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyHawkConfig;

    #[tokio::test]
    async fn empty_batch_produces_no_results() {
        let pool = WorkerPool::new(Arc::new(ProxyHawkConfig::default()));
        let results = pool.run(Vec::new()).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn invalid_candidates_still_produce_one_result_each() {
        let pool = WorkerPool::new(Arc::new(ProxyHawkConfig::default()));
        let candidates = vec![Candidate::new(""), Candidate::new("not a url!!")];
        let results = pool.run(candidates).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.working));
    }

    #[tokio::test]
    async fn cancellation_token_is_observed_before_dispatch() {
        let pool = WorkerPool::new(Arc::new(ProxyHawkConfig::default()));
        pool.cancellation_token().cancel();
        let results = pool.run(vec![Candidate::new("203.0.113.5:8080")]).await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].working);
    }

    #[test]
    fn dedup_candidates_collapses_equivalent_urls() {
        let candidates = vec![
            Candidate::new("203.0.113.5:8080"),
            Candidate::new("http://203.0.113.5:8080"),
            Candidate::new("http://203.0.113.5:8080/"),
            Candidate::new("203.0.113.6:8080"),
        ];
        let deduped = dedup_candidates(candidates);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].raw, "203.0.113.5:8080");
        assert_eq!(deduped[1].raw, "203.0.113.6:8080");
    }

    #[tokio::test]
    async fn run_deduplicates_before_dispatch() {
        let pool = WorkerPool::new(Arc::new(ProxyHawkConfig::default()));
        let candidates =
            vec![Candidate::new("203.0.113.5:8080"), Candidate::new("http://203.0.113.5:8080")];
        let results = pool.run(candidates).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn active_checks_empty_after_run_completes() {
        let pool = WorkerPool::new(Arc::new(ProxyHawkConfig::default()));
        let _ = pool.run(vec![Candidate::new("203.0.113.5:8080")]).await;
        assert!(pool.active_checks().is_empty());
    }
}
