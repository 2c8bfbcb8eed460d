//! Per-Candidate Orchestrator (spec §4.I): normalizes one raw candidate, walks
//! it through rate-limiting, the Protocol Prober, and the fan-out of
//! Anonymity/Cloud/Advanced probes, then assembles one `ProxyResult`.
//!
//! State machine (spec §3): `New -> Normalized -> Queued -> Running{Probing,
//! Classifying} -> Done`. Modeled here as the control flow of `run`, not as an
//! explicit enum — every exit path produces exactly one `ProxyResult`.

use crate::advanced::AdvancedCheckSuite;
use crate::anonymity::AnonymityAnalyzer;
use crate::client_pool::ClientPool;
use crate::cloud::CloudClassifier;
use crate::config::ProxyHawkConfig;
use crate::error::ProxyHawkError;
use crate::model::{Candidate, ProxyResult};
use crate::normalize::{self, ValidationPolicySpec};
use crate::prober::Prober;
use crate::retry::with_retry;
use std::sync::Arc;
use tracing::{info_span, Instrument};

/// Owns the shared, reusable pieces every candidate's run borrows: the client
/// pool, prober, and analyzers are cheap to share across candidates but
/// expensive to rebuild per-candidate (spec §4.B).
pub struct Orchestrator {
    cfg: Arc<ProxyHawkConfig>,
    prober: Prober,
    anonymity: AnonymityAnalyzer,
    cloud: CloudClassifier,
    advanced: AdvancedCheckSuite,
}

impl Orchestrator {
    pub fn new(cfg: Arc<ProxyHawkConfig>) -> Self {
        let pool = Arc::new(ClientPool::new(cfg.clone()));
        Self {
            prober: Prober::new(pool.clone(), cfg.clone()),
            anonymity: AnonymityAnalyzer::new(pool.clone(), cfg.clone()),
            cloud: CloudClassifier::new(pool.clone(), cfg.clone()),
            advanced: AdvancedCheckSuite::new(pool, cfg.clone()),
            cfg,
        }
    }

    /// Runs the full pipeline for one candidate. Never returns `Err` itself —
    /// every failure mode (bad URL, forbidden IP, exhausted retries, a fired
    /// cancellation token) is folded into `ProxyResult::failed`, matching the
    /// spec §3 invariant that the Worker Pool emits exactly one result per
    /// candidate.
    pub async fn run(&self, candidate: Candidate, cancel: &tokio_util::sync::CancellationToken) -> ProxyResult {
        let span = info_span!("validate_candidate", candidate = %candidate.raw);
        self.run_inner(candidate, cancel).instrument(span).await
    }

    async fn run_inner(&self, candidate: Candidate, cancel: &tokio_util::sync::CancellationToken) -> ProxyResult {
        let target = match normalize::normalize(&candidate.raw) {
            Ok(t) => t,
            Err(e) => return ProxyResult::failed_for_raw(candidate.raw, e.to_string()),
        };

        let policy = ValidationPolicySpec { allow_private: self.cfg.allow_private };
        if let Err(e) = normalize::validate(&target, &policy) {
            return ProxyResult::failed(target, e.to_string());
        }

        if cancel.is_cancelled() {
            return ProxyResult::failed(target, "cancelled before probing started");
        }

        let probe_outcome = with_retry(&self.cfg.retry, &target.url(), || {
            let target = target.clone();
            async move {
                tokio::select! {
                    report = self.prober.probe(&target) => {
                        if report.proxy_type.is_some() {
                            Ok(report)
                        } else {
                            Err(report.last_error.unwrap_or_else(|| {
                                ProxyHawkError::Probe("no transport succeeded".to_string())
                            }))
                        }
                    }
                    _ = cancel.cancelled() => Err(ProxyHawkError::Cancelled),
                }
            }
        })
        .await;

        let report = match probe_outcome {
            Ok(r) => r,
            Err(ProxyHawkError::RetryExhausted { last, .. }) if matches!(*last, ProxyHawkError::Cancelled) => {
                return ProxyResult::failed(target, "cancelled");
            },
            Err(e) => return ProxyResult::failed(target, e.to_string()),
        };

        if cancel.is_cancelled() {
            let mut result = ProxyResult::failed(target, "cancelled after probing");
            result.check_results = report.check_results;
            return result;
        }

        let (anonymity, cloud, (advanced, advanced_checks)) = tokio::join!(
            self.anonymity.analyze(&target),
            self.cloud.classify(&target, report.peer_ip),
            self.advanced.run(&target),
        );

        let mut check_results = report.check_results;
        check_results.extend(advanced_checks);

        ProxyResult {
            target,
            working: true,
            proxy_type: report.proxy_type,
            supports: report.supports,
            speed: report.speed,
            real_ip: anonymity.real_ip,
            proxy_ip: anonymity.proxy_ip,
            is_anonymous: anonymity.is_anonymous,
            cloud_provider: cloud.cloud_provider,
            internal_access: cloud.internal_access,
            metadata_access: cloud.metadata_access,
            advanced,
            check_results,
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }
}
