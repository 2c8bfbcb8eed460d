//! Observability hooks (spec §6 "Observability hooks"): the Worker Pool calls
//! these at the boundaries an embedder (CLI, TUI, test harness) needs to
//! render progress without coupling the core to any particular UI.

use crate::model::{CheckResult, ProxyResult};
use std::fmt;

/// Implemented by anything that wants a live view of a validation run.
/// Every method has a default no-op body; implement only what you need.
/// Signatures follow spec §6 literally: every hook but `on_debug` is scoped
/// to one candidate, identified by its raw/normalized URL string.
pub trait ValidationObserver: Send + Sync {
    /// Called once per candidate, when it is dispatched to a worker.
    fn on_start(&self, _candidate: &str) {}

    /// Called once per probe/check the candidate completes (HTTP/HTTPS
    /// transport fetch, each Advanced Check Suite probe), in execution order.
    fn on_progress(&self, _candidate: &str, _check_name: &str, _outcome: &CheckResult) {}

    /// Called once per candidate, when its `ProxyResult` has been assembled.
    fn on_complete(&self, _result: &ProxyResult) {}

    /// Called once per candidate that finished with `result.error` set, or
    /// for a condition outside the per-candidate result stream (a worker
    /// task join failure), in which case `candidate` is empty.
    fn on_error(&self, _candidate: &str, _err: &str) {}

    /// Low-frequency diagnostic channel; the CLI's `-v` wires this to `tracing`.
    fn on_debug(&self, _message: &str) {}
}

/// The default observer: discards every event. Used when a caller constructs
/// a `WorkerPool` without supplying its own.
pub struct NullObserver;

impl ValidationObserver for NullObserver {}

/// Forwards every hook to `tracing`, at a verbosity matching the event's
/// weight. Useful as the CLI's default observer (spec §6).
pub struct TracingObserver;

impl ValidationObserver for TracingObserver {
    fn on_start(&self, candidate: &str) {
        tracing::info!(%candidate, "candidate dispatched");
    }

    fn on_progress(&self, candidate: &str, check_name: &str, outcome: &CheckResult) {
        tracing::debug!(%candidate, check_name, success = outcome.success, "check finished");
    }

    fn on_complete(&self, result: &ProxyResult) {
        tracing::info!(
            target = %result.target,
            working = result.working,
            checks = result.check_results.len(),
            "candidate finished"
        );
    }

    fn on_error(&self, candidate: &str, err: &str) {
        tracing::warn!(%candidate, %err, "candidate error");
    }

    fn on_debug(&self, message: &str) {
        tracing::debug!(%message, "validation run debug");
    }
}

impl fmt::Debug for TracingObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TracingObserver")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProxyTarget;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingObserver {
        starts: AtomicUsize,
        progress: AtomicUsize,
    }

    impl ValidationObserver for CountingObserver {
        fn on_start(&self, _candidate: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn on_progress(&self, _candidate: &str, _check_name: &str, _outcome: &CheckResult) {
            self.progress.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn sample_check() -> CheckResult {
        CheckResult { url: "http://x".into(), success: true, status: Some(200), bytes: 1, elapsed: Default::default(), error: None }
    }

    #[test]
    fn observer_default_methods_are_inert() {
        let observer = NullObserver;
        let target = ProxyTarget { scheme: crate::model::Scheme::Http, host: "x".into(), port: 80, credentials: None };
        observer.on_start("x");
        observer.on_progress("x", "http", &sample_check());
        observer.on_error("x", "boom");
        observer.on_complete(&ProxyResult::failed(target, "x"));
    }

    #[test]
    fn counting_observer_tracks_calls() {
        let observer = CountingObserver { starts: AtomicUsize::new(0), progress: AtomicUsize::new(0) };
        observer.on_start("candidate");
        observer.on_progress("candidate", "http", &sample_check());
        assert_eq!(observer.starts.load(Ordering::SeqCst), 1);
        assert_eq!(observer.progress.load(Ordering::SeqCst), 1);
    }
}
