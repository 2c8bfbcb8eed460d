//! ProxyHawk Core: validates candidate forward proxies for transport
//! capability, anonymity, and security posture, and runs that validation
//! concurrently across a batch of candidates.
//!
//! The CLI crate is a thin shell around this library: configuration loading,
//! candidate-file I/O, and result rendering live there. Everything that
//! touches a proxy over the network lives here.

pub mod advanced;
pub mod anonymity;
pub mod client_pool;
pub mod cloud;
pub mod config;
pub mod error;
pub mod hooks;
pub mod identity;
pub mod model;
pub mod normalize;
pub mod orchestrator;
pub mod prober;
pub mod rate_limit;
pub mod retry;
pub mod summary;
pub mod worker_pool;

pub use config::ProxyHawkConfig;
pub use error::{ProxyHawkError, ProxyHawkResult, ValidationError};
pub use hooks::{NullObserver, TracingObserver, ValidationObserver};
pub use model::{Candidate, ProxyResult, ProxyTarget, Scheme};
pub use summary::Summary;
pub use worker_pool::WorkerPool;
