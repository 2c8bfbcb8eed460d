//! Unified error types for ProxyHawk Core.

use std::error::Error as StdError;
use thiserror::Error;

/// Why a candidate URL failed normalization or policy validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid host: {0}")]
    InvalidHost(String),

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("unsupported scheme: {0}")]
    InvalidScheme(String),

    #[error("address is private or otherwise forbidden: {0}")]
    PrivateIp(String),

    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),
}

/// Main error type for all ProxyHawk Core operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyHawkError {
    /// Candidate failed normalization/validation (§4.A).
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration is malformed or refers to something that can't be resolved.
    #[error("configuration error: {0}")]
    Config(String),

    /// Underlying HTTP client / transport error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// SOCKS handshake or tunnel error.
    #[error("socks error: {0}")]
    Socks(String),

    /// Filesystem I/O error (candidate file, config file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A deadline elapsed before the operation completed.
    #[error("timeout")]
    Timeout,

    /// The root cancellation signal fired while this operation was in flight.
    #[error("cancelled")]
    Cancelled,

    /// All retry attempts were exhausted (§4.D).
    #[error("retry exhausted after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: Box<ProxyHawkError> },

    /// A probe ran but its response failed content/shape policy (§4.E "successful fetch").
    #[error("probe failed: {0}")]
    Probe(String),

    /// A transport-level failure classified by cause rather than by carrying the
    /// originating error (neither `reqwest::Error` nor `std::io::Error` is `Clone`,
    /// and this cause needs to survive being handed back out of the Protocol Prober).
    #[error("transient transport error: {0}")]
    Transient(TransientReason),

    /// A worker panicked while validating a candidate; recovered, never propagated.
    #[error("system panic: {0}")]
    SystemPanic(String),
}

pub type ProxyHawkResult<T> = Result<T, ProxyHawkError>;

/// Coarse transport-failure categories from spec §4.D's retry taxonomy, named to
/// match `RetryConfig::retryable_errors`'s string tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientReason {
    ConnectionRefused,
    ConnectionReset,
    Timeout,
    HostUnreachable,
    NetworkUnreachable,
    TlsCertificate,
}

impl TransientReason {
    /// The `retryable_errors` config tag this cause matches.
    pub fn config_key(self) -> &'static str {
        match self {
            TransientReason::ConnectionRefused => "connection_refused",
            TransientReason::ConnectionReset => "connection_reset",
            TransientReason::Timeout => "timeout",
            TransientReason::HostUnreachable => "host_unreachable",
            TransientReason::NetworkUnreachable => "network_unreachable",
            TransientReason::TlsCertificate => "tls_certificate",
        }
    }
}

impl std::fmt::Display for TransientReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.config_key())
    }
}

/// Maps a raw `io::ErrorKind` onto the retry taxonomy. Stable `ErrorKind` has no
/// dedicated host/network-unreachable variants, so those fall back to the closest
/// stable kind available (`NotConnected`).
pub(crate) fn classify_io_error_kind(kind: std::io::ErrorKind) -> TransientReason {
    match kind {
        std::io::ErrorKind::ConnectionRefused => TransientReason::ConnectionRefused,
        std::io::ErrorKind::ConnectionReset => TransientReason::ConnectionReset,
        std::io::ErrorKind::TimedOut => TransientReason::Timeout,
        _ => TransientReason::NetworkUnreachable,
    }
}

/// Walks an error's `source()` chain looking for a wrapped `io::Error` or a TLS
/// certificate failure, so errors from `reqwest`/`tokio-socks` (neither of which
/// exposes a stable "why did connect fail" enum) can still be classified.
pub(crate) fn classify_dyn_error(e: &(dyn StdError + 'static)) -> Option<TransientReason> {
    let mut cause: Option<&(dyn StdError + 'static)> = Some(e);
    while let Some(err) = cause {
        if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
            return Some(classify_io_error_kind(io_err.kind()));
        }
        if err.to_string().to_ascii_lowercase().contains("certificate") {
            return Some(TransientReason::TlsCertificate);
        }
        cause = err.source();
    }
    None
}

impl ProxyHawkError {
    /// Classifies this error as transient per §4.D's retry taxonomy, gated by
    /// `retryable_errors` so a category like TLS certificate failures only
    /// retries when explicitly configured (spec §4.D: "does not retry ... TLS
    /// certificate errors (unless configured otherwise)").
    pub fn is_transient(&self, retryable_errors: &[String]) -> bool {
        let reason = match self {
            ProxyHawkError::Timeout => TransientReason::Timeout,
            ProxyHawkError::Network(e) => {
                if e.is_timeout() {
                    TransientReason::Timeout
                } else {
                    classify_dyn_error(e).unwrap_or(TransientReason::ConnectionRefused)
                }
            },
            ProxyHawkError::Io(e) => classify_io_error_kind(e.kind()),
            ProxyHawkError::Transient(reason) => *reason,
            _ => return false,
        };
        retryable_errors.iter().any(|tag| tag == reason.config_key())
    }
}
