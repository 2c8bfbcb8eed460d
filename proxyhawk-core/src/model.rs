//! Data model: `Candidate` / `ProxyTarget` / `ProxyResult` and their building blocks (§3).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Transport scheme a candidate can declare or be probed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
    Socks4,
    Socks5,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::Socks4 => "socks4",
            Scheme::Socks5 => "socks5",
        }
    }

    pub fn parse(s: &str) -> Option<Scheme> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Some(Scheme::Http),
            "https" => Some(Scheme::Https),
            "socks4" => Some(Scheme::Socks4),
            "socks5" => Some(Scheme::Socks5),
            _ => None,
        }
    }

    /// The order auto-fallback probing walks through (§4.E.3).
    pub fn fallback_order() -> [Scheme; 4] {
        [Scheme::Http, Scheme::Https, Scheme::Socks5, Scheme::Socks4]
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate proxy, normalized into its component parts (§3 "Candidate").
///
/// Immutable after construction; owned by the Worker Pool for the lifetime of
/// one validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyTarget {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub credentials: Option<(String, String)>,
}

impl ProxyTarget {
    /// Canonical URL form, used as the client-pool / rate-limiter key.
    pub fn url(&self) -> String {
        match &self.credentials {
            Some((user, pass)) => {
                format!("{}://{}:{}@{}:{}", self.scheme, user, pass, self.host, self.port)
            },
            None => format!("{}://{}:{}", self.scheme, self.host, self.port),
        }
    }
}

impl fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Which transports + HTTP revisions a candidate was observed to support.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supports {
    pub http: bool,
    pub https: bool,
    pub http2: bool,
    pub http3: bool,
    pub socks4: bool,
    pub socks5: bool,
}

/// The outcome of a single probe/check run against one candidate (§3 `check_results`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub url: String,
    pub success: bool,
    pub status: Option<u16>,
    pub bytes: usize,
    pub elapsed: Duration,
    pub error: Option<String>,
}

/// Per-probe outcomes from the Advanced Check Suite (§4.H).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdvancedChecks {
    pub ssrf: bool,
    pub ssrf_detail: String,
    pub dns_rebind: bool,
    pub dns_rebind_detail: String,
    pub smuggling: bool,
    pub smuggling_detail: String,
    pub ipv6_support: bool,
    pub ipv6_detail: String,
    pub allowed_methods: Vec<String>,
    pub methods_detail: String,
    pub path_traversal: bool,
    pub path_traversal_detail: String,
    pub cache_poisoning: bool,
    pub cache_poisoning_detail: String,
    pub host_injection: bool,
    pub host_injection_detail: String,
}

/// One result per candidate, produced exactly once (§3 "ProxyResult").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyResult {
    pub target: ProxyTarget,
    pub working: bool,
    pub proxy_type: Option<Scheme>,
    pub supports: Supports,
    pub speed: Option<Duration>,
    pub real_ip: Option<String>,
    pub proxy_ip: Option<String>,
    pub is_anonymous: bool,
    pub cloud_provider: Option<String>,
    pub internal_access: bool,
    pub metadata_access: bool,
    pub advanced: AdvancedChecks,
    pub check_results: Vec<CheckResult>,
    pub error: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ProxyResult {
    /// A result for a candidate that failed normalization itself, so no
    /// `ProxyTarget` could be constructed. `target` carries the raw input
    /// verbatim in its `host` field with a sentinel port so the failure is
    /// still traceable back to the offending candidate string.
    pub fn failed_for_raw(raw: impl Into<String>, error: impl Into<String>) -> Self {
        let target = ProxyTarget { scheme: Scheme::Http, host: raw.into(), port: 0, credentials: None };
        Self::failed(target, error)
    }

    /// A result for a candidate that never got past rate-limiting/dispatch.
    pub fn failed(target: ProxyTarget, error: impl Into<String>) -> Self {
        Self {
            target,
            working: false,
            proxy_type: None,
            supports: Supports::default(),
            speed: None,
            real_ip: None,
            proxy_ip: None,
            is_anonymous: false,
            cloud_provider: None,
            internal_access: false,
            metadata_access: false,
            advanced: AdvancedChecks::default(),
            check_results: Vec::new(),
            error: Some(error.into()),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Checks the invariants of §3 that must hold for every emitted result.
    ///
    /// Intended for tests and debug assertions, not for gating production output —
    /// a violated invariant here is a bug in the orchestrator, not a bad candidate.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.working && (self.proxy_type.is_none() || self.speed.map(|d| d.is_zero()).unwrap_or(true)) {
            return Err("working=true requires proxy_type != None and speed > 0".into());
        }
        if self.is_anonymous && !self.working {
            return Err("is_anonymous=true requires working=true".into());
        }
        if self.metadata_access && self.cloud_provider.is_none() {
            return Err("metadata_access=true requires cloud_provider to be set".into());
        }
        Ok(())
    }
}

/// A proxy URL offered for validation, before normalization.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub raw: String,
}

impl Candidate {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }
}

/// A known cloud provider's identifying ranges, loaded at startup and immutable
/// thereafter (§3 "Cloud provider record").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudProvider {
    pub name: String,
    pub metadata_ips: Vec<String>,
    pub metadata_urls: Vec<String>,
    pub internal_cidrs: Vec<String>,
    #[serde(default)]
    pub asns: Vec<u32>,
    #[serde(default)]
    pub org_names: Vec<String>,
}
