//! Configuration schema (spec §6), owned by the core so embedders besides the CLI
//! can construct a `ProxyHawkConfig` directly without going through a TOML file.

use crate::model::CloudProvider;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_concurrency() -> usize {
    10
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_user_agent() -> String {
    "ProxyHawk/1.0".to_string()
}
fn default_min_response_bytes() -> usize {
    1
}
fn default_identity_url() -> String {
    "https://api.ipify.org?format=json".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_retry_delay_ms() -> u64 {
    200
}
fn default_max_retry_delay_ms() -> u64 {
    5_000
}
fn default_backoff_factor() -> f64 {
    2.0
}
/// Spec §4.D's built-in transient categories, minus TLS certificate errors —
/// those only retry when a caller opts in by adding "tls_certificate" here.
fn default_retryable_errors() -> Vec<String> {
    vec![
        "connection_refused".to_string(),
        "connection_reset".to_string(),
        "timeout".to_string(),
        "host_unreachable".to_string(),
        "network_unreachable".to_string(),
    ]
}
fn default_max_idle_connections() -> usize {
    100
}
fn default_max_idle_per_host() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationPolicy {
    #[serde(default = "default_min_response_bytes")]
    pub min_response_bytes: usize,
    #[serde(default)]
    pub disallowed_keywords: Vec<String>,
    /// Exact status code required; 0 means "any 2xx".
    #[serde(default)]
    pub require_status_code: u16,
    #[serde(default)]
    pub require_content_match: Option<String>,
    #[serde(default)]
    pub require_header_fields: Vec<String>,
    /// Open Question (spec §9): whether a bodyless 204 satisfies the success
    /// contract when `require_status_code == 0`. Default false: min_response_bytes
    /// still applies unless a caller opts in explicitly.
    #[serde(default)]
    pub accept_empty_204: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            min_response_bytes: default_min_response_bytes(),
            disallowed_keywords: Vec::new(),
            require_status_code: 0,
            require_content_match: None,
            require_header_fields: Vec::new(),
            accept_empty_204: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestUrls {
    #[serde(default = "default_identity_url")]
    pub default_url: String,
    #[serde(default)]
    pub urls: Vec<String>,
}

impl Default for TestUrls {
    fn default() -> Self {
        Self { default_url: default_identity_url(), urls: Vec::new() }
    }
}

/// Rate-limiter policy (§4.C). Both `per_host` and `per_proxy` may be true at
/// once; per spec §9's resolved open question, both gates apply independently —
/// a candidate must clear both before a request proceeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub per_host: bool,
    #[serde(default)]
    pub per_proxy: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { enabled: false, delay_ms: 0, per_host: false, per_proxy: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Which transient-error tags actually get retried (spec §6's
    /// `retryable_errors`); see `TransientReason::config_key` for the tag names.
    #[serde(default = "default_retryable_errors")]
    pub retryable_errors: Vec<String>,
}

fn default_retry_enabled() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_retry_enabled(),
            max_retries: default_max_retries(),
            initial_retry_delay_ms: default_initial_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            backoff_factor: default_backoff_factor(),
            retryable_errors: default_retryable_errors(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedChecksConfig {
    #[serde(default)]
    pub enable_ssrf: bool,
    #[serde(default)]
    pub enable_dns_rebind: bool,
    #[serde(default)]
    pub enable_smuggling: bool,
    #[serde(default)]
    pub enable_ipv6: bool,
    #[serde(default)]
    pub enable_methods: bool,
    #[serde(default)]
    pub enable_path_traversal: bool,
    #[serde(default)]
    pub enable_cache_poisoning: bool,
    #[serde(default)]
    pub enable_host_injection: bool,
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,
}

fn default_methods() -> Vec<String> {
    vec!["GET".into(), "POST".into(), "PUT".into(), "DELETE".into(), "TRACE".into(), "CONNECT".into()]
}

impl Default for AdvancedChecksConfig {
    fn default() -> Self {
        Self {
            enable_ssrf: false,
            enable_dns_rebind: false,
            enable_smuggling: false,
            enable_ipv6: false,
            enable_methods: false,
            enable_path_traversal: false,
            enable_cache_poisoning: false,
            enable_host_injection: false,
            methods: default_methods(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionPoolConfig {
    #[serde(default = "default_max_idle_connections")]
    pub max_idle_connections: usize,
    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_idle_timeout_secs() -> u64 {
    90
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_connections: default_max_idle_connections(),
            max_idle_per_host: default_max_idle_per_host(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

/// Top-level configuration, one row per entry in spec §6's "Configuration schema".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyHawkConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub insecure_skip_verify: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub default_headers: HashMap<String, String>,
    #[serde(default)]
    pub validation: ValidationPolicy,
    #[serde(default)]
    pub test_urls: TestUrls,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub enable_cloud_checks: bool,
    #[serde(default)]
    pub cloud_providers: Vec<CloudProvider>,
    #[serde(default)]
    pub advanced_checks: AdvancedChecksConfig,
    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,
    #[serde(default = "default_true")]
    pub enable_http2: bool,
    #[serde(default)]
    pub enable_http3: bool,
    #[serde(default = "default_true")]
    pub auto_fallback: bool,
    #[serde(default)]
    pub allow_private: bool,
    #[serde(default)]
    pub interactsh_url: Option<String>,
    #[serde(default)]
    pub interactsh_token: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for ProxyHawkConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            insecure_skip_verify: false,
            user_agent: default_user_agent(),
            default_headers: HashMap::new(),
            validation: ValidationPolicy::default(),
            test_urls: TestUrls::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            enable_cloud_checks: true,
            cloud_providers: Vec::new(),
            advanced_checks: AdvancedChecksConfig::default(),
            connection_pool: ConnectionPoolConfig::default(),
            enable_http2: true,
            enable_http3: false,
            auto_fallback: true,
            allow_private: false,
            interactsh_url: None,
            interactsh_token: None,
        }
    }
}
