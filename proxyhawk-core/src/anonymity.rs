//! Anonymity Analyzer (spec §4.F): compares a direct-fetch identity against a
//! through-proxy fetch.

use crate::client_pool::ClientPool;
use crate::config::ProxyHawkConfig;
use crate::identity::IdentityParserRegistry;
use crate::model::ProxyTarget;
use std::sync::Arc;
use std::time::Duration;

/// Headers whose value might betray the real client IP (spec §4.F).
const FORWARDED_HEADER_NAMES: &[&str] =
    &["via", "x-forwarded-for", "x-real-ip", "forwarded", "proxy-connection"];

#[derive(Debug, Clone, Default)]
pub struct AnonymityOutcome {
    pub real_ip: Option<String>,
    pub proxy_ip: Option<String>,
    pub is_anonymous: bool,
}

pub struct AnonymityAnalyzer {
    pool: Arc<ClientPool>,
    cfg: Arc<ProxyHawkConfig>,
    parsers: IdentityParserRegistry,
}

impl AnonymityAnalyzer {
    pub fn new(pool: Arc<ClientPool>, cfg: Arc<ProxyHawkConfig>) -> Self {
        Self { pool, cfg, parsers: IdentityParserRegistry::default() }
    }

    /// Runs the direct-vs-proxy identity comparison of spec §4.F. Never fails
    /// the overall validation: any step that can't determine an IP leaves
    /// `is_anonymous = false`.
    pub async fn analyze(&self, target: &ProxyTarget) -> AnonymityOutcome {
        let timeout = Duration::from_secs(self.cfg.timeout_secs);
        let url = &self.cfg.test_urls.default_url;

        let real_ip = self.fetch_identity(self.pool.direct(timeout), url).await;

        let proxy_client = self.pool.get(&target.url(), timeout);
        let (proxy_ip, forwarded_values) = match proxy_client {
            Ok(client) => self.fetch_identity_with_headers(Ok(client), url).await,
            Err(_) => (None, Vec::new()),
        };

        let is_anonymous = match (&real_ip, &proxy_ip) {
            (Some(real), Some(proxy)) => {
                real != proxy
                    && !forwarded_values.iter().any(|v| v.contains(real.as_str()))
            },
            _ => false,
        };

        AnonymityOutcome { real_ip, proxy_ip, is_anonymous }
    }

    async fn fetch_identity(&self, client: Result<reqwest::Client, crate::error::ProxyHawkError>, url: &str) -> Option<String> {
        self.fetch_identity_with_headers(client, url).await.0
    }

    async fn fetch_identity_with_headers(
        &self,
        client: Result<reqwest::Client, crate::error::ProxyHawkError>,
        url: &str,
    ) -> (Option<String>, Vec<String>) {
        let client = match client {
            Ok(c) => c,
            Err(_) => return (None, Vec::new()),
        };
        match client.get(url).send().await {
            Ok(resp) => {
                let forwarded: Vec<String> = FORWARDED_HEADER_NAMES
                    .iter()
                    .filter_map(|name| resp.headers().get(*name))
                    .filter_map(|v| v.to_str().ok())
                    .map(|v| v.to_string())
                    .collect();
                let body = resp.text().await.unwrap_or_default();
                let ip = self.parsers.parse("default", &body);
                (ip, forwarded)
            },
            Err(_) => (None, Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_requires_both_ips_and_distinct_values() {
        let outcome = AnonymityOutcome {
            real_ip: Some("203.0.113.42".to_string()),
            proxy_ip: Some("198.51.100.7".to_string()),
            is_anonymous: true,
        };
        assert_ne!(outcome.real_ip, outcome.proxy_ip);
        assert!(outcome.is_anonymous);
    }
}
