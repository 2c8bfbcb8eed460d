//! Client Pool (spec §4.B): one cached `reqwest::Client` per (proxy, timeout) pair.

use crate::config::ProxyHawkConfig;
use crate::error::{ProxyHawkError, ProxyHawkResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Key into the client cache: the proxy's canonical URL (or `None` for the
/// direct client) paired with its timeout.
type ClientKey = (Option<String>, Duration);

/// Cached stats snapshot (spec §4.B `stats()`).
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    pub cached: usize,
    pub max_idle: usize,
    pub max_idle_per_host: usize,
}

/// Returns a `reqwest::Client` for a `(proxy-URL, timeout)` pair; identical
/// pairs share one client. Performs no network I/O itself.
pub struct ClientPool {
    config: RwLock<Arc<ProxyHawkConfig>>,
    clients: RwLock<HashMap<ClientKey, reqwest::Client>>,
}

impl ClientPool {
    pub fn new(config: Arc<ProxyHawkConfig>) -> Self {
        Self { config: RwLock::new(config), clients: RwLock::new(HashMap::new()) }
    }

    /// Client routed through `proxy`, built with the pool's current transport
    /// settings at the time of first insertion.
    pub fn get(&self, proxy: &str, timeout: Duration) -> ProxyHawkResult<reqwest::Client> {
        let key = (Some(proxy.to_string()), timeout);
        if let Some(client) = self.clients.read().get(&key) {
            return Ok(client.clone());
        }

        let cfg = self.config.read().clone();
        let client = build_client(&cfg, Some(proxy), timeout)?;

        let mut clients = self.clients.write();
        let client = clients.entry(key).or_insert(client).clone();
        Ok(client)
    }

    /// Client that does not route through any proxy.
    pub fn direct(&self, timeout: Duration) -> ProxyHawkResult<reqwest::Client> {
        let key = (None, timeout);
        if let Some(client) = self.clients.read().get(&key) {
            return Ok(client.clone());
        }

        let cfg = self.config.read().clone();
        let client = build_client(&cfg, None, timeout)?;

        let mut clients = self.clients.write();
        let client = clients.entry(key).or_insert(client).clone();
        Ok(client)
    }

    /// Drops every cached client, forcing the next `get`/`direct` call to
    /// rebuild. The pool performs no I/O here — `reqwest::Client`'s own idle
    /// connections are released when the last clone is dropped.
    pub fn close_idle(&self) {
        self.clients.write().clear();
    }

    /// Alias for `close_idle`; kept distinct in the public API because a
    /// caller resetting state (e.g. between test runs) reads more clearly
    /// than one calling "close idle connections" for that intent.
    pub fn reset(&self) {
        self.close_idle();
    }

    pub fn stats(&self) -> PoolStats {
        let cfg = self.config.read();
        PoolStats {
            cached: self.clients.read().len(),
            max_idle: cfg.connection_pool.max_idle_connections,
            max_idle_per_host: cfg.connection_pool.max_idle_per_host,
        }
    }

    /// Replaces the config used for clients created *after* this call.
    /// Existing cached clients are left untouched (spec §4.B).
    pub fn update(&self, config: Arc<ProxyHawkConfig>) {
        *self.config.write() = config;
    }
}

fn build_client(
    cfg: &ProxyHawkConfig,
    proxy: Option<&str>,
    timeout: Duration,
) -> ProxyHawkResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .pool_max_idle_per_host(cfg.connection_pool.max_idle_per_host)
        .pool_idle_timeout(Duration::from_secs(cfg.connection_pool.idle_timeout_secs))
        .tcp_nodelay(true)
        .user_agent(&cfg.user_agent)
        .danger_accept_invalid_certs(cfg.insecure_skip_verify)
        .http2_adaptive_window(cfg.enable_http2);

    if let Some(proxy_url) = proxy {
        let proxy =
            reqwest::Proxy::all(proxy_url).map_err(|e| ProxyHawkError::Config(e.to_string()))?;
        builder = builder.proxy(proxy);
    } else {
        builder = builder.no_proxy();
    }

    builder.build().map_err(ProxyHawkError::Network)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_is_cached_once() {
        let pool = ClientPool::new(Arc::new(ProxyHawkConfig::default()));
        let _ = pool.get("http://proxy:8080", Duration::from_secs(5)).unwrap();
        let _ = pool.get("http://proxy:8080", Duration::from_secs(5)).unwrap();
        assert_eq!(pool.stats().cached, 1);
    }

    #[test]
    fn different_timeout_is_cached_distinctly() {
        let pool = ClientPool::new(Arc::new(ProxyHawkConfig::default()));
        let _ = pool.get("http://proxy:8080", Duration::from_secs(5)).unwrap();
        let _ = pool.get("http://proxy:8080", Duration::from_secs(6)).unwrap();
        assert_eq!(pool.stats().cached, 2);
    }

    #[test]
    fn reset_clears_cache() {
        let pool = ClientPool::new(Arc::new(ProxyHawkConfig::default()));
        let _ = pool.get("http://proxy:8080", Duration::from_secs(5)).unwrap();
        assert_eq!(pool.stats().cached, 1);
        pool.reset();
        assert_eq!(pool.stats().cached, 0);
    }

    #[test]
    fn direct_client_is_cached_independently_of_proxy_clients() {
        let pool = ClientPool::new(Arc::new(ProxyHawkConfig::default()));
        let _ = pool.direct(Duration::from_secs(5)).unwrap();
        let _ = pool.get("http://proxy:8080", Duration::from_secs(5)).unwrap();
        assert_eq!(pool.stats().cached, 2);
    }
}
