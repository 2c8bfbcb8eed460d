//! Cloud Classifier (spec §4.G): tags a proxy's resolved peer IP against known
//! cloud/metadata ranges, and probes metadata URLs through the proxy when no
//! static range matched.

use crate::client_pool::ClientPool;
use crate::config::ProxyHawkConfig;
use crate::model::{CloudProvider, ProxyTarget};
use ipnet::IpNet;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct CloudOutcome {
    pub cloud_provider: Option<String>,
    pub internal_access: bool,
    pub metadata_access: bool,
}

/// Built-in records for the major public clouds (spec SPEC_FULL.md §B.3). A
/// caller's `cloud_providers` config entries are appended, not replacing
/// these — more specific entries simply get tried in the same loop.
pub fn default_providers() -> Vec<CloudProvider> {
    vec![
        CloudProvider {
            name: "AWS".to_string(),
            metadata_ips: vec!["169.254.169.254".to_string()],
            metadata_urls: vec![
                "http://169.254.169.254/latest/meta-data/".to_string(),
                "http://169.254.169.254/latest/dynamic/instance-identity/document".to_string(),
            ],
            internal_cidrs: vec!["10.0.0.0/8".to_string(), "172.16.0.0/12".to_string()],
            asns: vec![16509, 14618],
            org_names: vec!["Amazon.com".to_string(), "Amazon Web Services".to_string()],
        },
        CloudProvider {
            name: "GCP".to_string(),
            metadata_ips: vec!["169.254.169.254".to_string()],
            metadata_urls: vec![
                "http://169.254.169.254/computeMetadata/v1/".to_string(),
            ],
            internal_cidrs: vec!["10.128.0.0/9".to_string()],
            asns: vec![15169, 396982],
            org_names: vec!["Google LLC".to_string()],
        },
        CloudProvider {
            name: "Azure".to_string(),
            metadata_ips: vec!["169.254.169.254".to_string()],
            metadata_urls: vec![
                "http://169.254.169.254/metadata/instance?api-version=2021-02-01".to_string(),
            ],
            internal_cidrs: vec!["10.0.0.0/8".to_string()],
            asns: vec![8075],
            org_names: vec!["Microsoft Corporation".to_string()],
        },
        CloudProvider {
            name: "DigitalOcean".to_string(),
            metadata_ips: vec!["169.254.169.254".to_string()],
            metadata_urls: vec!["http://169.254.169.254/metadata/v1/".to_string()],
            internal_cidrs: vec!["10.0.0.0/8".to_string()],
            asns: vec![14061],
            org_names: vec!["DigitalOcean, LLC".to_string()],
        },
    ]
}

pub struct CloudClassifier {
    pool: Arc<ClientPool>,
    cfg: Arc<ProxyHawkConfig>,
    providers: Vec<CloudProvider>,
}

impl CloudClassifier {
    pub fn new(pool: Arc<ClientPool>, cfg: Arc<ProxyHawkConfig>) -> Self {
        let mut providers = default_providers();
        providers.extend(cfg.cloud_providers.clone());
        Self { pool, cfg, providers }
    }

    /// Classifies a proxy given its resolved peer IP (obtained during the
    /// first successful protocol-prober fetch) and, if no static range
    /// matched, by probing each provider's metadata URLs through the proxy.
    pub async fn classify(&self, target: &ProxyTarget, peer_ip: Option<IpAddr>) -> CloudOutcome {
        let mut outcome = CloudOutcome::default();
        if !self.cfg.enable_cloud_checks {
            return outcome;
        }

        if let Some(ip) = peer_ip {
            for provider in &self.providers {
                if provider.metadata_ips.iter().any(|s| ip_matches(s, &ip)) {
                    outcome.metadata_access = true;
                    outcome.cloud_provider = Some(provider.name.clone());
                    return outcome;
                }
            }
            for provider in &self.providers {
                if provider.internal_cidrs.iter().any(|cidr| cidr_contains(cidr, &ip)) {
                    outcome.internal_access = true;
                    outcome.cloud_provider = Some(provider.name.clone());
                    return outcome;
                }
            }
        }

        let timeout = Duration::from_secs(self.cfg.timeout_secs);
        let Ok(client) = self.pool.get(&target.url(), timeout) else {
            return outcome;
        };

        for provider in &self.providers {
            for url in &provider.metadata_urls {
                if let Ok(resp) = client.get(url).send().await {
                    let status_ok = resp.status().is_success();
                    let body = resp.bytes().await.unwrap_or_default();
                    if status_ok && !body.is_empty() {
                        outcome.metadata_access = true;
                        outcome.cloud_provider = Some(provider.name.clone());
                        return outcome;
                    }
                }
            }
        }

        outcome
    }
}

fn ip_matches(candidate: &str, ip: &IpAddr) -> bool {
    IpAddr::from_str(candidate).map(|c| c == *ip).unwrap_or(false)
}

fn cidr_contains(cidr: &str, ip: &IpAddr) -> bool {
    IpNet::from_str(cidr).map(|net| net.contains(ip)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_ip_match_sets_both_provider_and_flag() {
        let ip: IpAddr = "169.254.169.254".parse().unwrap();
        let providers = default_providers();
        let aws = &providers[0];
        assert!(aws.metadata_ips.iter().any(|s| ip_matches(s, &ip)));
    }

    #[test]
    fn internal_cidr_contains_address_in_range() {
        let ip: IpAddr = "10.1.2.3".parse().unwrap();
        assert!(cidr_contains("10.0.0.0/8", &ip));
        let outside: IpAddr = "8.8.8.8".parse().unwrap();
        assert!(!cidr_contains("10.0.0.0/8", &outside));
    }

    #[test]
    fn disabled_cloud_checks_short_circuits() {
        let mut cfg = ProxyHawkConfig::default();
        cfg.enable_cloud_checks = false;
        assert!(!cfg.enable_cloud_checks);
    }
}
