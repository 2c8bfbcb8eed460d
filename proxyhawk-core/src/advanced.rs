//! Advanced Check Suite (spec §4.H): SSRF, DNS rebinding, protocol smuggling,
//! IPv6 reachability, allowed HTTP methods, path traversal, cache poisoning,
//! and Host-header injection, all run through the proxy under test.
//!
//! Evidence strings are capped at 256 bytes per spec §4.H's closing note.

use crate::client_pool::ClientPool;
use crate::cloud::default_providers;
use crate::config::ProxyHawkConfig;
use crate::model::{AdvancedChecks, CheckResult, ProxyTarget};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const EVIDENCE_CAP: usize = 256;

fn evidence(status: Option<u16>, snippet: &str) -> String {
    let mut s = match status {
        Some(code) => format!("status={code} "),
        None => String::new(),
    };
    s.push_str(snippet);
    s.truncate(EVIDENCE_CAP);
    s
}

pub struct AdvancedCheckSuite {
    pool: Arc<ClientPool>,
    cfg: Arc<ProxyHawkConfig>,
}

impl AdvancedCheckSuite {
    pub fn new(pool: Arc<ClientPool>, cfg: Arc<ProxyHawkConfig>) -> Self {
        Self { pool, cfg }
    }

    /// Runs every enabled probe, returning the aggregate flags plus one
    /// `CheckResult` per probe that actually ran.
    pub async fn run(&self, target: &ProxyTarget) -> (AdvancedChecks, Vec<CheckResult>) {
        let mut checks = AdvancedChecks::default();
        let mut results = Vec::new();
        let enabled = &self.cfg.advanced_checks;

        if enabled.enable_ssrf {
            let (vuln, detail, cr) = self.probe_ssrf(target).await;
            checks.ssrf = vuln;
            checks.ssrf_detail = detail;
            results.push(cr);
        }
        if enabled.enable_dns_rebind {
            let (vuln, detail, cr) = self.probe_dns_rebind(target).await;
            checks.dns_rebind = vuln;
            checks.dns_rebind_detail = detail;
            results.push(cr);
        }
        if enabled.enable_smuggling {
            let (vuln, detail, cr) = self.probe_smuggling(target).await;
            checks.smuggling = vuln;
            checks.smuggling_detail = detail;
            results.push(cr);
        }
        if enabled.enable_ipv6 {
            let (vuln, detail, cr) = self.probe_ipv6(target).await;
            checks.ipv6_support = vuln;
            checks.ipv6_detail = detail;
            results.push(cr);
        }
        if enabled.enable_methods {
            let (methods, detail, mut crs) = self.probe_methods(target).await;
            checks.allowed_methods = methods;
            checks.methods_detail = detail;
            results.append(&mut crs);
        }
        if enabled.enable_path_traversal {
            let (vuln, detail, cr) = self.probe_path_traversal(target).await;
            checks.path_traversal = vuln;
            checks.path_traversal_detail = detail;
            results.push(cr);
        }
        if enabled.enable_cache_poisoning {
            let (vuln, detail, mut crs) = self.probe_cache_poisoning(target).await;
            checks.cache_poisoning = vuln;
            checks.cache_poisoning_detail = detail;
            results.append(&mut crs);
        }
        if enabled.enable_host_injection {
            let (vuln, detail, cr) = self.probe_host_injection(target).await;
            checks.host_injection = vuln;
            checks.host_injection_detail = detail;
            results.push(cr);
        }

        (checks, results)
    }

    fn client(&self, target: &ProxyTarget) -> Option<reqwest::Client> {
        self.pool.get(&target.url(), Duration::from_secs(self.cfg.timeout_secs)).ok()
    }

    async fn probe_ssrf(&self, target: &ProxyTarget) -> (bool, String, CheckResult) {
        let Some(client) = self.client(target) else {
            return (false, "no client".to_string(), failed_check("ssrf"));
        };

        let mut urls = vec!["http://169.254.169.254/".to_string()];
        for provider in default_providers() {
            urls.extend(provider.metadata_urls);
        }

        for url in urls {
            let start = Instant::now();
            if let Ok(resp) = client.get(&url).send().await {
                let status = resp.status();
                let body = resp.bytes().await.unwrap_or_default();
                if status.is_success() && !body.is_empty() {
                    let snippet = String::from_utf8_lossy(&body[..body.len().min(64)]).to_string();
                    return (
                        true,
                        evidence(Some(status.as_u16()), &snippet),
                        CheckResult {
                            url,
                            success: true,
                            status: Some(status.as_u16()),
                            bytes: body.len(),
                            elapsed: start.elapsed(),
                            error: None,
                        },
                    );
                }
            }
        }

        (false, "metadata endpoints unreachable".to_string(), failed_check("ssrf"))
    }

    async fn probe_dns_rebind(&self, target: &ProxyTarget) -> (bool, String, CheckResult) {
        let Some(oob) = self.cfg.interactsh_url.clone() else {
            return (
                false,
                "no interactsh/OOB endpoint configured".to_string(),
                failed_check("dns-rebind"),
            );
        };
        let Some(client) = self.client(target) else {
            return (false, "no client".to_string(), failed_check("dns-rebind"));
        };

        let start = Instant::now();
        match client.get(&oob).send().await {
            Ok(resp) => {
                let status = resp.status();
                let body = resp.bytes().await.unwrap_or_default();
                // A genuine rebind detection requires correlating this callback
                // with the out-of-band listener's recorded lookup, which lives
                // outside this process (spec §4.H); here we only record that the
                // probe request completed and leave correlation to the listener.
                (
                    false,
                    evidence(Some(status.as_u16()), "callback sent, correlate with OOB listener"),
                    CheckResult {
                        url: oob,
                        success: status.is_success(),
                        status: Some(status.as_u16()),
                        bytes: body.len(),
                        elapsed: start.elapsed(),
                        error: None,
                    },
                )
            },
            Err(e) => (false, format!("callback failed: {e}"), failed_check("dns-rebind")),
        }
    }

    async fn probe_smuggling(&self, target: &ProxyTarget) -> (bool, String, CheckResult) {
        let url = self.cfg.test_urls.default_url.clone();
        let Ok(parsed) = url::Url::parse(&url) else {
            return (false, "bad test url".to_string(), failed_check("smuggling"));
        };
        let Some(host) = parsed.host_str() else {
            return (false, "no host".to_string(), failed_check("smuggling"));
        };
        let port = parsed.port_or_known_default().unwrap_or(80);
        let path = if parsed.path().is_empty() { "/" } else { parsed.path() };

        let start = Instant::now();
        let result: Result<(u16, Vec<u8>), std::io::Error> = async {
            let mut stream = TcpStream::connect((target.host.as_str(), target.port)).await?;
            // Conflicting framing headers: a compliant proxy must reject this
            // outright (400) rather than forward it upstream.
            let body = "0\r\n\r\nGET /smuggled HTTP/1.1\r\nHost: x\r\n\r\n";
            let request = format!(
                "GET {path} HTTP/1.1\r\nHost: {host}:{port}\r\nContent-Length: {}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(request.as_bytes()).await?;
            let mut buf = Vec::new();
            let mut tmp = [0u8; 2048];
            loop {
                let n = stream.read(&mut tmp).await?;
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&tmp[..n]);
            }
            let status = parse_status_line(&buf).unwrap_or(0);
            Ok((status, buf))
        }
        .await;

        match result {
            Ok((status, buf)) => {
                let vulnerable = status == 200;
                let snippet = String::from_utf8_lossy(&buf[..buf.len().min(64)]).to_string();
                (
                    vulnerable,
                    evidence(Some(status), &snippet),
                    CheckResult {
                        url,
                        success: true,
                        status: Some(status),
                        bytes: buf.len(),
                        elapsed: start.elapsed(),
                        error: None,
                    },
                )
            },
            Err(e) => (false, format!("probe failed: {e}"), failed_check("smuggling")),
        }
    }

    async fn probe_ipv6(&self, target: &ProxyTarget) -> (bool, String, CheckResult) {
        let url = "http://[2606:4700:4700::1111]/".to_string();
        let Some(client) = self.client(target) else {
            return (false, "no client".to_string(), failed_check("ipv6"));
        };
        let start = Instant::now();
        match client.get(&url).send().await {
            Ok(resp) => {
                let status = resp.status();
                (
                    status.is_success(),
                    evidence(Some(status.as_u16()), "ipv6 literal reachable through proxy"),
                    CheckResult {
                        url,
                        success: status.is_success(),
                        status: Some(status.as_u16()),
                        bytes: 0,
                        elapsed: start.elapsed(),
                        error: None,
                    },
                )
            },
            Err(e) => (false, format!("{e}"), failed_check("ipv6")),
        }
    }

    async fn probe_methods(&self, target: &ProxyTarget) -> (Vec<String>, String, Vec<CheckResult>) {
        let Some(client) = self.client(target) else {
            return (Vec::new(), "no client".to_string(), vec![failed_check("methods")]);
        };
        let url = self.cfg.test_urls.default_url.clone();
        let mut allowed = Vec::new();
        let mut results = Vec::new();

        for method_name in &self.cfg.advanced_checks.methods {
            let Ok(method) = reqwest::Method::from_bytes(method_name.as_bytes()) else { continue };
            let start = Instant::now();
            match client.request(method, &url).send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let permitted = status != 405 && status != 501;
                    if permitted {
                        allowed.push(method_name.clone());
                    }
                    results.push(CheckResult {
                        url: url.clone(),
                        success: permitted,
                        status: Some(status),
                        bytes: 0,
                        elapsed: start.elapsed(),
                        error: None,
                    });
                },
                Err(e) => results.push(CheckResult {
                    url: url.clone(),
                    success: false,
                    status: None,
                    bytes: 0,
                    elapsed: start.elapsed(),
                    error: Some(e.to_string()),
                }),
            }
        }

        let detail = format!("allowed methods: {}", allowed.join(", "));
        (allowed, detail, results)
    }

    async fn probe_path_traversal(&self, target: &ProxyTarget) -> (bool, String, CheckResult) {
        let Some(client) = self.client(target) else {
            return (false, "no client".to_string(), failed_check("path-traversal"));
        };
        let base = self.cfg.test_urls.default_url.clone();
        let variants = [
            "../../../../etc/passwd",
            "..%2f..%2f..%2f..%2fetc%2fpasswd",
            "....//....//....//etc/passwd",
        ];

        for variant in variants {
            let url = format!("{}/{}", base.trim_end_matches('/'), variant);
            let start = Instant::now();
            if let Ok(resp) = client.get(&url).send().await {
                let status = resp.status();
                let body = resp.bytes().await.unwrap_or_default();
                if status.as_u16() == 200 && body.windows(5).any(|w| w == b"root:") {
                    let snippet = String::from_utf8_lossy(&body[..body.len().min(64)]).to_string();
                    return (
                        true,
                        evidence(Some(200), &snippet),
                        CheckResult {
                            url,
                            success: true,
                            status: Some(200),
                            bytes: body.len(),
                            elapsed: start.elapsed(),
                            error: None,
                        },
                    );
                }
            }
        }

        (false, "no traversal variant succeeded".to_string(), failed_check("path-traversal"))
    }

    async fn probe_cache_poisoning(&self, target: &ProxyTarget) -> (bool, String, Vec<CheckResult>) {
        let Some(client) = self.client(target) else {
            return (false, "no client".to_string(), vec![failed_check("cache-poisoning")]);
        };
        let url = self.cfg.test_urls.default_url.clone();
        let marker = "attacker.example";
        let mut results = Vec::new();

        let start = Instant::now();
        let poisoned = client.get(&url).header("X-Forwarded-Host", marker).send().await;
        let poisoned_ok = poisoned.is_ok();
        results.push(match &poisoned {
            Ok(resp) => CheckResult {
                url: url.clone(),
                success: true,
                status: Some(resp.status().as_u16()),
                bytes: 0,
                elapsed: start.elapsed(),
                error: None,
            },
            Err(e) => CheckResult {
                url: url.clone(),
                success: false,
                status: None,
                bytes: 0,
                elapsed: start.elapsed(),
                error: Some(e.to_string()),
            },
        });
        if !poisoned_ok {
            return (false, "poisoned request failed".to_string(), results);
        }

        let start = Instant::now();
        match client.get(&url).send().await {
            Ok(resp) => {
                let status = resp.status();
                let cache_hit = resp
                    .headers()
                    .get("cache-control")
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.to_ascii_lowercase().contains("hit"))
                    .unwrap_or(false);
                let body = resp.bytes().await.unwrap_or_default();
                let reflected = String::from_utf8_lossy(&body).contains(marker);
                results.push(CheckResult {
                    url: url.clone(),
                    success: true,
                    status: Some(status.as_u16()),
                    bytes: body.len(),
                    elapsed: start.elapsed(),
                    error: None,
                });
                let vulnerable = reflected || cache_hit;
                let detail = if vulnerable {
                    evidence(Some(status.as_u16()), "clean request reflects poisoned header/variant")
                } else {
                    "no poisoning observed on clean re-request".to_string()
                };
                (vulnerable, detail, results)
            },
            Err(e) => {
                results.push(CheckResult {
                    url,
                    success: false,
                    status: None,
                    bytes: 0,
                    elapsed: start.elapsed(),
                    error: Some(e.to_string()),
                });
                (false, "clean re-request failed".to_string(), results)
            },
        }
    }

    async fn probe_host_injection(&self, target: &ProxyTarget) -> (bool, String, CheckResult) {
        let Some(client) = self.client(target) else {
            return (false, "no client".to_string(), failed_check("host-injection"));
        };
        let url = self.cfg.test_urls.default_url.clone();
        let injected_host = "attacker.example";
        let start = Instant::now();

        match client.get(&url).header(reqwest::header::HOST, injected_host).send().await {
            Ok(resp) => {
                let status = resp.status();
                let location = resp
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                let redirect_reflects = status.is_redirection() && location.contains(injected_host);
                let body = resp.bytes().await.unwrap_or_default();
                let body_reflects = status.as_u16() == 200
                    && String::from_utf8_lossy(&body).contains(injected_host);
                let vulnerable = redirect_reflects || body_reflects;
                let detail = if vulnerable {
                    evidence(Some(status.as_u16()), &format!("Location/body reflects {injected_host}"))
                } else {
                    "no reflection of injected Host".to_string()
                };
                (
                    vulnerable,
                    detail,
                    CheckResult {
                        url,
                        success: true,
                        status: Some(status.as_u16()),
                        bytes: body.len(),
                        elapsed: start.elapsed(),
                        error: None,
                    },
                )
            },
            Err(e) => (false, format!("{e}"), failed_check("host-injection")),
        }
    }
}

fn failed_check(name: &str) -> CheckResult {
    CheckResult {
        url: name.to_string(),
        success: false,
        status: None,
        bytes: 0,
        elapsed: Duration::ZERO,
        error: Some("probe did not run".to_string()),
    }
}

fn parse_status_line(buf: &[u8]) -> Option<u16> {
    let mut headers = [httparse::EMPTY_HEADER; 16];
    let mut resp = httparse::Response::new(&mut headers);
    match resp.parse(buf).ok()? {
        httparse::Status::Complete(_) => resp.code,
        httparse::Status::Partial => resp.code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evidence_truncates_to_cap() {
        let long = "a".repeat(1000);
        let e = evidence(Some(200), &long);
        assert!(e.len() <= EVIDENCE_CAP);
    }

    #[test]
    fn parse_status_line_reads_code() {
        let raw = b"HTTP/1.1 400 Bad Request\r\n\r\n";
        assert_eq!(parse_status_line(raw), Some(400));
    }
}
