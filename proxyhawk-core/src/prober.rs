//! Protocol Prober (spec §4.E): determines which of the four transports a
//! candidate actually implements, auto-falling through on failure.
//!
//! HTTP, HTTPS, and SOCKS5 probes go through the Client Pool's `reqwest`
//! clients — `reqwest`'s `socks` feature performs the SOCKS5 handshake and
//! CONNECT tunneling internally, the way `client_builder.rs`'s own
//! `test_valid_socks5_proxy` exercises it. SOCKS4 has no client-side support
//! in `reqwest`, so that path dials and speaks the handshake directly via
//! `tokio-socks` and issues a hand-rolled HTTP/1.1 request over the tunnel,
//! wrapping it in TLS for the HTTPS leg.

use crate::client_pool::ClientPool;
use crate::config::ProxyHawkConfig;
use crate::error::{classify_dyn_error, classify_io_error_kind, ProxyHawkError, TransientReason};
use crate::model::{CheckResult, ProxyTarget, Scheme, Supports};
use rustls::pki_types::ServerName;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// The "successful fetch" policy of spec §4.E's closing paragraph.
pub struct FetchPolicy<'a> {
    pub min_response_bytes: usize,
    pub disallowed_keywords: &'a [String],
    pub require_status_code: u16,
    pub require_content_match: Option<&'a str>,
    pub require_header_fields: &'a [String],
    pub accept_empty_204: bool,
}

impl<'a> FetchPolicy<'a> {
    pub fn from_config(cfg: &'a ProxyHawkConfig) -> Self {
        Self {
            min_response_bytes: cfg.validation.min_response_bytes,
            disallowed_keywords: &cfg.validation.disallowed_keywords,
            require_status_code: cfg.validation.require_status_code,
            require_content_match: cfg.validation.require_content_match.as_deref(),
            require_header_fields: &cfg.validation.require_header_fields,
            accept_empty_204: cfg.validation.accept_empty_204,
        }
    }

    pub fn evaluate(&self, status: u16, headers: &[(String, String)], body: &[u8]) -> Result<(), String> {
        let status_ok = if self.require_status_code != 0 {
            status == self.require_status_code
        } else {
            (200..300).contains(&status)
        };
        if !status_ok {
            return Err(format!("status {status} did not satisfy policy"));
        }

        let skip_body_len_check = status == 204 && self.accept_empty_204;
        if !skip_body_len_check && body.len() < self.min_response_bytes {
            return Err(format!("body of {} bytes below minimum {}", body.len(), self.min_response_bytes));
        }

        let body_text = String::from_utf8_lossy(body);
        for kw in self.disallowed_keywords {
            if body_text.contains(kw.as_str()) {
                return Err(format!("body contains disallowed keyword {kw:?}"));
            }
        }
        if let Some(needle) = self.require_content_match {
            if !body_text.contains(needle) {
                return Err(format!("body missing required content match {needle:?}"));
            }
        }
        for required in self.require_header_fields {
            if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(required)) {
                return Err(format!("missing required header {required:?}"));
            }
        }
        Ok(())
    }
}

/// Full protocol-probe outcome for one candidate.
#[derive(Debug, Default)]
pub struct ProbeReport {
    pub proxy_type: Option<Scheme>,
    pub supports: Supports,
    pub speed: Option<Duration>,
    pub check_results: Vec<CheckResult>,
    /// Peer IP observed on the first successful fetch, for the Cloud Classifier (§4.G).
    pub peer_ip: Option<IpAddr>,
    /// Classified cause of the last failed attempt, so a caller wrapping this
    /// probe in `with_retry` can tell a transient connection failure (should
    /// retry) from a policy/content mismatch (should not). `None` when every
    /// scheme succeeded, or when no scheme was attempted.
    pub last_error: Option<ProxyHawkError>,
}

pub struct Prober {
    pool: Arc<ClientPool>,
    cfg: Arc<ProxyHawkConfig>,
    tls_config: Arc<rustls::ClientConfig>,
}

impl Prober {
    pub fn new(pool: Arc<ClientPool>, cfg: Arc<ProxyHawkConfig>) -> Self {
        Self { pool, cfg, tls_config: Arc::new(build_tls_client_config()) }
    }

    /// Runs the procedure of spec §4.E against one normalized target.
    pub async fn probe(&self, target: &ProxyTarget) -> ProbeReport {
        let mut report = ProbeReport::default();

        let schemes: Vec<Scheme> = if self.cfg.auto_fallback {
            let mut ordered = vec![target.scheme];
            for s in Scheme::fallback_order() {
                if s != target.scheme {
                    ordered.push(s);
                }
            }
            ordered
        } else {
            vec![target.scheme]
        };

        for scheme in schemes {
            let attempt_target = ProxyTarget { scheme, ..target.clone() };
            let (http_check, herr) = match scheme {
                Scheme::Socks4 => self.fetch_via_socks4(&attempt_target, false).await,
                _ => self.fetch_via_reqwest(&attempt_target, false).await,
            };

            let succeeded = http_check.success;
            report.check_results.push(http_check);
            if !succeeded {
                report.last_error = herr;
                continue;
            }
            report.last_error = None;

            match scheme {
                Scheme::Http | Scheme::Https => report.supports.http = true,
                Scheme::Socks4 => report.supports.socks4 = true,
                Scheme::Socks5 => report.supports.socks5 = true,
            }
            if report.proxy_type.is_none() {
                report.proxy_type = Some(scheme);
                report.speed = report.check_results.last().map(|c| c.elapsed);
                report.peer_ip = resolve_peer_ip(&target.host, target.port).await;
            }

            let (https_check, _) = match scheme {
                Scheme::Socks4 => self.fetch_via_socks4(&attempt_target, true).await,
                _ => self.fetch_via_reqwest(&attempt_target, true).await,
            };
            if https_check.success {
                report.supports.https = true;
            }
            report.check_results.push(https_check);

            break;
        }

        report
    }

    /// Returns the check outcome alongside its classified failure cause (`None`
    /// on success), so a caller retrying the whole probe can tell a transient
    /// connection failure from a policy/content mismatch.
    async fn fetch_via_reqwest(&self, target: &ProxyTarget, want_https_target: bool) -> (CheckResult, Option<ProxyHawkError>) {
        let timeout = Duration::from_secs(self.cfg.timeout_secs);
        let client = match self.pool.get(&target.url(), timeout) {
            Ok(c) => c,
            Err(e) => {
                let msg = e.to_string();
                return (
                    CheckResult {
                        url: target.url(),
                        success: false,
                        status: None,
                        bytes: 0,
                        elapsed: Duration::ZERO,
                        error: Some(msg),
                    },
                    Some(e),
                );
            },
        };

        let url = if want_https_target { as_https(&self.cfg.test_urls.default_url) } else { self.cfg.test_urls.default_url.clone() };

        let start = Instant::now();
        let policy = FetchPolicy::from_config(&self.cfg);
        match client.get(&url).send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let headers: Vec<(String, String)> = resp
                    .headers()
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                    .collect();
                let body = resp.bytes().await.unwrap_or_default();
                let elapsed = start.elapsed();
                let eval = policy.evaluate(status, &headers, &body);
                debug!(%url, status, bytes = body.len(), ok = eval.is_ok(), "fetch via reqwest");
                (
                    CheckResult {
                        url,
                        success: eval.is_ok(),
                        status: Some(status),
                        bytes: body.len(),
                        elapsed,
                        error: eval.err(),
                    },
                    None,
                )
            },
            Err(e) => {
                let msg = e.to_string();
                (
                    CheckResult { url, success: false, status: None, bytes: 0, elapsed: start.elapsed(), error: Some(msg) },
                    Some(ProxyHawkError::Network(e)),
                )
            },
        }
    }

    async fn fetch_via_socks4(&self, target: &ProxyTarget, want_https_target: bool) -> (CheckResult, Option<ProxyHawkError>) {
        let url = if want_https_target { as_https(&self.cfg.test_urls.default_url) } else { self.cfg.test_urls.default_url.clone() };
        let Ok(parsed) = url::Url::parse(&url) else {
            return (
                CheckResult { url, success: false, status: None, bytes: 0, elapsed: Duration::ZERO, error: Some("invalid test URL".to_string()) },
                None,
            );
        };
        let dest_host = parsed.host_str().unwrap_or_default().to_string();
        let dest_port = parsed.port_or_known_default().unwrap_or(80);
        let path = if parsed.path().is_empty() { "/".to_string() } else { parsed.path().to_string() };

        let start = Instant::now();
        let timeout = Duration::from_secs(self.cfg.timeout_secs);
        let fetch: Result<Result<(u16, Vec<(String, String)>, Vec<u8>), ProxyHawkError>, _> = tokio::time::timeout(timeout, async {
            let socks = tokio_socks::tcp::Socks4Stream::connect(
                (target.host.as_str(), target.port),
                (dest_host.as_str(), dest_port),
            )
            .await
            .map_err(|e| ProxyHawkError::Transient(classify_dyn_error(&e).unwrap_or(TransientReason::ConnectionRefused)))?;

            if want_https_target {
                let connector = TlsConnector::from(self.tls_config.clone());
                let server_name =
                    ServerName::try_from(dest_host.clone()).map_err(|_| ProxyHawkError::Config("invalid SNI hostname".to_string()))?;
                let tls = connector
                    .connect(server_name, socks)
                    .await
                    .map_err(|e| ProxyHawkError::Transient(classify_io_error_kind(e.kind())))?;
                raw_http_get(tls, &dest_host, &path, &self.cfg.user_agent).await
            } else {
                raw_http_get(socks, &dest_host, &path, &self.cfg.user_agent).await
            }
        })
        .await;

        let elapsed = start.elapsed();
        match fetch {
            Ok(Ok((status, headers, body))) => {
                let policy = FetchPolicy::from_config(&self.cfg);
                let eval = policy.evaluate(status, &headers, &body);
                (
                    CheckResult { url, success: eval.is_ok(), status: Some(status), bytes: body.len(), elapsed, error: eval.err() },
                    None,
                )
            },
            Ok(Err(e)) => {
                let msg = e.to_string();
                (CheckResult { url, success: false, status: None, bytes: 0, elapsed, error: Some(msg) }, Some(e))
            },
            Err(_) => (
                CheckResult { url, success: false, status: None, bytes: 0, elapsed, error: Some("timeout".to_string()) },
                Some(ProxyHawkError::Transient(TransientReason::Timeout)),
            ),
        }
    }
}

/// Resolves the proxy's own peer IP for the Cloud Classifier (§4.G). An IP
/// literal resolves to itself; a hostname is resolved via DNS and the first
/// answer is taken, matching the one-shot "obtained once" contract of
/// `ProbeReport::peer_ip`.
async fn resolve_peer_ip(host: &str, port: u16) -> Option<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Some(ip);
    }
    tokio::net::lookup_host((host, port)).await.ok()?.next().map(|addr| addr.ip())
}

fn as_https(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("http://") {
        format!("https://{rest}")
    } else if url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

async fn raw_http_get<S>(
    mut stream: S,
    host: &str,
    path: &str,
    user_agent: &str,
) -> Result<(u16, Vec<(String, String)>, Vec<u8>), String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = format!(
        "GET {path} HTTP/1.1\r\nHost: {host}\r\nUser-Agent: {user_agent}\r\nAccept: */*\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.map_err(|e| e.to_string())?;

    let mut buf = Vec::with_capacity(4096);
    let mut tmp = [0u8; 4096];
    loop {
        let n = stream.read(&mut tmp).await.map_err(|e| e.to_string())?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
    }

    parse_http_response(&buf).ok_or_else(|| "failed to parse HTTP response".to_string())
}

fn parse_http_response(buf: &[u8]) -> Option<(u16, Vec<(String, String)>, Vec<u8>)> {
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut resp = httparse::Response::new(&mut headers);
    match resp.parse(buf).ok()? {
        httparse::Status::Complete(offset) => {
            let status = resp.code?;
            let parsed_headers = resp
                .headers
                .iter()
                .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).to_string()))
                .collect();
            Some((status, parsed_headers, buf[offset..].to_vec()))
        },
        httparse::Status::Partial => None,
    }
}

fn build_tls_client_config() -> rustls::ClientConfig {
    let mut roots = rustls::RootCertStore::empty();
    let loaded = rustls_native_certs::load_native_certs();
    for cert in loaded.certs {
        let _ = roots.add(cert);
    }
    rustls::ClientConfig::builder().with_root_certificates(roots).with_no_client_auth()
}
