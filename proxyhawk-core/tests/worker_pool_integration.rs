//! End-to-end exercise of the Worker Pool against a local mock proxy: a bare
//! TCP listener that answers every request with a canned identity body,
//! standing in for both the forward proxy and the identity URL.

use proxyhawk_core::config::ProxyHawkConfig;
use proxyhawk_core::model::Candidate;
use proxyhawk_core::WorkerPool;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Accepts connections forever, reading and discarding one request per
/// connection, then replying with a 200 JSON identity body. Good enough to
/// exercise the Protocol Prober's success path without a real proxy.
async fn spawn_mock_proxy() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock proxy");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { break };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let body = br#"{"ip":"203.0.113.77"}"#;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.write_all(body).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    port
}

fn test_config(identity_url: String) -> ProxyHawkConfig {
    let mut cfg = ProxyHawkConfig::default();
    cfg.allow_private = true;
    cfg.concurrency = 2;
    cfg.timeout_secs = 5;
    cfg.auto_fallback = false;
    cfg.enable_cloud_checks = false;
    cfg.test_urls.default_url = identity_url;
    cfg
}

#[tokio::test]
async fn worker_pool_validates_a_candidate_through_a_mock_proxy() {
    let proxy_port = spawn_mock_proxy().await;
    let identity_url = format!("http://127.0.0.1:{proxy_port}/ip");

    let cfg = Arc::new(test_config(identity_url));
    let pool = WorkerPool::new(cfg);

    let candidate = Candidate::new(format!("http://127.0.0.1:{proxy_port}"));
    let results = pool.run(vec![candidate]).await;

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(result.working, "expected proxy to validate as working: {:?}", result.error);
    assert!(result.speed.is_some());
}

#[tokio::test]
async fn worker_pool_reports_failure_for_unreachable_proxy() {
    let mut cfg = test_config("https://api.ipify.org?format=json".to_string());
    cfg.retry.enabled = false;
    let pool = WorkerPool::new(Arc::new(cfg));

    // Port 1 is reserved and nothing should be listening; the connection must
    // fail fast rather than hang for the full timeout.
    let candidate = Candidate::new("http://127.0.0.1:1");
    let results = pool.run(vec![candidate]).await;

    assert_eq!(results.len(), 1);
    assert!(!results[0].working);
}

#[tokio::test]
async fn worker_pool_emits_one_result_per_candidate_including_invalid_ones() {
    let cfg = Arc::new(ProxyHawkConfig::default());
    let pool = WorkerPool::new(cfg);

    let candidates = vec![
        Candidate::new(""),
        Candidate::new("ftp://bad-scheme.example:21"),
        Candidate::new("10.0.0.5:8080"),
    ];
    let results = pool.run(candidates).await;

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| !r.working));
}
