//! Summary aggregator (spec §3 "Summary"): a pure reduction over a completed
//! batch of `ProxyResult`s, with no I/O or knowledge of how the batch was run.

use crate::model::ProxyResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub working: usize,
    pub anonymous: usize,
    pub cloud: usize,
    pub internal_access: usize,
    pub metadata_access: usize,
    pub success_rate: f64,
    pub average_speed: Option<Duration>,
}

impl Summary {
    /// Reduces a finished batch into the headline counts of spec §3.
    /// `success_rate` is `working / total`, 0.0 on an empty batch.
    /// `average_speed` averages `speed` across only the working candidates
    /// that reported one, and is `None` if none did.
    pub fn from_results(results: &[ProxyResult]) -> Self {
        let total = results.len();
        let working = results.iter().filter(|r| r.working).count();
        let anonymous = results.iter().filter(|r| r.is_anonymous).count();
        let cloud = results.iter().filter(|r| r.cloud_provider.is_some()).count();
        let internal_access = results.iter().filter(|r| r.internal_access).count();
        let metadata_access = results.iter().filter(|r| r.metadata_access).count();

        let speeds: Vec<Duration> = results.iter().filter_map(|r| r.speed).collect();
        let average_speed = if speeds.is_empty() {
            None
        } else {
            Some(speeds.iter().sum::<Duration>() / speeds.len() as u32)
        };

        let success_rate = if total == 0 { 0.0 } else { working as f64 / total as f64 };

        Self { total, working, anonymous, cloud, internal_access, metadata_access, success_rate, average_speed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Scheme, Supports};

    fn working_result(anonymous: bool, cloud: bool, speed_ms: u64) -> ProxyResult {
        ProxyResult {
            target: crate::model::ProxyTarget {
                scheme: Scheme::Http,
                host: "198.51.100.1".into(),
                port: 8080,
                credentials: None,
            },
            working: true,
            proxy_type: Some(Scheme::Http),
            supports: Supports::default(),
            speed: Some(Duration::from_millis(speed_ms)),
            real_ip: Some("203.0.113.1".into()),
            proxy_ip: Some("198.51.100.1".into()),
            is_anonymous: anonymous,
            cloud_provider: if cloud { Some("AWS".into()) } else { None },
            internal_access: false,
            metadata_access: false,
            advanced: Default::default(),
            check_results: Vec::new(),
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn empty_batch_has_zero_rate_and_no_average() {
        let summary = Summary::from_results(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.success_rate, 0.0);
        assert!(summary.average_speed.is_none());
    }

    #[test]
    fn counts_and_averages_across_mixed_batch() {
        let results = vec![
            working_result(true, true, 100),
            working_result(false, false, 300),
            ProxyResult::failed_for_raw("bad", "normalization failed"),
        ];
        let summary = Summary::from_results(&results);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.working, 2);
        assert_eq!(summary.anonymous, 1);
        assert_eq!(summary.cloud, 1);
        assert_eq!(summary.average_speed, Some(Duration::from_millis(200)));
        assert!((summary.success_rate - (2.0 / 3.0)).abs() < 1e-9);
    }
}
