//! Result sinks (spec §6 "Result sink"): the core hands back `ProxyResult`s
//! without caring how they're rendered; this binary owns the only two
//! renderings it needs.

use anyhow::Result;
use proxyhawk_core::model::ProxyResult;
use proxyhawk_core::Summary;
use std::io::Write;

pub trait ResultSink {
    fn write_result(&mut self, result: &ProxyResult) -> Result<()>;
    fn write_summary(&mut self, summary: &Summary) -> Result<()>;
}

/// Human-readable one-line-per-result output, with a closing summary block.
pub struct TextSink<W: Write> {
    out: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> ResultSink for TextSink<W> {
    fn write_result(&mut self, result: &ProxyResult) -> Result<()> {
        if result.working {
            let speed = result.speed.map(|d| format!("{}ms", d.as_millis())).unwrap_or_else(|| "?".into());
            let kind = result.proxy_type.map(|s| s.to_string()).unwrap_or_else(|| "?".into());
            writeln!(
                self.out,
                "[OK]   {} type={kind} speed={speed} anonymous={} cloud={}",
                result.target,
                result.is_anonymous,
                result.cloud_provider.as_deref().unwrap_or("-"),
            )?;
        } else {
            writeln!(
                self.out,
                "[FAIL] {} error={}",
                result.target,
                result.error.as_deref().unwrap_or("unknown")
            )?;
        }
        Ok(())
    }

    fn write_summary(&mut self, summary: &Summary) -> Result<()> {
        writeln!(
            self.out,
            "\n{} total, {} working ({:.1}% success), {} anonymous, {} cloud, {} internal-access, {} metadata-access",
            summary.total,
            summary.working,
            summary.success_rate * 100.0,
            summary.anonymous,
            summary.cloud,
            summary.internal_access,
            summary.metadata_access,
        )?;
        if let Some(avg) = summary.average_speed {
            writeln!(self.out, "average speed: {}ms", avg.as_millis())?;
        }
        Ok(())
    }
}

/// Newline-delimited JSON: one `ProxyResult` object per line, with a final
/// summary object. Easy to `jq` or pipe into another tool.
pub struct JsonSink<W: Write> {
    out: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> ResultSink for JsonSink<W> {
    fn write_result(&mut self, result: &ProxyResult) -> Result<()> {
        serde_json::to_writer(&mut self.out, result)?;
        writeln!(self.out)?;
        Ok(())
    }

    fn write_summary(&mut self, summary: &Summary) -> Result<()> {
        serde_json::to_writer(&mut self.out, summary)?;
        writeln!(self.out)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxyhawk_core::model::{Scheme, Supports};

    fn sample() -> ProxyResult {
        ProxyResult {
            target: proxyhawk_core::ProxyTarget {
                scheme: Scheme::Http,
                host: "198.51.100.1".into(),
                port: 8080,
                credentials: None,
            },
            working: true,
            proxy_type: Some(Scheme::Http),
            supports: Supports::default(),
            speed: Some(std::time::Duration::from_millis(42)),
            real_ip: None,
            proxy_ip: None,
            is_anonymous: true,
            cloud_provider: None,
            internal_access: false,
            metadata_access: false,
            advanced: Default::default(),
            check_results: Vec::new(),
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn text_sink_marks_working_results_ok() {
        let mut buf = Vec::new();
        let mut sink = TextSink::new(&mut buf);
        sink.write_result(&sample()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("[OK]"));
    }

    #[test]
    fn json_sink_emits_one_object_per_line() {
        let mut buf = Vec::new();
        let mut sink = JsonSink::new(&mut buf);
        sink.write_result(&sample()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(serde_json::from_str::<serde_json::Value>(text.trim()).is_ok());
    }
}
