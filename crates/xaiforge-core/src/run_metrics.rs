//! Per-run metrics, written to `<base_dir>/metrics/<trace_id>.json`

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde_json::json;

use crate::error::Result;
use crate::metrics::{MetricSnapshot, MetricsRegistry};

pub struct RunMetrics {
    trace_id: String,
    registry: MetricsRegistry,
    started: Instant,
}

impl RunMetrics {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            registry: MetricsRegistry::new(),
            started: Instant::now(),
        }
    }

    pub fn record_event(&self, event_type: &str) {
        self.registry.inc_counter("events.total", 1);
        self.registry.inc_counter(&format!("events.{event_type}"), 1);
    }

    pub fn record_tool(&self, tool_name: &str, outcome: &str) {
        self.registry.inc_counter("tools.total", 1);
        self.registry.inc_counter(&format!("tools.{tool_name}"), 1);
        self.registry
            .inc_counter(&format!("tools.outcome.{outcome}"), 1);
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        self.registry.snapshot()
    }

    pub fn write(&self, base_dir: &Path) -> Result<PathBuf> {
        self.registry
            .set_gauge("run.duration_s", self.started.elapsed().as_secs_f64());
        let metrics_dir = base_dir.join("metrics");
        fs::create_dir_all(&metrics_dir)?;
        let path = metrics_dir.join(format!("{}.json", self.trace_id));
        let payload = json!({
            "trace_id": self.trace_id,
            "metrics": self.registry.snapshot(),
        });
        fs::write(&path, serde_json::to_string_pretty(&payload)?)?;
        Ok(path)
    }
}
