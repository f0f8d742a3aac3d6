//! Metrics collector plugin - per-run event and tool counters
//!
//! Accumulates per-type event counts, per-tool call counts and error counts
//! and writes `traces/<trace_id>.metrics.json` when the run ends.

use std::collections::BTreeMap;
use std::fs;

use serde_json::json;

use xaiforge_core::Event;

use crate::plugins::{Plugin, PluginContext, PluginError};

#[derive(Default)]
pub struct MetricsCollector {
    event_counts: BTreeMap<String, u64>,
    tool_calls: BTreeMap<String, u64>,
    errors: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Plugin for MetricsCollector {
    fn name(&self) -> &str {
        "metrics_collector"
    }

    fn on_event(&mut self, _ctx: &PluginContext, event: Event) -> Result<Event, PluginError> {
        *self
            .event_counts
            .entry(event.event_type().to_string())
            .or_insert(0) += 1;
        if let Event::ToolCall { tool_name, .. } = &event {
            *self.tool_calls.entry(tool_name.clone()).or_insert(0) += 1;
        }
        if matches!(event, Event::ToolError { .. }) {
            self.errors += 1;
        }
        Ok(event)
    }

    fn on_run_end(&mut self, ctx: &PluginContext, event: Event) -> Result<Event, PluginError> {
        let Event::RunEnd {
            status, final_hash, ..
        } = &event
        else {
            return Ok(event);
        };
        let payload = json!({
            "trace_id": ctx.trace_id,
            "task": ctx.task,
            "provider": ctx.provider,
            "event_counts": self.event_counts,
            "tool_calls": self.tool_calls,
            "errors": self.errors,
            "status": status,
            "final_hash": final_hash,
        });
        let metrics_dir = ctx.base_dir.join("traces");
        fs::create_dir_all(&metrics_dir)
            .map_err(|e| PluginError::new("metrics_collector", e.to_string()))?;
        let path = metrics_dir.join(format!("{}.metrics.json", ctx.trace_id));
        fs::write(
            path,
            serde_json::to_string_pretty(&payload)
                .map_err(|e| PluginError::new("metrics_collector", e.to_string()))?,
        )
        .map_err(|e| PluginError::new("metrics_collector", e.to_string()))?;
        Ok(event)
    }
}
