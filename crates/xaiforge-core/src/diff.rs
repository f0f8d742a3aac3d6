//! Side-by-side comparison of two traces

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::{duration_seconds, TraceReader};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct MetricPair {
    pub a: f64,
    pub b: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceDiff {
    pub trace_a: String,
    pub trace_b: String,
    pub metrics: BTreeMap<String, MetricPair>,
}

impl TraceDiff {
    pub fn to_markdown(&self) -> String {
        let mut lines = vec![
            format!("# Trace Diff: {} vs {}", self.trace_a, self.trace_b),
            String::new(),
            "| Metric | A | B |".to_string(),
            "| --- | --- | --- |".to_string(),
        ];
        for (key, pair) in &self.metrics {
            lines.push(format!("| {} | {} | {} |", key, pair.a, pair.b));
        }
        lines.join("\n")
    }
}

#[derive(Default)]
struct TraceStats {
    event_count: f64,
    tool_calls: f64,
    errors: f64,
    usage_tokens: f64,
    duration_s: f64,
}

fn collect_stats(root: &Path, trace_id: &str) -> Result<TraceStats> {
    let reader = TraceReader::new(root, trace_id);
    let mut stats = TraceStats::default();
    for value in reader.read_values()? {
        stats.event_count += 1.0;
        match value.get("type").and_then(|t| t.as_str()) {
            Some("tool_call") => stats.tool_calls += 1.0,
            Some("tool_error") => stats.errors += 1.0,
            Some("message") => {
                let content = value.get("content").and_then(|c| c.as_str()).unwrap_or("");
                // Rough token estimate: 4 chars per token.
                stats.usage_tokens += (content.len() / 4) as f64;
            }
            _ => {}
        }
    }
    let manifest = reader.load_manifest()?;
    stats.duration_s = duration_seconds(&manifest.started_at, &manifest.ended_at);
    Ok(stats)
}

/// Tally event, tool-call, error and approximate token counts plus durations
/// for both traces.
pub fn diff_traces(root: &Path, trace_a: &str, trace_b: &str) -> Result<TraceDiff> {
    let stats_a = collect_stats(root, trace_a)?;
    let stats_b = collect_stats(root, trace_b)?;
    let mut metrics = BTreeMap::new();
    let mut put = |key: &str, a: f64, b: f64| {
        metrics.insert(key.to_string(), MetricPair { a, b });
    };
    put("event_count", stats_a.event_count, stats_b.event_count);
    put("tool_calls", stats_a.tool_calls, stats_b.tool_calls);
    put("errors", stats_a.errors, stats_b.errors);
    put("usage_tokens", stats_a.usage_tokens, stats_b.usage_tokens);
    put("duration_s", stats_a.duration_s, stats_b.duration_s);
    Ok(TraceDiff {
        trace_a: trace_a.to_string(),
        trace_b: trace_b.to_string(),
        metrics,
    })
}
