//! Perf gate - reject regressions against a baseline summary

use std::fs;
use std::path::Path;

use serde_json::{json, Value};

use xaiforge_core::{Error, Result};

use crate::metrics::{summarize_metrics, PerfMetrics};

fn regression(current: f64, baseline: f64, inverse: bool) -> f64 {
    if baseline == 0.0 {
        return 0.0;
    }
    let delta = if inverse {
        (baseline - current) / baseline
    } else {
        (current - baseline) / baseline
    };
    delta.max(0.0)
}

/// Reject when p90 latency regresses beyond `max_latency_regression` or
/// throughput drops beyond `min_throughput_regression`, both relative to the
/// baseline summary JSON (`{p90_ms, throughput_rps, …}`).
pub fn gate_performance(
    metrics: &PerfMetrics,
    baseline_path: &Path,
    max_latency_regression: f64,
    min_throughput_regression: f64,
) -> Result<Value> {
    let raw = fs::read_to_string(baseline_path)
        .map_err(|_| Error::not_found(format!("baseline {}", baseline_path.display())))?;
    let baseline: Value = serde_json::from_str(&raw)?;
    let summary = summarize_metrics(metrics);
    let baseline_p90 = baseline.get("p90_ms").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let baseline_rps = baseline
        .get("throughput_rps")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    let mut regressions = Vec::new();
    if regression(summary.p90_ms as f64, baseline_p90, false) > max_latency_regression {
        regressions.push("p90 latency regression");
    }
    if regression(summary.throughput_rps, baseline_rps, true) > min_throughput_regression {
        regressions.push("throughput regression");
    }
    if !regressions.is_empty() {
        return Err(Error::gate_failed(format!(
            "Performance regression detected: {}",
            regressions.join(", ")
        )));
    }
    Ok(json!({"summary": summary, "baseline": baseline}))
}
