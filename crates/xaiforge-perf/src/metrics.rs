//! Latency samples and nearest-rank percentile summaries

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PerfMetrics {
    pub latencies_ms: Vec<u64>,
    pub errors: u64,
    pub total: u64,
    #[serde(default)]
    pub ttft_ms: Vec<u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PerfSummary {
    pub p50_ms: u64,
    pub p90_ms: u64,
    pub p95_ms: u64,
    pub avg_ms: u64,
    pub throughput_rps: f64,
    pub error_rate: f64,
    pub ttft_p50_ms: u64,
}

/// Nearest-rank percentile with a floored index: `values[⌊(n−1)·p⌋]`.
fn percentile(sorted: &[u64], pct: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let index = ((sorted.len() - 1) as f64 * pct) as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// Throughput is total requests over the summed latency in seconds.
fn throughput(metrics: &PerfMetrics) -> f64 {
    let total_time_s = metrics.latencies_ms.iter().sum::<u64>() as f64 / 1000.0;
    if total_time_s == 0.0 {
        return 0.0;
    }
    (metrics.total as f64 / total_time_s * 1000.0).round() / 1000.0
}

pub fn summarize_metrics(metrics: &PerfMetrics) -> PerfSummary {
    let mut latencies = metrics.latencies_ms.clone();
    latencies.sort_unstable();
    let mut ttft = metrics.ttft_ms.clone();
    ttft.sort_unstable();
    let avg_ms = if latencies.is_empty() {
        0
    } else {
        latencies.iter().sum::<u64>() / latencies.len() as u64
    };
    PerfSummary {
        p50_ms: percentile(&latencies, 0.5),
        p90_ms: percentile(&latencies, 0.9),
        p95_ms: percentile(&latencies, 0.95),
        avg_ms,
        throughput_rps: throughput(metrics),
        error_rate: if metrics.total == 0 {
            0.0
        } else {
            metrics.errors as f64 / metrics.total as f64
        },
        ttft_p50_ms: percentile(&ttft, 0.5),
    }
}

pub fn combine_metrics(metrics_list: &[PerfMetrics]) -> PerfMetrics {
    let mut combined = PerfMetrics::default();
    for metrics in metrics_list {
        combined.latencies_ms.extend(&metrics.latencies_ms);
        combined.errors += metrics.errors;
        combined.total += metrics.total;
        combined.ttft_ms.extend(&metrics.ttft_ms);
    }
    combined
}
