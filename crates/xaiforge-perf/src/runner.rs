//! Bench runner - a fixed task suite through the gateway, bounded fan-out

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::debug;

use xaiforge_core::Result;
use xaiforge_gateway::{GatewayConfig, ModelGateway, ModelMessage, ModelRequest};

use crate::metrics::{summarize_metrics, PerfMetrics, PerfSummary};

#[derive(Clone, Debug)]
pub struct BenchOptions {
    pub suite: String,
    pub provider: String,
    pub max_concurrency: usize,
    pub timeout_s: f64,
    pub reports_root: PathBuf,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self {
            suite: "quick".to_string(),
            provider: "mock".to_string(),
            max_concurrency: 4,
            timeout_s: 30.0,
            reports_root: PathBuf::from("reports"),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BenchResult {
    pub run_id: String,
    pub started_at: String,
    pub ended_at: String,
    pub suite: String,
    pub metrics: PerfMetrics,
    pub summary: PerfSummary,
}

pub fn bench_tasks(suite: &str) -> Vec<&'static str> {
    if suite == "quick" {
        return vec![
            "Summarize the release notes",
            "Compute 17*23",
            "List three safety guidelines",
            "Explain fallback routing",
        ];
    }
    vec![
        "Draft a short uptime update",
        "Compute 128/7",
        "Summarize the policy",
        "List two observability signals",
        "Explain canary traffic",
        "Compute 4^6",
    ]
}

pub(crate) fn request_id(prefix: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &suffix[..10])
}

pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

async fn run_tasks(
    tasks: &[&str],
    provider: &str,
    max_concurrency: usize,
    timeout_s: f64,
) -> PerfMetrics {
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let latencies = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(0u64));
    let futures = tasks.iter().map(|task| {
        let semaphore = semaphore.clone();
        let latencies = latencies.clone();
        let errors = errors.clone();
        let provider = provider.to_string();
        async move {
            let _permit = semaphore.acquire().await.expect("semaphore open");
            let config = GatewayConfig {
                provider,
                timeout_s,
                ..Default::default()
            };
            let gateway = ModelGateway::new(config);
            let request = ModelRequest {
                messages: vec![ModelMessage::user(*task)],
                request_id: Some(request_id("perf")),
                ..Default::default()
            };
            let started = Instant::now();
            match gateway.generate(request).await {
                Ok(_) => latencies
                    .lock()
                    .expect("latency lock")
                    .push(started.elapsed().as_millis() as u64),
                Err(e) => {
                    debug!("bench task failed: {e}");
                    *errors.lock().expect("error lock") += 1;
                }
            }
        }
    });
    futures::future::join_all(futures).await;
    let latencies = latencies.lock().expect("latency lock").clone();
    let errors = *errors.lock().expect("error lock");
    PerfMetrics {
        latencies_ms: latencies,
        errors,
        total: tasks.len() as u64,
        ttft_ms: Vec::new(),
    }
}

/// Run the suite and write `reports/perf/<run_id>.{json,md}`.
pub async fn run_bench(options: &BenchOptions) -> Result<BenchResult> {
    let run_id = format!("bench_{}", Utc::now().format("%Y%m%d%H%M%S%6f"));
    let started_at = now();
    let tasks = bench_tasks(&options.suite);
    let metrics = run_tasks(
        &tasks,
        &options.provider,
        options.max_concurrency,
        options.timeout_s,
    )
    .await;
    let summary = summarize_metrics(&metrics);
    let result = BenchResult {
        run_id,
        started_at,
        ended_at: now(),
        suite: options.suite.clone(),
        metrics,
        summary,
    };
    write_bench_reports(&result, &options.reports_root)?;
    Ok(result)
}

fn write_bench_reports(result: &BenchResult, reports_root: &Path) -> Result<()> {
    let reports_dir = reports_root.join("perf");
    fs::create_dir_all(&reports_dir)?;
    fs::write(
        reports_dir.join(format!("{}.json", result.run_id)),
        serde_json::to_string_pretty(result)?,
    )?;
    fs::write(
        reports_dir.join(format!("{}.md", result.run_id)),
        render_markdown(result),
    )?;
    Ok(())
}

fn render_markdown(result: &BenchResult) -> String {
    let summary = &result.summary;
    [
        format!("# Perf Bench {}", result.run_id),
        String::new(),
        format!("- Suite: {}", result.suite),
        format!("- Started: {}", result.started_at),
        format!("- Ended: {}", result.ended_at),
        String::new(),
        "## Summary".to_string(),
        format!("- p50 latency: {} ms", summary.p50_ms),
        format!("- p90 latency: {} ms", summary.p90_ms),
        format!("- p95 latency: {} ms", summary.p95_ms),
        format!("- Avg latency: {} ms", summary.avg_ms),
        format!("- Throughput: {} rps", summary.throughput_rps),
        format!("- Error rate: {:.2}%", summary.error_rate * 100.0),
    ]
    .join("\n")
}
