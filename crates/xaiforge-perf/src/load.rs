//! Load runner - ramped workers firing at a target request rate

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::debug;

use xaiforge_core::Result;
use xaiforge_gateway::{GatewayConfig, ModelGateway, ModelMessage, ModelRequest};

use crate::metrics::{summarize_metrics, PerfMetrics, PerfSummary};
use crate::runner::{now, request_id};

#[derive(Clone, Debug)]
pub struct LoadOptions {
    pub duration_s: u64,
    pub concurrency: usize,
    pub ramp_up_s: u64,
    pub request_rate: f64,
    pub provider: String,
    pub timeout_s: f64,
    pub reports_root: PathBuf,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            duration_s: 10,
            concurrency: 10,
            ramp_up_s: 0,
            request_rate: 5.0,
            provider: "mock".to_string(),
            timeout_s: 30.0,
            reports_root: PathBuf::from("reports"),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct LoadResult {
    pub run_id: String,
    pub started_at: String,
    pub ended_at: String,
    pub duration_s: u64,
    pub concurrency: u64,
    pub request_rate: f64,
    pub metrics: PerfMetrics,
    pub summary: PerfSummary,
}

async fn run_workers(options: &LoadOptions) -> PerfMetrics {
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let latencies = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(0u64));
    let stop_at = Instant::now() + Duration::from_secs(options.duration_s);
    let pause = Duration::from_secs_f64(1.0 / options.request_rate.max(0.1));
    let ramp_step = options.ramp_up_s as f64 / options.concurrency.max(1) as f64;

    let workers = (0..options.concurrency).map(|worker_id| {
        let semaphore = semaphore.clone();
        let latencies = latencies.clone();
        let errors = errors.clone();
        let provider = options.provider.clone();
        let timeout_s = options.timeout_s;
        async move {
            tokio::time::sleep(Duration::from_secs_f64(ramp_step * worker_id as f64)).await;
            while Instant::now() < stop_at {
                {
                    let _permit = semaphore.acquire().await.expect("semaphore open");
                    let config = GatewayConfig {
                        provider: provider.clone(),
                        timeout_s,
                        ..Default::default()
                    };
                    let gateway = ModelGateway::new(config);
                    let request = ModelRequest {
                        messages: vec![ModelMessage::user(format!("load ping {worker_id}"))],
                        request_id: Some(request_id("load")),
                        ..Default::default()
                    };
                    let started = Instant::now();
                    match gateway.generate(request).await {
                        Ok(_) => latencies
                            .lock()
                            .expect("latency lock")
                            .push(started.elapsed().as_millis() as u64),
                        Err(e) => {
                            debug!(worker_id, "load request failed: {e}");
                            *errors.lock().expect("error lock") += 1;
                        }
                    }
                }
                tokio::time::sleep(pause).await;
            }
        }
    });
    futures::future::join_all(workers).await;
    let latencies = latencies.lock().expect("latency lock").clone();
    let errors = *errors.lock().expect("error lock");
    let total = latencies.len() as u64 + errors;
    PerfMetrics {
        latencies_ms: latencies,
        errors,
        total,
        ttft_ms: Vec::new(),
    }
}

/// Run the load profile and write `reports/perf/<run_id>.{json,md}`.
pub async fn run_load(options: &LoadOptions) -> Result<LoadResult> {
    let run_id = format!("load_{}", Utc::now().format("%Y%m%d%H%M%S%6f"));
    let started_at = now();
    let metrics = run_workers(options).await;
    let summary = summarize_metrics(&metrics);
    let result = LoadResult {
        run_id,
        started_at,
        ended_at: now(),
        duration_s: options.duration_s,
        concurrency: options.concurrency as u64,
        request_rate: options.request_rate,
        metrics,
        summary,
    };
    write_load_reports(&result, &options.reports_root)?;
    Ok(result)
}

fn write_load_reports(result: &LoadResult, reports_root: &Path) -> Result<()> {
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

fn render_markdown(result: &LoadResult) -> String {
    let summary = &result.summary;
    [
        format!("# Perf Load {}", result.run_id),
        String::new(),
        format!("- Duration: {} s", result.duration_s),
        format!("- Concurrency: {}", result.concurrency),
        format!("- Request rate: {} rps", result.request_rate),
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
