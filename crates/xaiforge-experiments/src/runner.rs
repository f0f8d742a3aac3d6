//! Experiment runner - mode dispatch, bounded fan-out, artifacts and gating

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::debug;

use xaiforge_gateway::{GatewayConfig, ModelGateway};

use crate::compare::{compare_text, compare_tool_calls};
use crate::models::{
    ExperimentComparison, ExperimentConfig, ExperimentManifest, ExperimentMode,
    ExperimentProviderResult, ExperimentRequestTemplate, ExperimentResult, ExperimentRunSummary,
};

#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error("{0}")]
    Config(String),

    #[error("All fallback providers failed: {0}")]
    AllFailed(String),

    #[error("{message}")]
    Gate {
        message: String,
        summary: Box<ExperimentRunSummary>,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct ExperimentRunner {
    base_dir: PathBuf,
}

impl ExperimentRunner {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub async fn run(&self, config: &ExperimentConfig) -> Result<ExperimentResult, ExperimentError> {
        let template = config
            .request_template
            .as_ref()
            .ok_or_else(|| ExperimentError::Config("Experiment requires a request template".into()))?;
        let request_id = build_request_id(&config.experiment_id);
        let started_at = now();
        let (primary, secondary, results) = match config.mode {
            ExperimentMode::Ab | ExperimentMode::Shadow => {
                let providers = require_providers(&config.providers, 2)?;
                let results = self
                    .run_providers(config, template, &providers, &request_id)
                    .await;
                (results[0].clone(), Some(results[1].clone()), results)
            }
            ExperimentMode::Canary => {
                let providers = require_providers(&config.providers, 2)?;
                let mut rng = rand::rngs::StdRng::seed_from_u64(stable_seed(&config.experiment_id));
                let send_canary = rng.gen::<f64>() < config.traffic_split;
                debug!(send_canary, "canary split decision");
                if send_canary {
                    let results = self
                        .run_providers(config, template, &providers[..2], &request_id)
                        .await;
                    (results[0].clone(), Some(results[1].clone()), results)
                } else {
                    let results = self
                        .run_providers(config, template, &providers[..1], &request_id)
                        .await;
                    (results[0].clone(), None, results)
                }
            }
            ExperimentMode::Fallback => {
                let providers = require_providers(&config.providers, 1)?;
                let mut results: Vec<ExperimentProviderResult> = Vec::new();
                let mut winner: Option<ExperimentProviderResult> = None;
                for provider in &providers {
                    let result = self
                        .run_provider(config, template, provider, &request_id)
                        .await;
                    let ok = result.error.is_none();
                    results.push(result.clone());
                    if ok {
                        winner = Some(result);
                        break;
                    }
                }
                let Some(primary) = winner else {
                    let errors: Vec<String> = results
                        .iter()
                        .filter_map(|result| result.error.clone())
                        .collect();
                    return Err(ExperimentError::AllFailed(errors.join(", ")));
                };
                let secondary = results.get(1).cloned();
                (primary, secondary, results)
            }
        };
        let ended_at = now();
        let errors: Vec<String> = results
            .iter()
            .filter_map(|result| result.error.clone())
            .collect();
        let comparison = secondary
            .as_ref()
            .map(|secondary| build_comparison(&primary, secondary));
        Ok(ExperimentResult {
            experiment_id: config.experiment_id.clone(),
            mode: config.mode,
            request_id,
            primary,
            secondary,
            all_results: results,
            comparison,
            errors,
            started_at,
            ended_at,
        })
    }

    /// Run all providers concurrently, bounded by the configured semaphore.
    /// Results keep provider order.
    async fn run_providers(
        &self,
        config: &ExperimentConfig,
        template: &ExperimentRequestTemplate,
        providers: &[String],
        request_id: &str,
    ) -> Vec<ExperimentProviderResult> {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        let futures = providers.iter().map(|provider| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore open");
                self.run_provider(config, template, provider, request_id).await
            }
        });
        futures::future::join_all(futures).await
    }

    async fn run_provider(
        &self,
        config: &ExperimentConfig,
        template: &ExperimentRequestTemplate,
        provider: &str,
        request_id: &str,
    ) -> ExperimentProviderResult {
        // Names starting with "fail" inject a failure arm for fallback tests.
        if provider.starts_with("fail") {
            return ExperimentProviderResult::failure(provider, "Injected failure");
        }
        let gateway_config = GatewayConfig {
            provider: provider.to_string(),
            timeout_s: config.timeout_s,
            ..Default::default()
        };
        let gateway = ModelGateway::new(gateway_config);
        let request = template.to_request(Some(request_id.to_string()));
        match gateway.generate(request).await {
            Ok(result) => {
                let response = result.response;
                ExperimentProviderResult {
                    provider: provider.to_string(),
                    model: response.model,
                    text: response.text,
                    tool_calls: response.tool_calls,
                    latency_ms: response.latency_ms,
                    usage: Some(response.usage),
                    error: None,
                }
            }
            Err(error) => ExperimentProviderResult::failure(provider, error.to_string()),
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

fn build_request_id(experiment_id: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("exp_{experiment_id}_{}", &suffix[..8])
}

/// Deterministic per-experiment seed for the canary coin flip.
fn stable_seed(value: &str) -> u64 {
    value.chars().map(|c| c as u64).sum::<u64>() % 10_000
}

fn require_providers(providers: &[String], count: usize) -> Result<Vec<String>, ExperimentError> {
    if providers.len() == 1 && count == 2 {
        return Ok(vec![providers[0].clone(), providers[0].clone()]);
    }
    if providers.len() < count {
        return Err(ExperimentError::Config(format!(
            "Expected at least {count} providers"
        )));
    }
    Ok(providers.to_vec())
}

fn build_comparison(
    primary: &ExperimentProviderResult,
    secondary: &ExperimentProviderResult,
) -> ExperimentComparison {
    let text_diff = compare_text(&primary.text, &secondary.text);
    let tool_diff = compare_tool_calls(&primary.tool_calls, &secondary.tool_calls);
    ExperimentComparison {
        stability_score: text_diff.score,
        latency_delta_ms: secondary.latency_ms as i64 - primary.latency_ms as i64,
        diff_summary: text_diff.summary,
        tool_call_diff: tool_diff,
    }
}

pub fn summarize_result(config: &ExperimentConfig, result: &ExperimentResult) -> ExperimentRunSummary {
    let error_rate = result.errors.len() as f64 / result.all_results.len().max(1) as f64;
    let status = if result.errors.is_empty() {
        "ok"
    } else if result.errors.len() == result.all_results.len() {
        "error"
    } else {
        "partial"
    };
    ExperimentRunSummary {
        experiment_id: config.experiment_id.clone(),
        created_at: config.created_at.clone(),
        mode: config.mode,
        providers: config.providers.clone(),
        request_id: result.request_id.clone(),
        status: status.to_string(),
        stability_score: result.comparison.as_ref().map(|c| c.stability_score),
        latency_delta_ms: result.comparison.as_ref().map(|c| c.latency_delta_ms),
        error_rate,
    }
}

/// Write config, JSON + markdown reports and the manifest. Returns the
/// manifest.
pub fn save_experiment_artifacts(
    config: &ExperimentConfig,
    result: &ExperimentResult,
    base_dir: &Path,
    reports_root: &Path,
) -> Result<ExperimentManifest, ExperimentError> {
    let exp_dir = base_dir.join("experiments");
    fs::create_dir_all(&exp_dir)?;
    let reports_dir = reports_root.join("experiments");
    fs::create_dir_all(&reports_dir)?;
    let config_path = exp_dir.join(format!("{}.config.json", config.experiment_id));
    fs::write(&config_path, serde_json::to_string_pretty(config)?)?;
    let report_path = reports_dir.join(format!("{}.json", config.experiment_id));
    fs::write(&report_path, serde_json::to_string_pretty(result)?)?;
    let md_path = reports_dir.join(format!("{}.md", config.experiment_id));
    fs::write(&md_path, render_markdown_report(config, result))?;
    let summary = summarize_result(config, result);
    let manifest = ExperimentManifest {
        experiment_id: config.experiment_id.clone(),
        created_at: config.created_at.clone(),
        report_path: report_path.display().to_string(),
        config_path: config_path.display().to_string(),
        summary,
    };
    let manifest_path = exp_dir.join(format!("{}.manifest.json", config.experiment_id));
    fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;
    Ok(manifest)
}

pub fn list_experiments(base_dir: &Path) -> Vec<ExperimentManifest> {
    let exp_dir = base_dir.join("experiments");
    let Ok(entries) = fs::read_dir(&exp_dir) else {
        return Vec::new();
    };
    let mut manifests: Vec<ExperimentManifest> = entries
        .flatten()
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .ends_with(".manifest.json")
        })
        .filter_map(|entry| {
            let raw = fs::read_to_string(entry.path()).ok()?;
            serde_json::from_str(&raw).ok()
        })
        .collect();
    manifests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    manifests
}

pub fn load_experiment_manifest(
    experiment_id: &str,
    base_dir: &Path,
) -> Result<ExperimentManifest, ExperimentError> {
    let manifest_path = base_dir
        .join("experiments")
        .join(format!("{experiment_id}.manifest.json"));
    let raw = fs::read_to_string(&manifest_path)
        .map_err(|_| ExperimentError::NotFound(format!("experiment {experiment_id}")))?;
    Ok(serde_json::from_str(&raw)?)
}

#[derive(Clone, Copy, Debug)]
pub struct GateThresholds {
    pub stability_min: f64,
    pub max_latency_delta_ms: i64,
    pub max_error_rate: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            stability_min: 0.7,
            max_latency_delta_ms: 500,
            max_error_rate: 0.1,
        }
    }
}

/// Reject a saved experiment summary when any threshold is violated.
pub fn gate_experiment(
    experiment_id: &str,
    base_dir: &Path,
    thresholds: GateThresholds,
) -> Result<ExperimentRunSummary, ExperimentError> {
    let manifest = load_experiment_manifest(experiment_id, base_dir)?;
    let summary = manifest.summary;
    if let Some(stability) = summary.stability_score {
        if stability < thresholds.stability_min {
            return Err(ExperimentError::Gate {
                message: format!(
                    "Experiment {experiment_id} stability score {stability:.2} below {:.2}",
                    thresholds.stability_min
                ),
                summary: Box::new(summary),
            });
        }
    }
    if let Some(delta) = summary.latency_delta_ms {
        if delta > thresholds.max_latency_delta_ms {
            return Err(ExperimentError::Gate {
                message: format!(
                    "Experiment {experiment_id} latency delta {delta}ms above {}ms",
                    thresholds.max_latency_delta_ms
                ),
                summary: Box::new(summary),
            });
        }
    }
    if summary.error_rate > thresholds.max_error_rate {
        return Err(ExperimentError::Gate {
            message: format!(
                "Experiment {experiment_id} error rate {:.2} above {:.2}",
                summary.error_rate, thresholds.max_error_rate
            ),
            summary: Box::new(summary),
        });
    }
    Ok(summary)
}

fn render_markdown_report(config: &ExperimentConfig, result: &ExperimentResult) -> String {
    let mut lines = vec![
        format!("# Experiment {}", config.experiment_id),
        String::new(),
        format!("- Mode: {}", config.mode),
        format!("- Providers: {}", config.providers.join(", ")),
        format!("- Request ID: {}", result.request_id),
        format!("- Started: {}", result.started_at),
        format!("- Ended: {}", result.ended_at),
        String::new(),
        "## Results".to_string(),
    ];
    for item in &result.all_results {
        lines.extend([
            format!("### {}", item.provider),
            format!("- Model: {}", item.model),
            format!("- Latency: {} ms", item.latency_ms),
            format!("- Error: {}", item.error.as_deref().unwrap_or("none")),
            String::new(),
            "```".to_string(),
            item.text.clone(),
            "```".to_string(),
            String::new(),
        ]);
    }
    if let Some(comparison) = &result.comparison {
        lines.extend([
            "## Comparison".to_string(),
            format!("- Stability score: {:.2}", comparison.stability_score),
            format!("- Latency delta: {} ms", comparison.latency_delta_ms),
            format!("- Diff summary: {}", comparison.diff_summary),
            String::new(),
            "```json".to_string(),
            serde_json::to_string_pretty(&comparison.tool_call_diff).unwrap_or_default(),
            "```".to_string(),
        ]);
    }
    lines.join("\n")
}
