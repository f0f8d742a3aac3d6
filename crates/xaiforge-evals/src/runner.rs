//! Eval runner - drive a JSONL dataset through a provider and score it

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use xaiforge_core::{Error, Result};
use xaiforge_gateway::{
    MockProvider, ModelMessage, ModelProvider, ModelRequest, ToolDefinition,
};

use crate::scorers::{exact_match, json_schema_match, regex_match, tool_call_match, EvalScore};

#[derive(Clone, Debug, Serialize)]
pub struct EvalCase {
    pub case_id: String,
    pub messages: Vec<ModelMessage>,
    pub expected: Value,
    pub rubric: String,
    pub tags: Vec<String>,
    pub difficulty: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct EvalResult {
    pub case: EvalCase,
    pub response_text: String,
    pub score: EvalScore,
    pub latency_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct EvalReport {
    pub dataset: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    pub results: Vec<EvalResult>,
    pub created_at: f64,
}

impl EvalReport {
    pub fn to_json(&self) -> Value {
        json!({
            "dataset": self.dataset,
            "total": self.total,
            "passed": self.passed,
            "failed": self.failed,
            "pass_rate": self.pass_rate,
            "created_at": self.created_at,
            "results": self.results.iter().map(|result| json!({
                "id": result.case.case_id,
                "passed": result.score.passed,
                "reason": result.score.reason,
                "latency_ms": result.latency_ms,
                "response": result.response_text,
            })).collect::<Vec<_>>(),
        })
    }

    pub fn to_markdown(&self) -> String {
        let mut lines = vec![
            format!("# Eval Report: {}", self.dataset),
            String::new(),
            format!("- Total: {}", self.total),
            format!("- Passed: {}", self.passed),
            format!("- Failed: {}", self.failed),
            format!("- Pass rate: {:.2}%", self.pass_rate * 100.0),
            String::new(),
            "| Case | Passed | Reason |".to_string(),
            "| --- | --- | --- |".to_string(),
        ];
        for result in &self.results {
            lines.push(format!(
                "| {} | {} | {} |",
                result.case.case_id, result.score.passed, result.score.reason
            ));
        }
        lines.join("\n")
    }
}

/// Load a JSONL dataset of `{id, messages, expected, rubric, tags,
/// difficulty}` cases. Empty lines are skipped.
pub fn load_dataset(path: &Path) -> Result<Vec<EvalCase>> {
    let raw = fs::read_to_string(path)
        .map_err(|_| Error::not_found(format!("dataset {}", path.display())))?;
    let mut cases = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let payload: Value = serde_json::from_str(line)?;
        let messages: Vec<ModelMessage> = serde_json::from_value(
            payload.get("messages").cloned().unwrap_or(Value::Null),
        )?;
        cases.push(EvalCase {
            case_id: payload
                .get("id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::bad_input("dataset case missing id"))?
                .to_string(),
            messages,
            expected: payload.get("expected").cloned().unwrap_or(Value::Null),
            rubric: payload
                .get("rubric")
                .and_then(|v| v.as_str())
                .unwrap_or("exact_match")
                .to_string(),
            tags: payload
                .get("tags")
                .and_then(|v| v.as_array())
                .map(|tags| {
                    tags.iter()
                        .filter_map(|t| t.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
            difficulty: payload
                .get("difficulty")
                .and_then(|v| v.as_str())
                .unwrap_or("medium")
                .to_string(),
        });
    }
    Ok(cases)
}

fn score_case(case: &EvalCase, response_text: &str) -> EvalScore {
    match case.rubric.as_str() {
        "exact_match" => exact_match(response_text, case.expected.as_str().unwrap_or_default()),
        "regex_match" => regex_match(response_text, case.expected.as_str().unwrap_or_default()),
        "json_schema_match" => json_schema_match(response_text, &case.expected),
        "tool_call_match" => tool_call_match(response_text, &case.expected),
        other => EvalScore {
            passed: false,
            reason: format!("unknown rubric {other}"),
        },
    }
}

fn build_request(case: &EvalCase) -> ModelRequest {
    if case.rubric == "tool_call_match" {
        let name = case
            .expected
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let mut metadata = Map::new();
        metadata.insert("tool_call_override".to_string(), case.expected.clone());
        return ModelRequest {
            messages: case.messages.clone(),
            tools: vec![ToolDefinition {
                name,
                description: String::new(),
                schema: json!({}),
            }],
            metadata,
            ..Default::default()
        };
    }
    let mut metadata = Map::new();
    match case.rubric.as_str() {
        "exact_match" | "regex_match" => {
            metadata.insert(
                "expected_text".to_string(),
                Value::String(case.expected.as_str().unwrap_or_default().to_string()),
            );
        }
        "json_schema_match" => {
            metadata.insert(
                "expected_text".to_string(),
                Value::String(case.expected.to_string()),
            );
        }
        _ => {}
    }
    ModelRequest {
        messages: case.messages.clone(),
        metadata,
        ..Default::default()
    }
}

/// Run every case through the provider (mock by default), score, and write
/// the JSON + markdown reports into `report_dir`.
pub async fn run_eval(
    dataset_path: &Path,
    report_dir: &Path,
    provider: Option<Arc<dyn ModelProvider>>,
) -> Result<EvalReport> {
    let cases = load_dataset(dataset_path)?;
    let provider = provider.unwrap_or_else(|| Arc::new(MockProvider::default()));
    let mut results = Vec::with_capacity(cases.len());
    for case in cases {
        let request = build_request(&case);
        let started = Instant::now();
        let response = provider
            .generate(request)
            .await
            .map_err(|e| Error::bad_input(format!("provider failed: {e}")))?;
        let latency_ms = started.elapsed().as_millis() as u64;
        let mut response_text = response.text.clone();
        if case.rubric == "tool_call_match" {
            if let Some(call) = response.tool_calls.first() {
                response_text = json!({
                    "name": call.name,
                    "arguments": call.arguments,
                })
                .to_string();
            }
        }
        let score = score_case(&case, &response_text);
        debug!(case = %case.case_id, passed = score.passed, "eval case scored");
        results.push(EvalResult {
            case,
            response_text,
            score,
            latency_ms,
        });
    }
    let passed = results.iter().filter(|result| result.score.passed).count();
    let dataset = dataset_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let report = EvalReport {
        dataset: dataset.clone(),
        total: results.len(),
        passed,
        failed: results.len() - passed,
        pass_rate: passed as f64 / results.len().max(1) as f64,
        results,
        created_at: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0),
    };
    fs::create_dir_all(report_dir)?;
    fs::write(
        report_dir.join(format!("{dataset}.json")),
        serde_json::to_string_pretty(&report.to_json())?,
    )?;
    fs::write(report_dir.join(format!("{dataset}.md")), report.to_markdown())?;
    Ok(report)
}

/// Gate: the pass rate must meet `min(threshold, baseline_pass_rate)`.
/// A missing baseline counts as 0.0.
pub fn gate_report(report: &EvalReport, baseline_path: &Path, threshold: f64) -> Result<()> {
    let baseline_rate = fs::read_to_string(baseline_path)
        .ok()
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        .and_then(|baseline| baseline.get("pass_rate").and_then(|v| v.as_f64()))
        .unwrap_or(0.0);
    let floor = threshold.min(baseline_rate);
    if report.pass_rate < floor {
        return Err(Error::gate_failed(format!(
            "Eval gate failed: {:.2}% < baseline {:.2}%",
            report.pass_rate * 100.0,
            baseline_rate * 100.0
        )));
    }
    Ok(())
}
