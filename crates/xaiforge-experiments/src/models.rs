//! Experiment configuration and result types

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use xaiforge_gateway::{ModelMessage, ModelRequest, ToolCall, ToolDefinition, UsageInfo};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentMode {
    Ab,
    Shadow,
    Canary,
    Fallback,
}

impl std::fmt::Display for ExperimentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExperimentMode::Ab => "ab",
            ExperimentMode::Shadow => "shadow",
            ExperimentMode::Canary => "canary",
            ExperimentMode::Fallback => "fallback",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExperimentRequestTemplate {
    pub messages: Vec<ModelMessage>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default = "ExperimentRequestTemplate::default_temperature")]
    pub temperature: f32,
    #[serde(default = "ExperimentRequestTemplate::default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "ExperimentRequestTemplate::default_seed")]
    pub seed: Option<u64>,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
}

impl ExperimentRequestTemplate {
    fn default_temperature() -> f32 {
        0.2
    }
    fn default_max_tokens() -> u32 {
        512
    }
    fn default_seed() -> Option<u64> {
        Some(42)
    }

    pub fn from_messages(messages: Vec<ModelMessage>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            tags: Vec::new(),
            metadata: Map::new(),
            temperature: Self::default_temperature(),
            max_tokens: Self::default_max_tokens(),
            seed: Self::default_seed(),
            stop: None,
        }
    }

    pub fn to_request(&self, request_id: Option<String>) -> ModelRequest {
        let mut metadata = self.metadata.clone();
        if !self.tags.is_empty() && !metadata.contains_key("tags") {
            metadata.insert(
                "tags".to_string(),
                Value::Array(self.tags.iter().cloned().map(Value::String).collect()),
            );
        }
        ModelRequest {
            messages: self.messages.clone(),
            tools: self.tools.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            seed: self.seed,
            stop: self.stop.clone(),
            metadata,
            request_id,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub experiment_id: String,
    pub created_at: String,
    pub mode: ExperimentMode,
    pub providers: Vec<String>,
    #[serde(default = "ExperimentConfig::default_traffic_split")]
    pub traffic_split: f64,
    #[serde(default = "ExperimentConfig::default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "ExperimentConfig::default_timeout_s")]
    pub timeout_s: f64,
    #[serde(default)]
    pub request_template: Option<ExperimentRequestTemplate>,
    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ExperimentConfig {
    fn default_traffic_split() -> f64 {
        0.5
    }
    fn default_max_concurrency() -> usize {
        4
    }
    fn default_timeout_s() -> f64 {
        30.0
    }

    pub fn create(
        experiment_id: impl Into<String>,
        mode: ExperimentMode,
        providers: Vec<String>,
        request_template: Option<ExperimentRequestTemplate>,
    ) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            mode,
            providers,
            traffic_split: Self::default_traffic_split(),
            max_concurrency: Self::default_max_concurrency(),
            timeout_s: Self::default_timeout_s(),
            request_template,
            thresholds: BTreeMap::new(),
            tags: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExperimentProviderResult {
    pub provider: String,
    pub model: String,
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub latency_ms: u64,
    pub usage: Option<UsageInfo>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExperimentProviderResult {
    pub fn failure(provider: &str, error: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            model: String::new(),
            text: String::new(),
            tool_calls: Vec::new(),
            latency_ms: 0,
            usage: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExperimentComparison {
    pub stability_score: f64,
    pub latency_delta_ms: i64,
    pub diff_summary: String,
    pub tool_call_diff: crate::compare::ToolCallDiff,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub experiment_id: String,
    pub mode: ExperimentMode,
    pub request_id: String,
    pub primary: ExperimentProviderResult,
    pub secondary: Option<ExperimentProviderResult>,
    pub all_results: Vec<ExperimentProviderResult>,
    pub comparison: Option<ExperimentComparison>,
    pub errors: Vec<String>,
    pub started_at: String,
    pub ended_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExperimentRunSummary {
    pub experiment_id: String,
    pub created_at: String,
    pub mode: ExperimentMode,
    pub providers: Vec<String>,
    pub request_id: String,
    pub status: String,
    pub stability_score: Option<f64>,
    pub latency_delta_ms: Option<i64>,
    pub error_rate: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExperimentManifest {
    pub experiment_id: String,
    pub created_at: String,
    pub report_path: String,
    pub config_path: String,
    pub summary: ExperimentRunSummary,
}
