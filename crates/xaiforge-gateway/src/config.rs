//! Gateway configuration: JSON file plus environment overrides
//!
//! Resolution is per field: a value from the config file wins, then the
//! matching `XAIFORGE_GATEWAY_*` variable, then the built-in default.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::batching::BatchConfig;
use crate::reliability::RetryPolicy;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "GatewayConfig::default_provider")]
    pub provider: String,
    #[serde(default = "GatewayConfig::default_model")]
    pub model: String,
    #[serde(default = "GatewayConfig::default_timeout_s")]
    pub timeout_s: f64,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub circuit_breaker: bool,
    #[serde(default = "GatewayConfig::default_circuit_failures")]
    pub circuit_failures: u32,
    #[serde(default = "GatewayConfig::default_circuit_reset_s")]
    pub circuit_reset_s: f64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider: Self::default_provider(),
            model: Self::default_model(),
            timeout_s: Self::default_timeout_s(),
            retry: RetryPolicy::default(),
            batch: BatchConfig::default(),
            circuit_breaker: false,
            circuit_failures: Self::default_circuit_failures(),
            circuit_reset_s: Self::default_circuit_reset_s(),
        }
    }
}

impl GatewayConfig {
    fn default_provider() -> String {
        "mock".to_string()
    }
    fn default_model() -> String {
        "mock-001".to_string()
    }
    fn default_timeout_s() -> f64 {
        10.0
    }
    fn default_circuit_failures() -> u32 {
        3
    }
    fn default_circuit_reset_s() -> f64 {
        5.0
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn default_config_path() -> PathBuf {
    if let Some(path) = env_var("XAIFORGE_GATEWAY_CONFIG") {
        return PathBuf::from(path);
    }
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".xaiforge")
        .join("gateway.json")
}

/// Load gateway configuration. A missing or malformed file contributes
/// nothing; each field then falls back to its env variable and default.
pub fn load_gateway_config(path: Option<&Path>) -> GatewayConfig {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path);
    let file: Value = std::fs::read_to_string(&config_path)
        .ok()
        .and_then(|raw| match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %config_path.display(), "ignoring malformed gateway config: {e}");
                None
            }
        })
        .unwrap_or(Value::Null);

    let mut config = GatewayConfig::default();
    config.provider = file
        .get("provider")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or_else(|| env_var("XAIFORGE_GATEWAY_PROVIDER"))
        .unwrap_or(config.provider);
    config.model = file
        .get("model")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or_else(|| env_var("XAIFORGE_GATEWAY_MODEL"))
        .unwrap_or(config.model);
    config.timeout_s = file
        .get("timeout_s")
        .and_then(|v| v.as_f64())
        .or_else(|| env_var("XAIFORGE_GATEWAY_TIMEOUT").and_then(|raw| raw.parse().ok()))
        .unwrap_or(config.timeout_s);
    if let Some(retry) = file.get("retry") {
        if let Ok(retry) = serde_json::from_value(retry.clone()) {
            config.retry = retry;
        }
    }
    config.batch.enabled = file
        .pointer("/batch/enabled")
        .and_then(|v| v.as_bool())
        .unwrap_or_else(|| env_var("XAIFORGE_GATEWAY_BATCH").as_deref() == Some("1"));
    config.batch.max_batch_size = file
        .pointer("/batch/max_batch_size")
        .and_then(|v| v.as_u64())
        .map(|size| size as usize)
        .or_else(|| env_var("XAIFORGE_GATEWAY_BATCH_SIZE").and_then(|raw| raw.parse().ok()))
        .unwrap_or(config.batch.max_batch_size);
    config.batch.max_wait_ms = file
        .pointer("/batch/max_wait_ms")
        .and_then(|v| v.as_u64())
        .or_else(|| env_var("XAIFORGE_GATEWAY_BATCH_WAIT_MS").and_then(|raw| raw.parse().ok()))
        .unwrap_or(config.batch.max_wait_ms);
    config.circuit_breaker = file
        .get("circuit_breaker")
        .and_then(|v| v.as_bool())
        .unwrap_or(config.circuit_breaker);
    config.circuit_failures = file
        .get("circuit_failures")
        .and_then(|v| v.as_u64())
        .map(|n| n as u32)
        .unwrap_or(config.circuit_failures);
    config.circuit_reset_s = file
        .get("circuit_reset_s")
        .and_then(|v| v.as_f64())
        .unwrap_or(config.circuit_reset_s);
    config
}
