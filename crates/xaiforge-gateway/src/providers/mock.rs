//! Mock provider - deterministic text derived from the request payload
//!
//! Honours two metadata escape hatches used by the eval and experiment
//! harnesses: `expected_text` replaces the generated text outright, and
//! `tool_call_override` / `force_tool_call` shape the simulated tool calls.

use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::models::{
    GatewayError, ModelProvider, ModelRequest, ModelResponse, ModelStream, StreamChunk,
    StreamEvent, ToolCall, UsageInfo,
};

pub struct MockProvider {
    pub name: String,
    pub model: String,
    pub latency_ms: u64,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            model: "mock-001".to_string(),
            latency_ms: 12,
        }
    }
}

impl MockProvider {
    fn stable_text(&self, request: &ModelRequest) -> String {
        if let Some(expected) = request
            .metadata
            .get("expected_text")
            .and_then(|v| v.as_str())
        {
            if !expected.is_empty() {
                return expected.to_string();
            }
        }
        let payload = request.to_payload().to_string();
        let digest = hex::encode(Sha256::digest(payload.as_bytes()));
        let prompt = request
            .messages
            .iter()
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        format!("MOCK[{}] {}", &digest[..12], prompt)
            .trim()
            .to_string()
    }

    fn simulate_tool_calls(&self, request: &ModelRequest, text: &str) -> Vec<ToolCall> {
        if request.tools.is_empty() {
            return Vec::new();
        }
        if let Some(over) = request
            .metadata
            .get("tool_call_override")
            .and_then(|v| v.as_object())
        {
            if let Some(name) = over.get("name").and_then(|v| v.as_str()) {
                let arguments = over
                    .get("arguments")
                    .and_then(|v| v.as_object())
                    .cloned()
                    .unwrap_or_default();
                return vec![ToolCall {
                    name: name.to_string(),
                    arguments,
                }];
            }
        }
        let first = &request.tools[0];
        if request
            .metadata
            .get("force_tool_call")
            .map(truthy)
            .unwrap_or(false)
        {
            return vec![ToolCall {
                name: first.name.clone(),
                arguments: input_args(text.chars().take(24).collect::<String>()),
            }];
        }
        if let Some((_, rest)) = text.split_once("tool:") {
            return vec![ToolCall {
                name: first.name.clone(),
                arguments: input_args(rest.trim().to_string()),
            }];
        }
        Vec::new()
    }

    fn usage(&self, request: &ModelRequest, text: &str) -> UsageInfo {
        let prompt_len: usize = request
            .messages
            .iter()
            .map(|message| message.content.len())
            .sum();
        UsageInfo {
            prompt_tokens: (prompt_len / 4).max(1) as u64,
            completion_tokens: (text.len() / 4).max(1) as u64,
            total_tokens: (text.len() / 2).max(2) as u64,
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn input_args(input: String) -> Map<String, Value> {
    let mut arguments = Map::new();
    arguments.insert("input".to_string(), Value::String(input));
    arguments
}

#[async_trait::async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, GatewayError> {
        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;
        let text = self.stable_text(&request);
        let tool_calls = self.simulate_tool_calls(&request, &text);
        let usage = self.usage(&request, &text);
        let mut metadata = Map::new();
        metadata.insert(
            "seed".to_string(),
            request.seed.map(Into::into).unwrap_or(Value::Null),
        );
        Ok(ModelResponse {
            text,
            tool_calls,
            usage,
            latency_ms: started.elapsed().as_millis() as u64,
            provider: self.name.clone(),
            model: self.model.clone(),
            request_id: request.request_id,
            metadata,
        })
    }

    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, GatewayError> {
        let text = self.stable_text(&request);
        let tool_calls = self.simulate_tool_calls(&request, &text);
        let provider = self.name.clone();
        let model = self.model.clone();
        let latency = Duration::from_millis(self.latency_ms);
        let stream = async_stream::stream! {
            let words: Vec<String> = text.split_whitespace().map(str::to_string).collect();
            for (index, word) in words.iter().enumerate() {
                tokio::time::sleep(latency).await;
                yield Ok(StreamEvent {
                    request_id: request.request_id.clone(),
                    provider: provider.clone(),
                    model: model.clone(),
                    chunk: StreamChunk {
                        index: index as u64,
                        text: format!("{word} "),
                        is_final: false,
                        tool_calls: Vec::new(),
                        usage: None,
                    },
                });
            }
            let usage = UsageInfo {
                prompt_tokens: ((words.len() / 2).max(1)) as u64,
                completion_tokens: words.len() as u64,
                total_tokens: (words.len() * 2) as u64,
            };
            yield Ok(StreamEvent {
                request_id: request.request_id.clone(),
                provider: provider.clone(),
                model: model.clone(),
                chunk: StreamChunk {
                    index: words.len() as u64,
                    text: String::new(),
                    is_final: true,
                    tool_calls: tool_calls.clone(),
                    usage: Some(usage),
                },
            });
        };
        Ok(Box::pin(stream))
    }
}
