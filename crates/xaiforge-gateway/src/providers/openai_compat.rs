//! OpenAI-compatible provider - chat/completions mapping with SSE streaming

use std::time::{Duration, Instant};

use futures::StreamExt;
use serde_json::{json, Map, Value};
use tracing::{debug, error};

use crate::models::{
    GatewayError, ModelProvider, ModelRequest, ModelResponse, ModelStream, StreamChunk,
    StreamEvent, ToolCall, UsageInfo,
};

pub struct OpenAiCompatProvider {
    name: String,
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: "openai-compat".to_string(),
            model: model.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var("XAIFORGE_GATEWAY_BASE_URL").unwrap_or_default(),
            std::env::var("XAIFORGE_GATEWAY_API_KEY").unwrap_or_default(),
            std::env::var("XAIFORGE_GATEWAY_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        )
    }

    fn request_payload(&self, request: &ModelRequest, stream: bool) -> Value {
        let mut payload = json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if !request.tools.is_empty() {
            payload["tools"] = Value::Array(
                request
                    .tools
                    .iter()
                    .map(|tool| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": tool.name,
                                "description": tool.description,
                                "parameters": tool.schema,
                            }
                        })
                    })
                    .collect(),
            );
        }
        if stream {
            payload["stream"] = Value::Bool(true);
        }
        payload
    }

    fn apply_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            builder
        } else {
            builder.header("Authorization", format!("Bearer {}", self.api_key))
        }
    }
}

/// Map a chat/completions body back into a ModelResponse.
pub(crate) fn parse_chat_response(
    data: &Value,
    provider: &str,
    model: &str,
    request_id: Option<String>,
    latency_ms: u64,
) -> Result<ModelResponse, GatewayError> {
    let message = data
        .pointer("/choices/0/message")
        .ok_or_else(|| GatewayError::InvalidResponse("missing choices[0].message".to_string()))?;
    let text = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let mut tool_calls = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(|v| v.as_array()) {
        for call in calls {
            let Some(function) = call.get("function") else {
                continue;
            };
            let Some(name) = function.get("name").and_then(|v| v.as_str()) else {
                continue;
            };
            let arguments = match function.get("arguments") {
                // The wire format carries arguments as a JSON-encoded string.
                Some(Value::String(raw)) => serde_json::from_str::<Map<String, Value>>(raw)
                    .unwrap_or_default(),
                Some(Value::Object(map)) => map.clone(),
                _ => Map::new(),
            };
            tool_calls.push(ToolCall {
                name: name.to_string(),
                arguments,
            });
        }
    }
    let usage = UsageInfo {
        prompt_tokens: data
            .pointer("/usage/prompt_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
        completion_tokens: data
            .pointer("/usage/completion_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
        total_tokens: data
            .pointer("/usage/total_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
    };
    Ok(ModelResponse {
        text,
        tool_calls,
        usage,
        latency_ms,
        provider: provider.to_string(),
        model: model.to_string(),
        request_id,
        metadata: Map::new(),
    })
}

#[async_trait::async_trait]
impl ModelProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, GatewayError> {
        if self.base_url.is_empty() {
            return Err(GatewayError::NotConfigured(
                "OpenAI-compatible base URL is not configured".to_string(),
            ));
        }
        let started = Instant::now();
        let builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .timeout(Duration::from_secs(30))
            .json(&self.request_payload(&request, false));
        let response = self.apply_headers(builder).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "openai-compat error: {body}");
            return Err(GatewayError::Provider(format!("{status}: {body}")));
        }
        let data: Value = response.json().await?;
        debug!(model = %self.model, "openai-compat response");
        parse_chat_response(
            &data,
            &self.name,
            &self.model,
            request.request_id.clone(),
            started.elapsed().as_millis() as u64,
        )
    }

    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, GatewayError> {
        if self.base_url.is_empty() {
            return Err(GatewayError::NotConfigured(
                "OpenAI-compatible base URL is not configured".to_string(),
            ));
        }
        let builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .timeout(Duration::from_secs(30))
            .json(&self.request_payload(&request, true));
        let response = self.apply_headers(builder).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Provider(format!("{status}: {body}")));
        }
        let provider = self.name.clone();
        let model = self.model.clone();
        let request_id = request.request_id.clone();
        let mut bytes_stream = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut buffer = String::new();
            let mut index = 0u64;
            'outer: while let Some(chunk) = bytes_stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(GatewayError::Provider(e.to_string()));
                        break;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);
                    let Some(payload) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let payload = payload.trim();
                    if payload == "[DONE]" {
                        break 'outer;
                    }
                    let Ok(data) = serde_json::from_str::<Value>(payload) else {
                        continue;
                    };
                    let text = data
                        .pointer("/choices/0/delta/content")
                        .and_then(|v| v.as_str())
                        .unwrap_or("");
                    if !text.is_empty() {
                        yield Ok(StreamEvent {
                            request_id: request_id.clone(),
                            provider: provider.clone(),
                            model: model.clone(),
                            chunk: StreamChunk {
                                index,
                                text: text.to_string(),
                                is_final: false,
                                tool_calls: Vec::new(),
                                usage: None,
                            },
                        });
                        index += 1;
                    }
                }
            }
            yield Ok(StreamEvent {
                request_id: request_id.clone(),
                provider: provider.clone(),
                model: model.clone(),
                chunk: StreamChunk {
                    index,
                    text: String::new(),
                    is_final: true,
                    tool_calls: Vec::new(),
                    usage: None,
                },
            });
        };
        Ok(Box::pin(stream))
    }
}
