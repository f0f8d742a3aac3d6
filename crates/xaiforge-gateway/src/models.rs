//! Gateway request/response types and the provider contract

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request timed out after {0}s")]
    Timeout(f64),

    #[error("circuit breaker open")]
    CircuitOpen,

    #[error("provider not configured: {0}")]
    NotConfigured(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("batch scheduler stopped")]
    BatchClosed,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ModelMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ModelMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ModelRequest {
    pub messages: Vec<ModelMessage>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default = "ModelRequest::default_temperature")]
    pub temperature: f32,
    #[serde(default = "ModelRequest::default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub request_id: Option<String>,
}

impl Default for ModelRequest {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            tools: Vec::new(),
            temperature: Self::default_temperature(),
            max_tokens: Self::default_max_tokens(),
            seed: None,
            stop: None,
            metadata: Map::new(),
            request_id: None,
        }
    }
}

impl ModelRequest {
    fn default_temperature() -> f32 {
        0.2
    }

    fn default_max_tokens() -> u32 {
        512
    }

    pub fn from_messages(messages: Vec<ModelMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// Canonical JSON payload (serde_json maps are key-sorted, so this is
    /// stable across runs for the same request).
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A tool invocation requested by the model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Map<String, Value>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageInfo {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: UsageInfo,
    pub latency_ms: u64,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ModelResponse {
    /// The whole response as one terminal stream chunk.
    pub fn final_chunk(&self) -> StreamChunk {
        StreamChunk {
            index: 0,
            text: self.text.clone(),
            is_final: true,
            tool_calls: self.tool_calls.clone(),
            usage: Some(self.usage),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StreamChunk {
    pub index: u64,
    pub text: String,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub usage: Option<UsageInfo>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StreamEvent {
    pub request_id: Option<String>,
    pub provider: String,
    pub model: String,
    pub chunk: StreamChunk,
}

pub type ModelStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, GatewayError>> + Send>>;

/// The provider contract: generate, ordered streaming, and batching.
#[async_trait::async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, GatewayError>;

    /// Ordered stream with exactly one terminal chunk. Default: the buffered
    /// response as a single final chunk.
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, GatewayError> {
        let response = self.generate(request).await?;
        let event = StreamEvent {
            request_id: response.request_id.clone(),
            provider: response.provider.clone(),
            model: response.model.clone(),
            chunk: response.final_chunk(),
        };
        Ok(Box::pin(futures::stream::once(async move { Ok(event) })))
    }

    /// Default batching is sequential generation; responses keep input order.
    async fn generate_batch(
        &self,
        requests: Vec<ModelRequest>,
    ) -> Result<Vec<ModelResponse>, GatewayError> {
        let mut responses = Vec::with_capacity(requests.len());
        for request in requests {
            responses.push(self.generate(request).await?);
        }
        Ok(responses)
    }
}
