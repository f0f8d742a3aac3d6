//! Local HTTP provider - chat/completions mapping against a local endpoint

use std::time::{Duration, Instant};

use serde_json::{json, Value};

use crate::models::{GatewayError, ModelProvider, ModelRequest, ModelResponse};
use crate::providers::openai_compat::parse_chat_response;

pub struct LocalHttpProvider {
    name: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
}

impl LocalHttpProvider {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: "local-http".to_string(),
            model: model.into(),
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var("XAIFORGE_LOCAL_HTTP")
                .unwrap_or_else(|_| "http://127.0.0.1:11434".to_string()),
            std::env::var("XAIFORGE_GATEWAY_MODEL").unwrap_or_else(|_| "local".to_string()),
        )
    }
}

#[async_trait::async_trait]
impl ModelProvider for LocalHttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, GatewayError> {
        let started = Instant::now();
        let payload = json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .timeout(Duration::from_secs(30))
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        let data: Value = response.json().await?;
        parse_chat_response(
            &data,
            &self.name,
            &self.model,
            request.request_id.clone(),
            started.elapsed().as_millis() as u64,
        )
    }
}
