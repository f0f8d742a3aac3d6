//! Ollama provider - local model speaking a JSON-lines action protocol
//!
//! The model is prompted to answer with one JSON object per line, each
//! either a tool_call `{type, tool_name, arguments}` or a message
//! `{type, content}`. Unreachable endpoints degrade into an assistant
//! message rather than failing the run.

use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::debug;

use xaiforge_core::{Event, Role};
use xaiforge_tools::{ToolContext, ToolDispatch};

use crate::pipeline::EventSink;
use crate::provider::{ProviderError, TaskProvider};

pub struct OllamaProvider {
    pub endpoint: String,
    pub model: String,
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
        }
    }
}

impl OllamaProvider {
    fn build_prompt(&self, task: &str, tools: &dyn ToolDispatch) -> String {
        let tool_desc: Vec<Value> = tools
            .specs()
            .iter()
            .map(|spec| {
                json!({
                    "name": spec.name,
                    "description": spec.description,
                    "parameters": spec.parameters,
                })
            })
            .collect();
        format!(
            "You are an agent. Respond with JSON lines of actions.\n\
             Each line is either a tool_call {{type, tool_name, arguments}} or a message \
             {{type, content}}.\n\
             Tools: {}\n\
             Task: {task}\n",
            Value::Array(tool_desc)
        )
    }

    async fn handle_model_output(
        &self,
        output: &str,
        tools: &dyn ToolDispatch,
        ctx: &ToolContext,
        sink: &mut dyn EventSink,
    ) -> Result<String, ProviderError> {
        let trace_id = ctx.trace_id.clone();
        let mut final_answer = String::new();
        for line in output.lines() {
            let Ok(payload) = serde_json::from_str::<Value>(line) else {
                continue;
            };
            match payload.get("type").and_then(|t| t.as_str()) {
                Some("tool_call") => {
                    let tool_name = payload
                        .get("tool_name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    let arguments: Map<String, Value> = payload
                        .get("arguments")
                        .and_then(|v| v.as_object())
                        .cloned()
                        .unwrap_or_default();
                    let call = Event::tool_call(&trace_id, &tool_name, arguments.clone());
                    let call_span = call.meta().span_id.clone();
                    sink.emit(call)?;
                    match tools.invoke(&tool_name, &arguments, ctx).await {
                        Ok(result) => {
                            sink.emit(Event::tool_result(&trace_id, &tool_name, result, call_span))?;
                        }
                        Err(e) => {
                            sink.emit(Event::tool_error(
                                &trace_id,
                                &tool_name,
                                e.to_string(),
                                call_span,
                            ))?;
                        }
                    }
                }
                Some("message") => {
                    final_answer = payload
                        .get("content")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    sink.emit(Event::message(&trace_id, Role::Assistant, &final_answer))?;
                }
                _ => {}
            }
        }
        if final_answer.is_empty() {
            final_answer = "Ollama response processed.".to_string();
        }
        Ok(final_answer)
    }
}

#[async_trait::async_trait]
impl TaskProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn run(
        &self,
        task: &str,
        tools: &dyn ToolDispatch,
        ctx: &ToolContext,
        sink: &mut dyn EventSink,
    ) -> Result<String, ProviderError> {
        let trace_id = ctx.trace_id.clone();
        sink.emit(Event::message(
            &trace_id,
            Role::System,
            "Ollama provider expects JSON tool call responses.",
        ))?;
        let payload = json!({
            "model": self.model,
            "prompt": self.build_prompt(task, tools),
            "stream": false,
        });
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ProviderError::provider(e.to_string()))?;
        let response = client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&payload)
            .send()
            .await
            .and_then(|response| response.error_for_status());
        let data: Value = match response {
            Ok(response) => response
                .json()
                .await
                .map_err(|e| ProviderError::provider(e.to_string()))?,
            Err(e) => {
                debug!("ollama unreachable: {e}");
                sink.emit(Event::message(
                    &trace_id,
                    Role::Assistant,
                    format!("Ollama unavailable: {e}"),
                ))?;
                return Ok("Ollama unavailable; fallback not configured.".to_string());
            }
        };
        let output = data
            .get("response")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        self.handle_model_output(&output, tools, ctx, sink).await
    }
}
