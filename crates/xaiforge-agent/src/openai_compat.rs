//! OpenAI-compatible task provider - tool-calling chat completions
//!
//! Maps the registry's tool specs into the standard function-calling schema,
//! executes whatever the model asks for, and emits the resulting events.
//! Unconfigured credentials degrade into an assistant message.

use std::time::Duration;

use serde_json::{json, Map, Value};

use xaiforge_core::{Event, Role};
use xaiforge_tools::{ToolContext, ToolDispatch};

use crate::pipeline::EventSink;
use crate::provider::{ProviderError, TaskProvider};

#[derive(Default)]
pub struct OpenAiCompatProvider;

#[async_trait::async_trait]
impl TaskProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai_compat"
    }

    async fn run(
        &self,
        task: &str,
        tools: &dyn ToolDispatch,
        ctx: &ToolContext,
        sink: &mut dyn EventSink,
    ) -> Result<String, ProviderError> {
        let trace_id = ctx.trace_id.clone();
        let base_url = std::env::var("XAIFORGE_OPENAI_BASE_URL").unwrap_or_default();
        let api_key = std::env::var("XAIFORGE_OPENAI_API_KEY").unwrap_or_default();
        let model =
            std::env::var("XAIFORGE_OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        if base_url.is_empty() || api_key.is_empty() {
            let note = "OpenAI-compatible provider not configured.";
            sink.emit(Event::message(&trace_id, Role::Assistant, note))?;
            return Ok(note.to_string());
        }

        let tool_payloads: Vec<Value> = tools
            .specs()
            .iter()
            .map(|spec| {
                json!({
                    "type": "function",
                    "function": {
                        "name": spec.name,
                        "description": spec.description,
                        "parameters": spec.parameters,
                    }
                })
            })
            .collect();
        let payload = json!({
            "model": model,
            "messages": [{"role": "user", "content": task}],
            "tools": tool_payloads,
            "tool_choice": "auto",
        });
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| ProviderError::provider(e.to_string()))?;
        let data: Value = client
            .post(format!("{base_url}/chat/completions"))
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&payload)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| ProviderError::provider(e.to_string()))?
            .json()
            .await
            .map_err(|e| ProviderError::provider(e.to_string()))?;

        let mut final_answer = String::new();
        let choices = data
            .get("choices")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        for choice in &choices {
            let message = choice.get("message").cloned().unwrap_or(Value::Null);
            if let Some(calls) = message.get("tool_calls").and_then(|v| v.as_array()) {
                for call in calls {
                    let name = call
                        .pointer("/function/name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    let arguments: Map<String, Value> = call
                        .pointer("/function/arguments")
                        .and_then(|v| v.as_str())
                        .and_then(|raw| serde_json::from_str(raw).ok())
                        .unwrap_or_default();
                    let event_call = Event::tool_call(&trace_id, &name, arguments.clone());
                    let call_span = event_call.meta().span_id.clone();
                    sink.emit(event_call)?;
                    match tools.invoke(&name, &arguments, ctx).await {
                        Ok(result) => {
                            sink.emit(Event::tool_result(&trace_id, &name, result, call_span))?;
                        }
                        Err(e) => {
                            sink.emit(Event::tool_error(
                                &trace_id,
                                &name,
                                e.to_string(),
                                call_span,
                            ))?;
                        }
                    }
                }
            }
            if let Some(content) = message.get("content").and_then(|v| v.as_str()) {
                if !content.is_empty() {
                    final_answer = content.to_string();
                    sink.emit(Event::message(&trace_id, Role::Assistant, content))?;
                }
            }
        }
        if final_answer.is_empty() {
            final_answer = "OpenAI-compatible response processed.".to_string();
        }
        Ok(final_answer)
    }
}
