//! HTTP fetch tool, gated on the run's allow_net flag

use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::registry::{Tool, ToolContext, ToolError};

pub struct HttpGetTool;

#[async_trait::async_trait]
impl Tool for HttpGetTool {
    fn name(&self) -> &str {
        "http_get"
    }

    fn description(&self) -> &str {
        "Fetch a URL over HTTP."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string"},
                "timeout_s": {"type": "number", "default": 5.0}
            },
            "required": ["url"]
        })
    }

    async fn call(&self, args: &Map<String, Value>, ctx: &ToolContext) -> Result<Value, ToolError> {
        if !ctx.allow_net {
            return Err(ToolError::BadInput(
                "Network access disabled (use --allow-net)".to_string(),
            ));
        }
        let url = args.get("url").and_then(|v| v.as_str()).unwrap_or_default();
        let timeout_s = args
            .get("timeout_s")
            .and_then(|v| v.as_f64())
            .unwrap_or(5.0);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(timeout_s))
            .build()?;
        let response = client.get(url).send().await?.error_for_status()?;
        debug!(url, "http_get ok");
        Ok(Value::String(response.text().await?))
    }
}
