//! Regex search over caller-provided text

use regex::Regex;
use serde_json::{json, Map, Value};

use crate::registry::{Tool, ToolContext, ToolError};

pub struct RegexSearchTool;

#[async_trait::async_trait]
impl Tool for RegexSearchTool {
    fn name(&self) -> &str {
        "regex_search"
    }

    fn description(&self) -> &str {
        "Search for regex matches in text."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string"},
                "text": {"type": "string"}
            },
            "required": ["pattern", "text"]
        })
    }

    async fn call(&self, args: &Map<String, Value>, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let pattern = args
            .get("pattern")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let text = args.get("text").and_then(|v| v.as_str()).unwrap_or_default();
        let regex =
            Regex::new(pattern).map_err(|e| ToolError::BadInput(format!("invalid regex: {e}")))?;
        let matches: Vec<Value> = regex
            .find_iter(text)
            .map(|m| Value::String(m.as_str().to_string()))
            .collect();
        Ok(Value::Array(matches))
    }
}
