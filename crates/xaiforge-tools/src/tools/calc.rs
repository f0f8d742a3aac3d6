//! Calc tool - safe arithmetic over a whitelisted expression grammar

use serde_json::{json, Map, Value};

use crate::calc::{evaluate, format_number};
use crate::registry::{Tool, ToolContext, ToolError};

pub struct CalcTool;

#[async_trait::async_trait]
impl Tool for CalcTool {
    fn name(&self) -> &str {
        "calc"
    }

    fn description(&self) -> &str {
        "Evaluate a math expression."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"expression": {"type": "string"}},
            "required": ["expression"]
        })
    }

    async fn call(&self, args: &Map<String, Value>, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let expression = args
            .get("expression")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let value = evaluate(expression)?;
        Ok(Value::String(format_number(value)))
    }
}
