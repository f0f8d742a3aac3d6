//! File read tool, sandboxed to the run's root directory

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::ensure_within_root;
use crate::registry::{Tool, ToolContext, ToolError};

pub struct FileReadTool;

#[async_trait::async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read a file within the root directory."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "max_bytes": {"type": "integer", "default": 20000}
            },
            "required": ["path"]
        })
    }

    async fn call(&self, args: &Map<String, Value>, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or_default();
        let max_bytes = args
            .get("max_bytes")
            .and_then(|v| v.as_u64())
            .unwrap_or(20_000) as usize;
        let requested = Path::new(path);
        let target = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            ctx.root.join(requested)
        };
        let resolved = ensure_within_root(&target, &ctx.root)?;
        let file = File::open(&resolved)?;
        let mut buffer = Vec::new();
        file.take(max_bytes as u64).read_to_end(&mut buffer)?;
        debug!(path, bytes = buffer.len(), "file_read");
        Ok(Value::String(
            String::from_utf8_lossy(&buffer).into_owned(),
        ))
    }
}
