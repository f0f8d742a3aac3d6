//! Repo grep tool - substring search across glob-selected files

use std::fs::File;
use std::io::Read;

use globset::{GlobBuilder, GlobSetBuilder};
use serde_json::{json, Map, Value};
use tracing::debug;
use walkdir::WalkDir;

use crate::registry::{Tool, ToolContext, ToolError};

const MAX_HITS: usize = 200;
const DEFAULT_FILE_BYTES: u64 = 65_536;

pub struct RepoGrepTool;

#[async_trait::async_trait]
impl Tool for RepoGrepTool {
    fn name(&self) -> &str {
        "repo_grep"
    }

    fn description(&self) -> &str {
        "Search files within the root for a query."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "globs": {"type": "array", "items": {"type": "string"}},
                "max_bytes": {"type": "integer", "default": DEFAULT_FILE_BYTES}
            },
            "required": ["query"]
        })
    }

    async fn call(&self, args: &Map<String, Value>, ctx: &ToolContext) -> Result<Value, ToolError> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let globs: Vec<String> = args
            .get("globs")
            .and_then(|v| v.as_array())
            .map(|patterns| {
                patterns
                    .iter()
                    .filter_map(|p| p.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_else(|| vec!["**/*".to_string()]);
        let max_bytes = args
            .get("max_bytes")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_FILE_BYTES) as usize;

        let mut builder = GlobSetBuilder::new();
        for pattern in &globs {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(false)
                .build()
                .map_err(|e| ToolError::BadInput(format!("invalid glob {pattern}: {e}")))?;
            builder.add(glob);
        }
        let glob_set = builder
            .build()
            .map_err(|e| ToolError::BadInput(format!("invalid globs: {e}")))?;

        let mut results: Vec<Value> = Vec::new();
        for entry in WalkDir::new(&ctx.root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&ctx.root) else {
                continue;
            };
            if !glob_set.is_match(relative) {
                continue;
            }
            let Ok(mut file) = File::open(entry.path()) else {
                continue;
            };
            let mut buffer = Vec::with_capacity(max_bytes.min(8192));
            if file
                .by_ref()
                .take(max_bytes as u64)
                .read_to_end(&mut buffer)
                .is_err()
            {
                continue;
            }
            let Ok(text) = String::from_utf8(buffer) else {
                continue;
            };
            for (idx, line) in text.lines().enumerate() {
                if line.contains(query) {
                    results.push(json!({
                        "path": relative.to_string_lossy(),
                        "line": idx + 1,
                        "text": line,
                    }));
                    if results.len() >= MAX_HITS {
                        debug!(query, hits = results.len(), "repo_grep hit cap");
                        return Ok(Value::Array(results));
                    }
                }
            }
        }
        debug!(query, hits = results.len(), "repo_grep");
        Ok(Value::Array(results))
    }
}
