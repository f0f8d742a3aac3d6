//! Trace events - the tagged variant union and the rolling hasher
//!
//! Every event serializes to a single JSON line whose `type` field is the
//! discriminator. The rolling hash covers each line plus a trailing newline,
//! in emission order, excluding `run_end` so the terminal event can embed the
//! final hash without self-reference.

use chrono::{SecondsFormat, Utc};
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Current UTC timestamp in ISO-8601 with microsecond precision.
pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Fresh span identifier (hex, no dashes).
pub fn new_span_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Message role within a trace.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Assistant,
    Tool,
}

/// Terminal status of a run.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Error,
}

/// Fields shared by every event variant.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct EventMeta {
    pub trace_id: String,
    pub ts: String,
    pub span_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
}

impl EventMeta {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            ts: now_ts(),
            span_id: new_span_id(),
            parent_span_id: None,
        }
    }

    pub fn with_parent(trace_id: impl Into<String>, parent_span_id: impl Into<String>) -> Self {
        let mut meta = Self::new(trace_id);
        meta.parent_span_id = Some(parent_span_id.into());
        meta
    }
}

/// The atomic trace unit. Tagged on `type`; one JSON object per line.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    RunStart {
        #[serde(flatten)]
        meta: EventMeta,
        task: String,
        provider: String,
        root_dir: String,
    },
    Plan {
        #[serde(flatten)]
        meta: EventMeta,
        steps: Vec<String>,
    },
    Message {
        #[serde(flatten)]
        meta: EventMeta,
        role: Role,
        content: String,
    },
    ToolCall {
        #[serde(flatten)]
        meta: EventMeta,
        tool_name: String,
        arguments: Map<String, Value>,
    },
    ToolResult {
        #[serde(flatten)]
        meta: EventMeta,
        tool_name: String,
        result: Value,
    },
    ToolError {
        #[serde(flatten)]
        meta: EventMeta,
        tool_name: String,
        error: String,
    },
    RunEnd {
        #[serde(flatten)]
        meta: EventMeta,
        status: RunStatus,
        summary: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        final_hash: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_count: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        integrity_ok: Option<bool>,
    },
}

impl Event {
    pub fn run_start(
        trace_id: impl Into<String>,
        task: impl Into<String>,
        provider: impl Into<String>,
        root_dir: impl Into<String>,
    ) -> Self {
        Self::RunStart {
            meta: EventMeta::new(trace_id),
            task: task.into(),
            provider: provider.into(),
            root_dir: root_dir.into(),
        }
    }

    pub fn plan(trace_id: impl Into<String>, steps: Vec<String>) -> Self {
        Self::Plan {
            meta: EventMeta::new(trace_id),
            steps,
        }
    }

    pub fn message(trace_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self::Message {
            meta: EventMeta::new(trace_id),
            role,
            content: content.into(),
        }
    }

    pub fn tool_call(
        trace_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> Self {
        Self::ToolCall {
            meta: EventMeta::new(trace_id),
            tool_name: tool_name.into(),
            arguments,
        }
    }

    pub fn tool_result(
        trace_id: impl Into<String>,
        tool_name: impl Into<String>,
        result: Value,
        parent_span_id: impl Into<String>,
    ) -> Self {
        Self::ToolResult {
            meta: EventMeta::with_parent(trace_id, parent_span_id),
            tool_name: tool_name.into(),
            result,
        }
    }

    pub fn tool_error(
        trace_id: impl Into<String>,
        tool_name: impl Into<String>,
        error: impl Into<String>,
        parent_span_id: impl Into<String>,
    ) -> Self {
        Self::ToolError {
            meta: EventMeta::with_parent(trace_id, parent_span_id),
            tool_name: tool_name.into(),
            error: error.into(),
        }
    }

    pub fn run_end(
        trace_id: impl Into<String>,
        status: RunStatus,
        summary: impl Into<String>,
        final_hash: Option<String>,
        event_count: Option<u64>,
    ) -> Self {
        Self::RunEnd {
            meta: EventMeta::new(trace_id),
            status,
            summary: summary.into(),
            final_hash,
            event_count,
            integrity_ok: None,
        }
    }

    /// Terminal event synthesized by replay, carrying the integrity verdict.
    pub fn replay_end(
        trace_id: impl Into<String>,
        status: RunStatus,
        summary: impl Into<String>,
        final_hash: String,
        event_count: u64,
        integrity_ok: bool,
    ) -> Self {
        Self::RunEnd {
            meta: EventMeta::new(trace_id),
            status,
            summary: summary.into(),
            final_hash: Some(final_hash),
            event_count: Some(event_count),
            integrity_ok: Some(integrity_ok),
        }
    }

    pub fn meta(&self) -> &EventMeta {
        match self {
            Event::RunStart { meta, .. }
            | Event::Plan { meta, .. }
            | Event::Message { meta, .. }
            | Event::ToolCall { meta, .. }
            | Event::ToolResult { meta, .. }
            | Event::ToolError { meta, .. }
            | Event::RunEnd { meta, .. } => meta,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Event::RunStart { .. } => "run_start",
            Event::Plan { .. } => "plan",
            Event::Message { .. } => "message",
            Event::ToolCall { .. } => "tool_call",
            Event::ToolResult { .. } => "tool_result",
            Event::ToolError { .. } => "tool_error",
            Event::RunEnd { .. } => "run_end",
        }
    }

    /// Tool name for tool_call/tool_result/tool_error events.
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Event::ToolCall { tool_name, .. }
            | Event::ToolResult { tool_name, .. }
            | Event::ToolError { tool_name, .. } => Some(tool_name),
            _ => None,
        }
    }

    pub fn is_run_end(&self) -> bool {
        matches!(self, Event::RunEnd { .. })
    }

    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

/// JSON Schema covering the union of all event variants.
pub fn event_schema() -> Value {
    serde_json::to_value(schema_for!(Event)).unwrap_or(Value::Null)
}

/// SHA-256 accumulated over `line + "\n"` per update.
///
/// Not thread-safe; each trace writer owns its own hasher.
pub struct RollingHasher {
    hasher: Sha256,
    count: u64,
}

impl Default for RollingHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl RollingHasher {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            count: 0,
        }
    }

    pub fn update(&mut self, line: &str) {
        self.hasher.update(line.as_bytes());
        self.hasher.update(b"\n");
        self.count += 1;
    }

    /// Hex digest of the state so far. Does not consume or reset the hasher.
    pub fn hexdigest(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}
