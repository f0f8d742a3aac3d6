//! Tool trait, execution context, and the insertion-ordered registry

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    BadInput(String),

    #[error("{0}")]
    Denied(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Per-run execution context handed to every tool invocation.
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub root: PathBuf,
    pub allow_net: bool,
    pub trace_id: String,
}

impl ToolContext {
    pub fn new(root: impl Into<PathBuf>, allow_net: bool, trace_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            allow_net,
            trace_id: trace_id.into(),
        }
    }
}

/// Declarative view of a tool: name, description and parameter schema.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// The Tool trait. Handlers are pure functions of (arguments, context);
/// anything side-effecting must go through the context.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the arguments object.
    fn parameters(&self) -> Value;

    async fn call(&self, args: &Map<String, Value>, ctx: &ToolContext) -> Result<Value, ToolError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// The dispatch seam providers call through. Lets a policy wrapper
/// substitute enforcement in front of the real registry.
#[async_trait::async_trait]
pub trait ToolDispatch: Send + Sync {
    fn specs(&self) -> Vec<ToolSpec>;

    async fn invoke(
        &self,
        name: &str,
        args: &Map<String, Value>,
        ctx: &ToolContext,
    ) -> Result<Value, ToolError>;
}

/// Tools keyed by name, iterated in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    order: Vec<String>,
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name while
    /// keeping its original position.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }
}

#[async_trait::async_trait]
impl ToolDispatch for ToolRegistry {
    fn specs(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.spec())
            .collect()
    }

    async fn invoke(
        &self,
        name: &str,
        args: &Map<String, Value>,
        ctx: &ToolContext,
    ) -> Result<Value, ToolError> {
        match self.tools.get(name) {
            Some(tool) => tool.call(args, ctx).await,
            None => Err(ToolError::UnknownTool(name.to_string())),
        }
    }
}
