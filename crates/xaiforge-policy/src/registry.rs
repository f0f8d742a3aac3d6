//! Policy-enforcing wrapper around a tool registry
//!
//! Presents the wrapped registry's specs unchanged but gates every
//! invocation through `enforce`, translating a violation into a tool
//! failure so the run records a `tool_error` and continues.

use std::sync::Arc;

use serde_json::{Map, Value};

use xaiforge_tools::{ToolContext, ToolDispatch, ToolError, ToolSpec};

use crate::engine::PolicyEngine;

pub struct PolicyToolRegistry {
    base: Arc<dyn ToolDispatch>,
    policy: Arc<PolicyEngine>,
}

impl PolicyToolRegistry {
    pub fn new(base: Arc<dyn ToolDispatch>, policy: Arc<PolicyEngine>) -> Self {
        Self { base, policy }
    }

    pub fn policy(&self) -> &Arc<PolicyEngine> {
        &self.policy
    }
}

#[async_trait::async_trait]
impl ToolDispatch for PolicyToolRegistry {
    fn specs(&self) -> Vec<ToolSpec> {
        self.base.specs()
    }

    async fn invoke(
        &self,
        name: &str,
        args: &Map<String, Value>,
        ctx: &ToolContext,
    ) -> Result<Value, ToolError> {
        if let Err(violation) = self.policy.enforce(name, args) {
            return Err(ToolError::Denied(format!(
                "Policy denied tool '{name}': {}",
                violation.decision.reason
            )));
        }
        self.base.invoke(name, args, ctx).await
    }
}
