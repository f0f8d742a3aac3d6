//! Xaiforge Policy - rule evaluation and tool-invocation gating

pub mod engine;
pub mod loader;
pub mod models;
pub mod registry;

pub use engine::{PolicyAuditor, PolicyEngine, PolicyReport, PolicyViolation};
pub use loader::{default_policy, load_policy_from_env, load_policy_json};
pub use models::{PolicyAction, PolicyConfig, PolicyDecision, PolicyRule, RiskLevel};
pub use registry::PolicyToolRegistry;
