//! Policy loading from disk and environment

use std::path::Path;

use crate::engine::PolicyEngine;
use crate::models::{PolicyAction, PolicyConfig, PolicyRule, RiskLevel};

pub const POLICY_FILE_ENV: &str = "XAIFORGE_POLICY_FILE";

/// Load the policy named by `XAIFORGE_POLICY_FILE`, if set. A set-but-missing
/// file is an error; an unset variable means no policy.
pub fn load_policy_from_env() -> Result<Option<PolicyEngine>, String> {
    let Ok(policy_file) = std::env::var(POLICY_FILE_ENV) else {
        return Ok(None);
    };
    if policy_file.is_empty() {
        return Ok(None);
    }
    let path = Path::new(&policy_file);
    if !path.exists() {
        return Err(format!("Policy file not found: {policy_file}"));
    }
    PolicyEngine::from_file(path).map(Some)
}

pub fn load_policy_json(path: &Path) -> Result<PolicyEngine, String> {
    PolicyEngine::from_file(path)
}

/// Built-in policy that denies network calls and allows everything else.
pub fn default_policy() -> PolicyEngine {
    PolicyEngine::new(PolicyConfig {
        description: "Default policy denies network calls.".to_string(),
        default_action: PolicyAction::Allow,
        default_risk: RiskLevel::Low,
        rules: vec![PolicyRule {
            name: "block-network".to_string(),
            action: PolicyAction::Deny,
            tool: "http_get".to_string(),
            arg_patterns: Default::default(),
            risk: RiskLevel::High,
            reason: "Network access blocked by policy".to_string(),
        }],
    })
}
