//! Policy rules, actions, and decisions

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    Allow,
    Deny,
    Monitor,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

fn default_tool() -> String {
    "*".to_string()
}

/// One rule: tool name (wildcard `*` allowed) plus per-argument substring
/// patterns over the stringified values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyRule {
    pub name: String,
    pub action: PolicyAction,
    #[serde(default = "default_tool")]
    pub tool: String,
    #[serde(default)]
    pub arg_patterns: std::collections::BTreeMap<String, String>,
    #[serde(default = "RiskLevel::low")]
    pub risk: RiskLevel,
    #[serde(default)]
    pub reason: String,
}

impl RiskLevel {
    fn low() -> Self {
        RiskLevel::Low
    }
}

impl PolicyRule {
    pub fn matches(&self, tool_name: &str, args: &Map<String, Value>) -> bool {
        if self.tool != "*" && self.tool != tool_name {
            return false;
        }
        for (key, pattern) in &self.arg_patterns {
            let Some(value) = args.get(key) else {
                return false;
            };
            if !stringify(value).contains(pattern.as_str()) {
                return false;
            }
        }
        true
    }
}

/// String values are matched on their unquoted form, everything else on its
/// JSON rendering.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub tool_name: String,
    pub action: PolicyAction,
    pub allowed: bool,
    pub risk: RiskLevel,
    pub reason: String,
    pub matched_rules: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub description: String,
    #[serde(default = "PolicyConfig::default_action")]
    pub default_action: PolicyAction,
    #[serde(default = "RiskLevel::low")]
    pub default_risk: RiskLevel,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            description: String::new(),
            default_action: PolicyAction::Allow,
            default_risk: RiskLevel::Low,
            rules: Vec::new(),
        }
    }
}

impl PolicyConfig {
    fn default_action() -> PolicyAction {
        PolicyAction::Allow
    }
}
