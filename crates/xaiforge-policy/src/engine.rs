//! Policy engine - ordered rule scan with last-match-wins

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::models::{PolicyAction, PolicyConfig, PolicyDecision, RiskLevel};

#[derive(Error, Debug)]
#[error("{}", .decision.reason)]
pub struct PolicyViolation {
    pub decision: PolicyDecision,
}

/// Decisions accumulated for one trace.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PolicyReport {
    pub trace_id: String,
    pub decisions: Vec<PolicyDecision>,
}

impl PolicyReport {
    pub fn summary(&self) -> Value {
        let allowed = self.decisions.iter().filter(|d| d.allowed).count();
        let denied = self
            .decisions
            .iter()
            .filter(|d| d.action == PolicyAction::Deny)
            .count();
        let monitored = self
            .decisions
            .iter()
            .filter(|d| d.action == PolicyAction::Monitor)
            .count();
        json!({
            "trace_id": self.trace_id,
            "decisions": self.decisions.len(),
            "allowed": allowed,
            "denied": denied,
            "monitored": monitored,
        })
    }

    pub fn to_value(&self) -> Value {
        json!({
            "trace_id": self.trace_id,
            "summary": self.summary(),
            "decisions": self.decisions,
        })
    }

    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_value().to_string())
    }
}

/// Evaluates tool invocations against an ordered rule list. The report is
/// guarded by a lock; the engine itself is per-run.
pub struct PolicyEngine {
    config: PolicyConfig,
    report: Mutex<PolicyReport>,
}

impl PolicyEngine {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            config,
            report: Mutex::new(PolicyReport::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        let raw = fs::read_to_string(path)
            .map_err(|e| format!("cannot read policy file {}: {e}", path.display()))?;
        let config: PolicyConfig =
            serde_json::from_str(&raw).map_err(|e| format!("invalid policy payload: {e}"))?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn attach_trace(&self, trace_id: &str) {
        self.report.lock().expect("policy report lock").trace_id = trace_id.to_string();
    }

    /// Scan rules in order; when several match, the last one wins. Without a
    /// match the configured default action applies. Every decision is
    /// appended to the report.
    pub fn evaluate(&self, tool_name: &str, args: &Map<String, Value>) -> PolicyDecision {
        let mut winner: Option<PolicyDecision> = None;
        for rule in &self.config.rules {
            if rule.matches(tool_name, args) {
                let allowed =
                    matches!(rule.action, PolicyAction::Allow | PolicyAction::Monitor);
                winner = Some(PolicyDecision {
                    tool_name: tool_name.to_string(),
                    action: rule.action,
                    allowed,
                    risk: rule.risk,
                    reason: if rule.reason.is_empty() {
                        format!("Rule {} matched", rule.name)
                    } else {
                        rule.reason.clone()
                    },
                    matched_rules: vec![rule.name.clone()],
                });
            }
        }
        let decision = winner.unwrap_or_else(|| {
            let allowed = matches!(
                self.config.default_action,
                PolicyAction::Allow | PolicyAction::Monitor
            );
            PolicyDecision {
                tool_name: tool_name.to_string(),
                action: self.config.default_action,
                allowed,
                risk: self.config.default_risk,
                reason: "Default policy applied".to_string(),
                matched_rules: Vec::new(),
            }
        });
        debug!(tool = tool_name, action = ?decision.action, "policy decision");
        self.report
            .lock()
            .expect("policy report lock")
            .decisions
            .push(decision.clone());
        decision
    }

    /// Evaluate and fail on `deny`. `monitor` permits execution while still
    /// recording the decision.
    pub fn enforce(
        &self,
        tool_name: &str,
        args: &Map<String, Value>,
    ) -> Result<PolicyDecision, PolicyViolation> {
        let decision = self.evaluate(tool_name, args);
        if !decision.allowed {
            return Err(PolicyViolation { decision });
        }
        Ok(decision)
    }

    pub fn report(&self) -> PolicyReport {
        self.report.lock().expect("policy report lock").clone()
    }
}

/// Read-side helper over a decision list.
pub struct PolicyAuditor {
    decisions: Vec<PolicyDecision>,
}

impl PolicyAuditor {
    pub fn new(decisions: Vec<PolicyDecision>) -> Self {
        Self { decisions }
    }

    pub fn high_risk(&self) -> Vec<&PolicyDecision> {
        self.decisions
            .iter()
            .filter(|d| d.risk == RiskLevel::High)
            .collect()
    }

    pub fn denied(&self) -> Vec<&PolicyDecision> {
        self.decisions
            .iter()
            .filter(|d| d.action == PolicyAction::Deny)
            .collect()
    }
}
