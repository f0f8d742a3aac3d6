//! Tests for xaiforge-policy: rule matching, ordering, enforcement, reports
//! and the policy-wrapped registry

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Map, Value};

use xaiforge_policy::{
    PolicyAction, PolicyAuditor, PolicyConfig, PolicyEngine, PolicyRule, PolicyToolRegistry,
    RiskLevel,
};
use xaiforge_tools::{build_registry, ToolContext, ToolDispatch, ToolError};

fn test_workspace() -> PathBuf {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "xaiforge-policy-test-{}-{}",
        std::process::id(),
        id
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn cleanup(dir: &Path) {
    let _ = std::fs::remove_dir_all(dir);
}

fn args(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

fn rule(name: &str, action: PolicyAction, tool: &str, risk: RiskLevel, reason: &str) -> PolicyRule {
    PolicyRule {
        name: name.to_string(),
        action,
        tool: tool.to_string(),
        arg_patterns: Default::default(),
        risk,
        reason: reason.to_string(),
    }
}

// ===========================================================================
// Rule matching
// ===========================================================================

#[test]
fn rule_matches_tool_and_arg_patterns() {
    let mut matcher = rule("match-calc", PolicyAction::Allow, "calc", RiskLevel::Low, "");
    matcher
        .arg_patterns
        .insert("expression".to_string(), "2+2".to_string());
    assert!(matcher.matches("calc", &args(&[("expression", json!("2+2"))])));
    assert!(!matcher.matches("calc", &args(&[("expression", json!("3+3"))])));
    assert!(!matcher.matches("repo_grep", &args(&[("expression", json!("2+2"))])));
    assert!(!matcher.matches("calc", &Map::new()));
}

#[test]
fn rule_wildcard_matches_any_tool() {
    let matcher = rule("any", PolicyAction::Monitor, "*", RiskLevel::Low, "");
    assert!(matcher.matches("calc", &Map::new()));
    assert!(matcher.matches("http_get", &Map::new()));
}

#[test]
fn rule_matches_substring_of_stringified_value() {
    let mut matcher = rule("urls", PolicyAction::Deny, "http_get", RiskLevel::High, "");
    matcher
        .arg_patterns
        .insert("url".to_string(), "example.com".to_string());
    assert!(matcher.matches("http_get", &args(&[("url", json!("https://example.com/x"))])));
    assert!(!matcher.matches("http_get", &args(&[("url", json!("https://other.io"))])));
}

// ===========================================================================
// Engine evaluation
// ===========================================================================

#[test]
fn default_action_applies_without_rules() {
    let engine = PolicyEngine::new(PolicyConfig::default());
    let decision = engine.evaluate("calc", &args(&[("expression", json!("1+1"))]));
    assert!(decision.allowed);
    assert_eq!(decision.action, PolicyAction::Allow);
    assert_eq!(decision.reason, "Default policy applied");
    assert!(decision.matched_rules.is_empty());
}

#[test]
fn deny_rule_raises_violation() {
    let config = PolicyConfig {
        rules: vec![rule(
            "deny-network",
            PolicyAction::Deny,
            "http_get",
            RiskLevel::High,
            "No network",
        )],
        ..Default::default()
    };
    let engine = PolicyEngine::new(config);
    let violation = engine
        .enforce("http_get", &args(&[("url", json!("https://example.com"))]))
        .unwrap_err();
    assert_eq!(violation.decision.action, PolicyAction::Deny);
    assert_eq!(violation.decision.risk, RiskLevel::High);
    assert_eq!(violation.decision.reason, "No network");
}

#[test]
fn monitor_allows_and_records() {
    let config = PolicyConfig {
        default_action: PolicyAction::Deny,
        rules: vec![rule(
            "monitor-file",
            PolicyAction::Monitor,
            "file_read",
            RiskLevel::Medium,
            "Monitor file access",
        )],
        ..Default::default()
    };
    let engine = PolicyEngine::new(config);
    let decision = engine
        .enforce("file_read", &args(&[("path", json!("demo.txt"))]))
        .unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.action, PolicyAction::Monitor);
}

#[test]
fn last_matching_rule_wins() {
    let config = PolicyConfig {
        rules: vec![
            rule("first", PolicyAction::Deny, "calc", RiskLevel::High, "deny it"),
            rule("second", PolicyAction::Allow, "*", RiskLevel::Low, "allow all"),
            rule("third", PolicyAction::Monitor, "calc", RiskLevel::Medium, "watch it"),
        ],
        ..Default::default()
    };
    let engine = PolicyEngine::new(config);
    let decision = engine.evaluate("calc", &Map::new());
    assert_eq!(decision.action, PolicyAction::Monitor);
    assert_eq!(decision.risk, RiskLevel::Medium);
    assert_eq!(decision.reason, "watch it");
    assert_eq!(decision.matched_rules, vec!["third".to_string()]);
}

#[test]
fn config_parses_from_json_with_defaults() {
    let payload = json!({
        "description": "test policy",
        "default_action": "deny",
        "default_risk": "medium",
        "rules": [
            {"name": "allow-calc", "action": "allow", "tool": "calc"},
            {"name": "deny-urls", "action": "deny", "tool": "http_get",
             "arg_patterns": {"url": "internal"}, "risk": "high", "reason": "blocked"}
        ]
    });
    let config: PolicyConfig = serde_json::from_value(payload).unwrap();
    assert_eq!(config.default_action, PolicyAction::Deny);
    assert_eq!(config.rules.len(), 2);
    assert_eq!(config.rules[0].risk, RiskLevel::Low);
    assert_eq!(config.rules[1].arg_patterns["url"], "internal");
}

// ===========================================================================
// Report + auditor
// ===========================================================================

#[test]
fn report_serializes_summary_counts() {
    let ws = test_workspace();
    let config = PolicyConfig {
        rules: vec![rule(
            "deny-network",
            PolicyAction::Deny,
            "http_get",
            RiskLevel::High,
            "blocked",
        )],
        ..Default::default()
    };
    let engine = PolicyEngine::new(config);
    engine.attach_trace("trace-1");
    engine.evaluate("calc", &Map::new());
    let _ = engine.enforce("http_get", &Map::new());
    let path = ws.join("policy.json");
    engine.report().write_json(&path).unwrap();
    let payload: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(payload["trace_id"], "trace-1");
    assert_eq!(payload["summary"]["decisions"], 2);
    assert_eq!(payload["summary"]["allowed"], 1);
    assert_eq!(payload["summary"]["denied"], 1);
    cleanup(&ws);
}

#[test]
fn auditor_filters_high_risk_and_denied() {
    let config = PolicyConfig {
        rules: vec![rule(
            "deny-network",
            PolicyAction::Deny,
            "http_get",
            RiskLevel::High,
            "blocked",
        )],
        ..Default::default()
    };
    let engine = PolicyEngine::new(config);
    let _ = engine.enforce("http_get", &Map::new());
    engine.evaluate("calc", &Map::new());
    let report = engine.report();
    let auditor = PolicyAuditor::new(report.decisions);
    assert_eq!(auditor.high_risk().len(), 1);
    assert_eq!(auditor.denied().len(), 1);
    assert_eq!(auditor.high_risk()[0].tool_name, "http_get");
}

// ===========================================================================
// Policy-wrapped registry
// ===========================================================================

#[tokio::test]
async fn wrapped_registry_passes_specs_through() {
    let base = Arc::new(build_registry());
    let policy = Arc::new(PolicyEngine::new(PolicyConfig::default()));
    let wrapped = PolicyToolRegistry::new(base.clone(), policy);
    assert_eq!(wrapped.specs().len(), base.specs().len());
}

#[tokio::test]
async fn wrapped_registry_denies_before_invoking() {
    let ws = test_workspace();
    let config = PolicyConfig {
        rules: vec![rule(
            "deny-http",
            PolicyAction::Deny,
            "http_get",
            RiskLevel::High,
            "Network access blocked by policy",
        )],
        ..Default::default()
    };
    let policy = Arc::new(PolicyEngine::new(config));
    let wrapped = PolicyToolRegistry::new(Arc::new(build_registry()), policy.clone());
    let ctx = ToolContext::new(&ws, true, "t-policy");
    let result = wrapped
        .invoke("http_get", &args(&[("url", json!("https://example.com"))]), &ctx)
        .await;
    match result {
        Err(ToolError::Denied(message)) => {
            assert!(message.contains("Policy denied tool 'http_get'"));
            assert!(message.contains("Network access blocked by policy"));
        }
        other => panic!("expected Denied, got {other:?}"),
    }
    assert_eq!(policy.report().decisions.len(), 1);
    cleanup(&ws);
}

#[tokio::test]
async fn wrapped_registry_allows_monitored_calls() {
    let ws = test_workspace();
    let config = PolicyConfig {
        rules: vec![rule(
            "monitor-calc",
            PolicyAction::Monitor,
            "calc",
            RiskLevel::Low,
            "watch arithmetic",
        )],
        ..Default::default()
    };
    let policy = Arc::new(PolicyEngine::new(config));
    let wrapped = PolicyToolRegistry::new(Arc::new(build_registry()), policy.clone());
    let ctx = ToolContext::new(&ws, false, "t-monitor");
    let result = wrapped
        .invoke("calc", &args(&[("expression", json!("2+2"))]), &ctx)
        .await
        .unwrap();
    assert_eq!(result, json!("4"));
    let report = policy.report();
    assert_eq!(report.decisions.len(), 1);
    assert!(report.decisions[0].allowed);
    cleanup(&ws);
}
