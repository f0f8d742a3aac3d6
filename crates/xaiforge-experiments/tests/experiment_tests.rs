//! Tests for xaiforge-experiments: all four modes, comparison scoring,
//! artifacts and gating

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};

use xaiforge_experiments::{
    compare_text, compare_tool_calls, gate_experiment, list_experiments,
    load_experiment_manifest, save_experiment_artifacts, ExperimentConfig, ExperimentError,
    ExperimentMode, ExperimentRequestTemplate, ExperimentRunner, GateThresholds,
};
use xaiforge_gateway::{ModelMessage, ToolCall};

fn test_base() -> PathBuf {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "xaiforge-exp-test-{}-{}",
        std::process::id(),
        id
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn cleanup(dir: &Path) {
    let _ = std::fs::remove_dir_all(dir);
}

fn template() -> ExperimentRequestTemplate {
    ExperimentRequestTemplate::from_messages(vec![ModelMessage::user("test")])
}

fn config(id: &str, mode: ExperimentMode, providers: &[&str]) -> ExperimentConfig {
    ExperimentConfig::create(
        id,
        mode,
        providers.iter().map(|p| p.to_string()).collect(),
        Some(template()),
    )
}

fn tool_call(name: &str, args: &[(&str, &str)]) -> ToolCall {
    let arguments: Map<String, Value> = args
        .iter()
        .map(|(key, value)| (key.to_string(), json!(value)))
        .collect();
    ToolCall {
        name: name.to_string(),
        arguments,
    }
}

// ===========================================================================
// Comparison
// ===========================================================================

#[test]
fn identical_texts_score_one() {
    let diff = compare_text("same answer here", "same answer here");
    assert!((diff.score - 1.0).abs() < 1e-9);
    assert_eq!(diff.summary, "no_diff");
}

#[test]
fn divergent_texts_score_below_one() {
    let diff = compare_text("alpha beta gamma", "alpha delta gamma");
    assert!(diff.score < 1.0);
    assert!(diff.score > 0.0);
    assert!(diff.summary.contains("replace"));
    assert!(diff.summary.contains("beta"));
}

#[test]
fn tool_call_diff_tracks_added_removed_mismatched() {
    let primary = vec![
        tool_call("calc", &[("expression", "1+1")]),
        tool_call("repo_grep", &[("query", "x")]),
    ];
    let secondary = vec![
        tool_call("calc", &[("expression", "2+2")]),
        tool_call("http_get", &[("url", "https://example.com")]),
    ];
    let diff = compare_tool_calls(&primary, &secondary);
    assert_eq!(diff.added, vec!["http_get"]);
    assert_eq!(diff.removed, vec!["repo_grep"]);
    assert_eq!(diff.mismatched.len(), 2);
    assert_eq!(diff.mismatched[0].index, 0);
    assert_eq!(diff.mismatched[0].primary["expression"], "1+1");
    assert_eq!(diff.mismatched[0].secondary["expression"], "2+2");
}

// ===========================================================================
// Modes
// ===========================================================================

#[tokio::test]
async fn ab_runs_both_arms_and_compares() {
    let base = test_base();
    let runner = ExperimentRunner::new(&base);
    let result = runner
        .run(&config("exp_ab", ExperimentMode::Ab, &["mock", "mock"]))
        .await
        .unwrap();
    assert_eq!(result.primary.provider, "mock");
    assert_eq!(result.all_results.len(), 2);
    let comparison = result.comparison.expect("comparison");
    assert!(comparison.stability_score >= 0.9);
    assert!(result.errors.is_empty());
    cleanup(&base);
}

#[tokio::test]
async fn shadow_keeps_secondary_for_comparison() {
    let base = test_base();
    let runner = ExperimentRunner::new(&base);
    let result = runner
        .run(&config("exp_shadow", ExperimentMode::Shadow, &["mock", "mock"]))
        .await
        .unwrap();
    assert!(result.secondary.is_some());
    assert!(result.comparison.is_some());
    cleanup(&base);
}

#[tokio::test]
async fn canary_full_split_runs_both() {
    let base = test_base();
    let runner = ExperimentRunner::new(&base);
    let mut cfg = config("exp_canary", ExperimentMode::Canary, &["mock", "mock"]);
    cfg.traffic_split = 1.0;
    let result = runner.run(&cfg).await.unwrap();
    assert!(result.secondary.is_some());
    assert_eq!(result.all_results.len(), 2);
    cleanup(&base);
}

#[tokio::test]
async fn canary_zero_split_runs_primary_only() {
    let base = test_base();
    let runner = ExperimentRunner::new(&base);
    let mut cfg = config("exp_canary_off", ExperimentMode::Canary, &["mock", "mock"]);
    cfg.traffic_split = 0.0;
    let result = runner.run(&cfg).await.unwrap();
    assert!(result.secondary.is_none());
    assert!(result.comparison.is_none());
    assert_eq!(result.all_results.len(), 1);
    cleanup(&base);
}

#[tokio::test]
async fn fallback_uses_first_successful_provider() {
    let base = test_base();
    let runner = ExperimentRunner::new(&base);
    let result = runner
        .run(&config(
            "exp_fallback",
            ExperimentMode::Fallback,
            &["fail-mock", "mock"],
        ))
        .await
        .unwrap();
    assert_eq!(result.primary.provider, "mock");
    assert!(result.primary.error.is_none());
    assert!(!result.errors.is_empty());
    assert!(result.errors[0].contains("Injected failure"));
    cleanup(&base);
}

#[tokio::test]
async fn fallback_fails_when_every_arm_fails() {
    let base = test_base();
    let runner = ExperimentRunner::new(&base);
    let result = runner
        .run(&config(
            "exp_doomed",
            ExperimentMode::Fallback,
            &["fail-a", "fail-b"],
        ))
        .await;
    assert!(matches!(result, Err(ExperimentError::AllFailed(_))));
    cleanup(&base);
}

#[tokio::test]
async fn single_provider_is_duplicated_for_two_arm_modes() {
    let base = test_base();
    let runner = ExperimentRunner::new(&base);
    let result = runner
        .run(&config("exp_single", ExperimentMode::Ab, &["mock"]))
        .await
        .unwrap();
    assert_eq!(result.all_results.len(), 2);
    cleanup(&base);
}

#[tokio::test]
async fn missing_template_is_a_config_error() {
    let base = test_base();
    let runner = ExperimentRunner::new(&base);
    let mut cfg = config("exp_no_template", ExperimentMode::Ab, &["mock", "mock"]);
    cfg.request_template = None;
    assert!(matches!(
        runner.run(&cfg).await,
        Err(ExperimentError::Config(_))
    ));
    cleanup(&base);
}

// ===========================================================================
// Artifacts + gating
// ===========================================================================

#[tokio::test]
async fn artifacts_round_trip_through_disk() {
    let base = test_base();
    let reports = base.join("reports");
    let runner = ExperimentRunner::new(&base);
    let cfg = config("exp_report", ExperimentMode::Ab, &["mock", "mock"]);
    let result = runner.run(&cfg).await.unwrap();
    let manifest = save_experiment_artifacts(&cfg, &result, &base, &reports).unwrap();
    assert_eq!(manifest.summary.status, "ok");
    assert_eq!(manifest.summary.mode, ExperimentMode::Ab);

    let payload: Value =
        serde_json::from_str(&std::fs::read_to_string(&manifest.report_path).unwrap()).unwrap();
    assert_eq!(payload["experiment_id"], "exp_report");
    assert_eq!(payload["mode"], "ab");
    assert!(base
        .join("experiments")
        .join("exp_report.config.json")
        .exists());
    assert!(reports.join("experiments").join("exp_report.md").exists());

    let loaded = load_experiment_manifest("exp_report", &base).unwrap();
    assert_eq!(loaded.experiment_id, manifest.experiment_id);
    let listed = list_experiments(&base);
    assert_eq!(listed.len(), 1);
    cleanup(&base);
}

#[tokio::test]
async fn gate_accepts_stable_experiment() {
    let base = test_base();
    let reports = base.join("reports");
    let runner = ExperimentRunner::new(&base);
    let cfg = config("exp_gate_ok", ExperimentMode::Ab, &["mock", "mock"]);
    let result = runner.run(&cfg).await.unwrap();
    save_experiment_artifacts(&cfg, &result, &base, &reports).unwrap();
    let summary = gate_experiment("exp_gate_ok", &base, GateThresholds::default()).unwrap();
    assert_eq!(summary.status, "ok");
    cleanup(&base);
}

#[tokio::test]
async fn gate_rejects_high_error_rate() {
    let base = test_base();
    let reports = base.join("reports");
    let runner = ExperimentRunner::new(&base);
    let cfg = config(
        "exp_gate_bad",
        ExperimentMode::Fallback,
        &["fail-mock", "mock"],
    );
    let result = runner.run(&cfg).await.unwrap();
    save_experiment_artifacts(&cfg, &result, &base, &reports).unwrap();
    let error = gate_experiment("exp_gate_bad", &base, GateThresholds::default()).unwrap_err();
    match error {
        ExperimentError::Gate { message, summary } => {
            assert!(message.contains("error rate"));
            assert_eq!(summary.status, "partial");
        }
        other => panic!("expected gate error, got {other}"),
    }
    cleanup(&base);
}

#[tokio::test]
async fn gate_rejects_low_stability() {
    let base = test_base();
    let reports = base.join("reports");
    let runner = ExperimentRunner::new(&base);
    let cfg = config("exp_gate_unstable", ExperimentMode::Ab, &["mock", "mock"]);
    let result = runner.run(&cfg).await.unwrap();
    save_experiment_artifacts(&cfg, &result, &base, &reports).unwrap();
    let thresholds = GateThresholds {
        stability_min: 1.01,
        ..Default::default()
    };
    let error = gate_experiment("exp_gate_unstable", &base, thresholds).unwrap_err();
    assert!(matches!(error, ExperimentError::Gate { .. }));
    cleanup(&base);
}
