//! End-to-end tests for xaiforge-agent: trace recording, hashing, plugins,
//! policy enforcement, streaming, cancellation and replay

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use xaiforge_agent::plugins::{Plugin, PluginContext, PluginError};
use xaiforge_agent::{AgentRunner, EventPipeline, EventSink, RunError, RunSpec};
use xaiforge_core::{verify_trace, Event, Role, TraceReader, TraceStore};

// Env-touching tests (policy file, metrics flag) share process state, so
// every runner test serializes on this lock.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn env_guard() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

fn test_base() -> PathBuf {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "xaiforge-agent-test-{}-{}",
        std::process::id(),
        id
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn cleanup(dir: &Path) {
    let _ = std::fs::remove_dir_all(dir);
}

fn spec_with_root(task: &str, base: &Path) -> RunSpec {
    let root = base.join("workspace");
    std::fs::create_dir_all(&root).unwrap();
    RunSpec {
        task: task.to_string(),
        provider: "heuristic".to_string(),
        root,
        allow_net: false,
        plugins: Vec::new(),
    }
}

fn read_lines(base: &Path, trace_id: &str) -> Vec<String> {
    TraceReader::new(base, trace_id)
        .iter_events()
        .unwrap()
        .collect()
}

fn event_types(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .map(|line| {
            serde_json::from_str::<Value>(line).unwrap()["type"]
                .as_str()
                .unwrap()
                .to_string()
        })
        .collect()
}

// ===========================================================================
// S1 - arithmetic heuristic run
// ===========================================================================

#[tokio::test]
async fn arithmetic_run_produces_expected_event_sequence() {
    let _guard = env_guard();
    let base = test_base();
    let runner = AgentRunner::new(&base);
    let manifest = runner
        .run_task(&spec_with_root("Compute 2+3*4", &base))
        .await
        .unwrap();
    let lines = read_lines(&base, &manifest.trace_id);
    assert_eq!(
        event_types(&lines),
        vec![
            "run_start",
            "plan",
            "message",
            "tool_call",
            "tool_result",
            "message",
            "run_end"
        ]
    );
    let call: Value = serde_json::from_str(&lines[3]).unwrap();
    assert_eq!(call["tool_name"], "calc");
    assert_eq!(call["arguments"]["expression"], "2+3*4");
    let result: Value = serde_json::from_str(&lines[4]).unwrap();
    assert_eq!(result["result"]["value"], "14");
    let run_end: Value = serde_json::from_str(&lines[6]).unwrap();
    assert_eq!(run_end["status"], "ok");
    assert!(run_end["summary"]
        .as_str()
        .unwrap()
        .contains("Computed result: 14"));
    cleanup(&base);
}

#[tokio::test]
async fn manifest_hash_covers_all_lines_except_run_end() {
    let _guard = env_guard();
    let base = test_base();
    let runner = AgentRunner::new(&base);
    let manifest = runner
        .run_task(&spec_with_root("Compute 2+3*4", &base))
        .await
        .unwrap();
    let lines = read_lines(&base, &manifest.trace_id);
    let mut hasher = Sha256::new();
    for line in &lines[..lines.len() - 1] {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    assert_eq!(manifest.final_hash, hex::encode(hasher.finalize()));
    cleanup(&base);
}

#[tokio::test]
async fn event_count_includes_run_end_everywhere() {
    let _guard = env_guard();
    let base = test_base();
    let runner = AgentRunner::new(&base);
    let manifest = runner
        .run_task(&spec_with_root("Compute 2+3*4", &base))
        .await
        .unwrap();
    let lines = read_lines(&base, &manifest.trace_id);
    assert_eq!(manifest.event_count, lines.len() as u64);
    let run_end: Value = serde_json::from_str(lines.last().unwrap()).unwrap();
    assert_eq!(run_end["event_count"], manifest.event_count);
    assert_eq!(run_end["final_hash"], json!(manifest.final_hash));
    cleanup(&base);
}

#[tokio::test]
async fn tool_results_reference_their_call_span() {
    let _guard = env_guard();
    let base = test_base();
    let runner = AgentRunner::new(&base);
    let manifest = runner
        .run_task(&spec_with_root("Compute 2+3*4", &base))
        .await
        .unwrap();
    let lines = read_lines(&base, &manifest.trace_id);
    let call: Value = serde_json::from_str(&lines[3]).unwrap();
    let result: Value = serde_json::from_str(&lines[4]).unwrap();
    assert_eq!(result["parent_span_id"], call["span_id"]);
    cleanup(&base);
}

#[tokio::test]
async fn run_start_first_run_end_last() {
    let _guard = env_guard();
    let base = test_base();
    let runner = AgentRunner::new(&base);
    let manifest = runner
        .run_task(&spec_with_root("Say hello", &base))
        .await
        .unwrap();
    let types = event_types(&read_lines(&base, &manifest.trace_id));
    assert_eq!(types.first().map(String::as_str), Some("run_start"));
    assert_eq!(types.last().map(String::as_str), Some("run_end"));
    assert_eq!(types.iter().filter(|t| *t == "run_start").count(), 1);
    assert_eq!(types.iter().filter(|t| *t == "run_end").count(), 1);
    cleanup(&base);
}

// ===========================================================================
// Heuristic branches
// ===========================================================================

#[tokio::test]
async fn plain_task_answers_directly() {
    let _guard = env_guard();
    let base = test_base();
    let runner = AgentRunner::new(&base);
    let manifest = runner
        .run_task(&spec_with_root("Say hello", &base))
        .await
        .unwrap();
    let lines = read_lines(&base, &manifest.trace_id);
    let run_end: Value = serde_json::from_str(lines.last().unwrap()).unwrap();
    assert!(run_end["summary"]
        .as_str()
        .unwrap()
        .contains("No specialized tool needed"));
    cleanup(&base);
}

#[tokio::test]
async fn search_task_counts_repo_matches() {
    let _guard = env_guard();
    let base = test_base();
    let spec = spec_with_root("Search the repo for 'needle'", &base);
    std::fs::write(spec.root.join("notes.md"), "a needle\nanother needle\n").unwrap();
    let runner = AgentRunner::new(&base);
    let manifest = runner.run_task(&spec).await.unwrap();
    let lines = read_lines(&base, &manifest.trace_id);
    let types = event_types(&lines);
    assert!(types.contains(&"tool_call".to_string()));
    let run_end: Value = serde_json::from_str(lines.last().unwrap()).unwrap();
    assert!(run_end["summary"]
        .as_str()
        .unwrap()
        .contains("Found 2 matches in repo."));
    cleanup(&base);
}

#[tokio::test]
async fn caret_arithmetic_yields_tool_error_and_ok_run() {
    let _guard = env_guard();
    let base = test_base();
    let runner = AgentRunner::new(&base);
    let manifest = runner
        .run_task(&spec_with_root("Compute 4^6", &base))
        .await
        .unwrap();
    let lines = read_lines(&base, &manifest.trace_id);
    let types = event_types(&lines);
    assert!(types.contains(&"tool_error".to_string()));
    let run_end: Value = serde_json::from_str(lines.last().unwrap()).unwrap();
    assert_eq!(run_end["status"], "ok");
    cleanup(&base);
}

// ===========================================================================
// Streaming
// ===========================================================================

#[tokio::test]
async fn stream_run_forwards_every_persisted_line() {
    let _guard = env_guard();
    let base = test_base();
    let runner = AgentRunner::new(&base);
    let mut forwarded: Vec<String> = Vec::new();
    let mut collect = |line: &str| forwarded.push(line.to_string());
    let spec = spec_with_root("Compute 2+2", &base);
    let manifest = runner.stream_run(&spec, &mut collect).await.unwrap();
    let lines = read_lines(&base, &manifest.trace_id);
    assert_eq!(forwarded, lines);
    let trace_dir = base.join("traces");
    assert!(trace_dir
        .join(format!("{}.manifest.json", manifest.trace_id))
        .exists());
    assert!(trace_dir
        .join(format!("{}.report.md", manifest.trace_id))
        .exists());
    assert!(base
        .join("bench")
        .join(format!("{}.md", manifest.trace_id))
        .exists());
    cleanup(&base);
}

// ===========================================================================
// Replay and integrity
// ===========================================================================

#[tokio::test]
async fn replay_confirms_integrity_and_is_idempotent() {
    let _guard = env_guard();
    let base = test_base();
    let runner = AgentRunner::new(&base);
    let manifest = runner
        .run_task(&spec_with_root("Compute 2+3*4", &base))
        .await
        .unwrap();
    let mut seen = 0usize;
    let mut count_lines = |_line: &str| seen += 1;
    let end = runner
        .replay_trace(&manifest.trace_id, &mut count_lines)
        .await
        .unwrap();
    let Event::RunEnd {
        integrity_ok,
        event_count,
        ..
    } = &end
    else {
        panic!("expected run_end event");
    };
    assert_eq!(*integrity_ok, Some(true));
    assert_eq!(*event_count, Some(manifest.event_count));
    // Replayed lines plus the synthesized terminal event.
    assert_eq!(seen as u64, manifest.event_count + 1);

    let verification = verify_trace(&base, &manifest.trace_id).unwrap();
    assert!(verification.integrity_ok);
    let again = verify_trace(&base, &manifest.trace_id).unwrap();
    assert_eq!(verification.computed_hash, again.computed_hash);
    cleanup(&base);
}

#[tokio::test]
async fn replay_flags_tampered_trace() {
    let _guard = env_guard();
    let base = test_base();
    let runner = AgentRunner::new(&base);
    let manifest = runner
        .run_task(&spec_with_root("Compute 2+3*4", &base))
        .await
        .unwrap();
    let path = base
        .join("traces")
        .join(format!("{}.jsonl", manifest.trace_id));
    let tampered = std::fs::read_to_string(&path)
        .unwrap()
        .replace("2+3*4", "9+9*9");
    std::fs::write(&path, tampered).unwrap();
    let mut sink = |_line: &str| {};
    let end = runner
        .replay_trace(&manifest.trace_id, &mut sink)
        .await
        .unwrap();
    let Event::RunEnd { integrity_ok, .. } = &end else {
        panic!("expected run_end event");
    };
    assert_eq!(*integrity_ok, Some(false));
    cleanup(&base);
}

// ===========================================================================
// S2 - policy-denied tool
// ===========================================================================

#[tokio::test]
async fn policy_denial_becomes_tool_error_and_run_stays_ok() {
    let _guard = env_guard();
    let base = test_base();
    let policy_path = base.join("policy.json");
    std::fs::write(
        &policy_path,
        json!({
            "default_action": "allow",
            "rules": [
                {"name": "deny-calc", "action": "deny", "tool": "calc",
                 "risk": "high", "reason": "Arithmetic blocked by policy"}
            ]
        })
        .to_string(),
    )
    .unwrap();
    std::env::set_var("XAIFORGE_POLICY_FILE", &policy_path);
    let runner = AgentRunner::new(&base);
    let manifest = runner
        .run_task(&spec_with_root("Compute 2+3*4", &base))
        .await
        .unwrap();
    std::env::remove_var("XAIFORGE_POLICY_FILE");

    let lines = read_lines(&base, &manifest.trace_id);
    let error_line = lines
        .iter()
        .find(|line| line.contains("tool_error"))
        .expect("tool_error event");
    let error: Value = serde_json::from_str(error_line).unwrap();
    assert!(error["error"]
        .as_str()
        .unwrap()
        .contains("Policy denied tool 'calc'"));
    let run_end: Value = serde_json::from_str(lines.last().unwrap()).unwrap();
    assert_eq!(run_end["status"], "ok");
    // The policy report is written next to the trace artifacts.
    let report_path = base
        .join("policy")
        .join(format!("{}.json", manifest.trace_id));
    let report: Value =
        serde_json::from_str(&std::fs::read_to_string(report_path).unwrap()).unwrap();
    assert_eq!(report["trace_id"], json!(manifest.trace_id));
    assert_eq!(report["summary"]["denied"], 1);
    cleanup(&base);
}

#[tokio::test]
async fn missing_policy_file_fails_the_run() {
    let _guard = env_guard();
    let base = test_base();
    std::env::set_var("XAIFORGE_POLICY_FILE", base.join("absent.json"));
    let runner = AgentRunner::new(&base);
    let result = runner.run_task(&spec_with_root("Compute 2+2", &base)).await;
    std::env::remove_var("XAIFORGE_POLICY_FILE");
    assert!(matches!(result, Err(RunError::Policy(_))));
    cleanup(&base);
}

// ===========================================================================
// S5 - redaction plugin
// ===========================================================================

#[tokio::test]
async fn redactor_scrubs_emails_and_tokens() {
    let _guard = env_guard();
    let base = test_base();
    let mut spec = spec_with_root(
        "Contact me at jane.doe@example.com with token sk-12345678901234567890",
        &base,
    );
    spec.plugins = vec!["redactor".to_string()];
    let runner = AgentRunner::new(&base);
    let manifest = runner.run_task(&spec).await.unwrap();
    let raw = std::fs::read_to_string(
        base.join("traces")
            .join(format!("{}.jsonl", manifest.trace_id)),
    )
    .unwrap();
    assert!(!raw.contains("jane.doe@example.com"));
    assert!(!raw.contains("sk-12345678901234567890"));
    assert!(raw.contains("[redacted-email]"));
    assert!(raw.contains("[redacted-token]"));
    cleanup(&base);
}

// ===========================================================================
// Metrics plugin and run metrics
// ===========================================================================

#[tokio::test]
async fn metrics_collector_writes_per_trace_file() {
    let _guard = env_guard();
    let base = test_base();
    let mut spec = spec_with_root("Compute 2+3*4", &base);
    spec.plugins = vec!["metrics_collector".to_string()];
    let runner = AgentRunner::new(&base);
    let manifest = runner.run_task(&spec).await.unwrap();
    let metrics_path = base
        .join("traces")
        .join(format!("{}.metrics.json", manifest.trace_id));
    let payload: Value =
        serde_json::from_str(&std::fs::read_to_string(metrics_path).unwrap()).unwrap();
    assert_eq!(payload["trace_id"], json!(manifest.trace_id));
    assert_eq!(payload["event_counts"]["tool_call"], 1);
    assert_eq!(payload["tool_calls"]["calc"], 1);
    assert_eq!(payload["status"], "ok");
    cleanup(&base);
}

#[tokio::test]
async fn run_metrics_file_written_when_enabled() {
    let _guard = env_guard();
    let base = test_base();
    std::env::set_var("XAIFORGE_ENABLE_METRICS", "1");
    let runner = AgentRunner::new(&base);
    let manifest = runner
        .run_task(&spec_with_root("Compute 2+2", &base))
        .await
        .unwrap();
    std::env::remove_var("XAIFORGE_ENABLE_METRICS");
    let path = base
        .join("metrics")
        .join(format!("{}.json", manifest.trace_id));
    let payload = std::fs::read_to_string(path).unwrap();
    assert!(payload.contains("events.total"));
    assert!(payload.contains(&manifest.trace_id));
    cleanup(&base);
}

#[tokio::test]
async fn unknown_plugin_is_rejected() {
    let _guard = env_guard();
    let base = test_base();
    let mut spec = spec_with_root("Compute 2+2", &base);
    spec.plugins = vec!["nope".to_string()];
    let runner = AgentRunner::new(&base);
    assert!(matches!(
        runner.run_task(&spec).await,
        Err(RunError::UnknownPlugin(_))
    ));
    cleanup(&base);
}

#[tokio::test]
async fn unknown_provider_is_rejected() {
    let _guard = env_guard();
    let base = test_base();
    let mut spec = spec_with_root("Compute 2+2", &base);
    spec.provider = "martian".to_string();
    let runner = AgentRunner::new(&base);
    assert!(matches!(
        runner.run_task(&spec).await,
        Err(RunError::UnknownProvider(_))
    ));
    cleanup(&base);
}

// ===========================================================================
// Cancellation
// ===========================================================================

#[tokio::test]
async fn cancelled_run_still_seals_the_trace() {
    let _guard = env_guard();
    let base = test_base();
    let runner = AgentRunner::new(&base);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let manifest = runner
        .run_task_cancellable(&spec_with_root("Compute 2+3*4", &base), cancel)
        .await
        .unwrap();
    let lines = read_lines(&base, &manifest.trace_id);
    let run_end: Value = serde_json::from_str(lines.last().unwrap()).unwrap();
    assert_eq!(run_end["status"], "error");
    assert!(run_end["summary"].as_str().unwrap().contains("cancelled"));
    let verification = verify_trace(&base, &manifest.trace_id).unwrap();
    assert!(verification.integrity_ok);
    cleanup(&base);
}

// ===========================================================================
// Plugin failure semantics (pipeline level)
// ===========================================================================

struct ExplodingPlugin;

impl Plugin for ExplodingPlugin {
    fn name(&self) -> &str {
        "exploding"
    }

    fn on_event(&mut self, _ctx: &PluginContext, _event: Event) -> Result<Event, PluginError> {
        Err(PluginError::new("exploding", "hook blew up"))
    }
}

#[tokio::test]
async fn failing_hook_prevents_persistence() {
    let _guard = env_guard();
    let base = test_base();
    let store = TraceStore::open(&base, "t-plugin").unwrap();
    let ctx = PluginContext {
        trace_id: "t-plugin".to_string(),
        base_dir: base.clone(),
        task: "task".to_string(),
        provider: "heuristic".to_string(),
        root: base.clone(),
        started_at: "now".to_string(),
    };
    let mut pipeline =
        EventPipeline::new(store, vec![Box::new(ExplodingPlugin)], ctx, None, None);
    let result = pipeline.emit(Event::message("t-plugin", Role::Assistant, "hi"));
    assert!(result.is_err());
    assert_eq!(pipeline.event_count(), 0);
    let (mut store, _) = pipeline.finish();
    store.close().unwrap();
    let lines = read_lines(&base, "t-plugin");
    assert!(lines.is_empty());
    cleanup(&base);
}
