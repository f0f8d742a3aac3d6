//! Per-trace bench report written alongside the trace artifacts

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::store::TraceManifest;

#[derive(Clone, Debug, Serialize)]
pub struct BenchReport {
    pub trace_id: String,
    pub task: String,
    pub provider: String,
    pub status: String,
    pub tool_calls: u64,
    pub errors: u64,
    pub duration_s: f64,
    pub summary: String,
    pub plan: Vec<String>,
}

impl BenchReport {
    pub fn to_markdown(&self) -> String {
        let mut lines = vec![
            format!("# Bench Report: {}", self.trace_id),
            String::new(),
            "## Overview".to_string(),
            format!("- Task: {}", self.task),
            format!("- Provider: {}", self.provider),
            format!("- Status: {}", self.status),
            format!("- Tool calls: {}", self.tool_calls),
            format!("- Errors: {}", self.errors),
            format!("- Duration (s): {}", self.duration_s),
            String::new(),
            "## Plan".to_string(),
        ];
        if self.plan.is_empty() {
            lines.push("No plan steps recorded.".to_string());
        } else {
            for (idx, step) in self.plan.iter().enumerate() {
                lines.push(format!("{}. {}", idx + 1, step));
            }
        }
        lines.extend([
            String::new(),
            "## Summary".to_string(),
            self.summary.clone(),
            String::new(),
        ]);
        lines.join("\n")
    }
}

pub fn build_bench_report(manifest: &TraceManifest, events: &[Value]) -> BenchReport {
    let mut plan: Vec<String> = Vec::new();
    let mut summary = String::new();
    let mut status = String::new();
    let (mut tool_calls, mut errors) = (0u64, 0u64);
    for event in events {
        match event.get("type").and_then(|t| t.as_str()) {
            Some("plan") => {
                plan = event
                    .get("steps")
                    .and_then(|s| s.as_array())
                    .map(|steps| {
                        steps
                            .iter()
                            .filter_map(|step| step.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
            }
            Some("tool_call") => tool_calls += 1,
            Some("tool_error") => errors += 1,
            Some("run_end") => {
                summary = event
                    .get("summary")
                    .and_then(|s| s.as_str())
                    .unwrap_or("")
                    .to_string();
                status = event
                    .get("status")
                    .and_then(|s| s.as_str())
                    .unwrap_or("")
                    .to_string();
            }
            _ => {}
        }
    }
    BenchReport {
        trace_id: manifest.trace_id.clone(),
        task: manifest.task.clone(),
        provider: manifest.provider.clone(),
        status,
        tool_calls,
        errors,
        duration_s: crate::store::duration_seconds(&manifest.started_at, &manifest.ended_at),
        summary,
        plan,
    }
}

/// Write `bench/<trace_id>.md`, `bench/<trace_id>.json` and `bench/latest.md`.
pub fn write_bench_report(
    base_dir: &Path,
    manifest: &TraceManifest,
    events: &[Value],
) -> Result<PathBuf> {
    let report = build_bench_report(manifest, events);
    let bench_dir = base_dir.join("bench");
    fs::create_dir_all(&bench_dir)?;
    let markdown = report.to_markdown();
    let report_path = bench_dir.join(format!("{}.md", report.trace_id));
    fs::write(&report_path, &markdown)?;
    fs::write(bench_dir.join("latest.md"), &markdown)?;
    fs::write(
        bench_dir.join(format!("{}.json", report.trace_id)),
        serde_json::to_string_pretty(&report)?,
    )?;
    Ok(report_path)
}
