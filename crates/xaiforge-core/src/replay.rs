//! Replay verification - recompute the rolling hash and compare
//!
//! Integrity mismatch is a reported condition, not an error: the result
//! carries `integrity_ok` and both hashes so callers can render a diff.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::events::RollingHasher;
use crate::store::TraceReader;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplayResult {
    pub trace_id: String,
    pub integrity_ok: bool,
    pub expected_hash: String,
    pub computed_hash: String,
    pub event_count: u64,
}

/// Resolve `latest` to the most recently modified manifest.
pub fn resolve_latest(root: &Path) -> Result<String> {
    let trace_dir = root.join("traces");
    let entries =
        fs::read_dir(&trace_dir).map_err(|_| Error::not_found("no traces found for replay"))?;
    let mut newest: Option<(std::time::SystemTime, String)> = None;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(trace_id) = name.strip_suffix(".manifest.json") else {
            continue;
        };
        let Ok(meta) = entry.metadata() else { continue };
        let Ok(mtime) = meta.modified() else { continue };
        match &newest {
            Some((best, _)) if *best >= mtime => {}
            _ => newest = Some((mtime, trace_id.to_string())),
        }
    }
    newest
        .map(|(_, trace_id)| trace_id)
        .ok_or_else(|| Error::not_found("no traces found for replay"))
}

/// Recompute the rolling hash over every line except `run_end` and compare
/// it with the manifest's `final_hash`. `trace_id = "latest"` resolves to
/// the most recently sealed trace. Calling this twice yields identical
/// results; the log is never rewritten.
pub fn verify_trace(root: &Path, trace_id: &str) -> Result<ReplayResult> {
    let trace_id = if trace_id == "latest" {
        resolve_latest(root)?
    } else {
        trace_id.to_string()
    };
    let reader = TraceReader::new(root, &trace_id);
    let manifest = reader.load_manifest()?;
    let mut hasher = RollingHasher::new();
    let mut event_count = 0u64;
    for line in reader.iter_events()? {
        let is_run_end = serde_json::from_str::<serde_json::Value>(&line)
            .ok()
            .and_then(|value| value.get("type").map(|t| t == "run_end"))
            .unwrap_or(false);
        if !is_run_end {
            hasher.update(&line);
        }
        event_count += 1;
    }
    let computed_hash = hasher.hexdigest();
    let integrity_ok = computed_hash == manifest.final_hash;
    Ok(ReplayResult {
        trace_id,
        integrity_ok,
        expected_hash: manifest.final_hash,
        computed_hash,
        event_count,
    })
}
