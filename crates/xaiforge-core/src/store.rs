//! Append-only trace store and reader
//!
//! One JSONL log per trace under `<base_dir>/traces/`, flushed per event.
//! The store owns the file handle and the rolling hasher for its lifetime;
//! the hasher is updated for every event except `run_end`. Manifests are
//! written atomically (write-then-rename) so readers never observe a torn
//! manifest.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::events::{Event, RollingHasher};

/// Summary written when a trace is sealed. Readers tolerate extra fields.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TraceManifest {
    pub trace_id: String,
    pub started_at: String,
    pub ended_at: String,
    pub root_dir: String,
    pub provider: String,
    pub task: String,
    pub final_hash: String,
    pub event_count: u64,
}

pub struct TraceStore {
    base_dir: PathBuf,
    trace_id: String,
    path: PathBuf,
    file: File,
    hasher: RollingHasher,
    event_count: u64,
}

impl TraceStore {
    /// Create `<base_dir>/traces/<trace_id>.jsonl` truncated for writing.
    pub fn open(base_dir: &Path, trace_id: &str) -> Result<Self> {
        let trace_dir = base_dir.join("traces");
        fs::create_dir_all(&trace_dir)?;
        let path = trace_dir.join(format!("{trace_id}.jsonl"));
        let file = File::create(&path)?;
        debug!(trace_id, path = %path.display(), "trace store opened");
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            trace_id: trace_id.to_string(),
            path,
            file,
            hasher: RollingHasher::new(),
            event_count: 0,
        })
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of events persisted so far.
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Rolling hash over everything persisted so far except `run_end` lines.
    pub fn final_hash(&self) -> String {
        self.hasher.hexdigest()
    }

    /// Serialize, persist and flush one event. The hasher is only updated
    /// when the event is not `run_end`.
    pub fn write_event(&mut self, event: &Event) -> Result<()> {
        let line = event.to_json_line()?;
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.file.flush()?;
        if !event.is_run_end() {
            self.hasher.update(&line);
        }
        self.event_count += 1;
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    /// Write `<trace_id>.manifest.json` atomically.
    pub fn write_manifest(&self, manifest: &TraceManifest) -> Result<()> {
        let trace_dir = self.base_dir.join("traces");
        let tmp = trace_dir.join(format!("{}.manifest.json.tmp", self.trace_id));
        let target = trace_dir.join(format!("{}.manifest.json", self.trace_id));
        fs::write(&tmp, serde_json::to_string_pretty(manifest)?)?;
        fs::rename(&tmp, &target)?;
        Ok(())
    }

    pub fn write_report(&self, markdown: &str) -> Result<()> {
        let report_path = self
            .base_dir
            .join("traces")
            .join(format!("{}.report.md", self.trace_id));
        fs::write(report_path, markdown)?;
        Ok(())
    }
}

pub struct TraceReader {
    base_dir: PathBuf,
    trace_id: String,
    path: PathBuf,
    manifest_path: PathBuf,
}

impl TraceReader {
    pub fn new(base_dir: &Path, trace_id: &str) -> Self {
        let trace_dir = base_dir.join("traces");
        Self {
            base_dir: base_dir.to_path_buf(),
            trace_id: trace_id.to_string(),
            path: trace_dir.join(format!("{trace_id}.jsonl")),
            manifest_path: trace_dir.join(format!("{trace_id}.manifest.json")),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Lazy iterator over raw event lines. Empty lines are skipped and a
    /// torn tail (crashed writer) terminates the iteration silently.
    pub fn iter_events(&self) -> Result<impl Iterator<Item = String>> {
        let file = File::open(&self.path)
            .map_err(|_| Error::not_found(format!("trace log {}", self.path.display())))?;
        let reader = BufReader::new(file);
        Ok(reader
            .lines()
            .map_while(|line| line.ok())
            .filter(|line| !line.trim().is_empty()))
    }

    /// Parsed event payloads, skipping lines that are not valid JSON.
    pub fn read_values(&self) -> Result<Vec<serde_json::Value>> {
        Ok(self
            .iter_events()?
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect())
    }

    pub fn load_manifest(&self) -> Result<TraceManifest> {
        let raw = fs::read_to_string(&self.manifest_path)
            .map_err(|_| Error::not_found(format!("manifest {}", self.manifest_path.display())))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// A manifest augmented with fields derived from its event log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManifestSummary {
    #[serde(flatten)]
    pub manifest: TraceManifest,
    pub tool_call_count: u64,
    pub error_count: u64,
    pub duration_s: f64,
}

/// Load every manifest under `<base_dir>/traces/`, derive tool-call/error
/// counts and duration, and sort by `started_at` descending.
pub fn list_manifests(base_dir: &Path) -> Vec<ManifestSummary> {
    let trace_dir = base_dir.join("traces");
    let entries = match fs::read_dir(&trace_dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    let mut summaries: Vec<ManifestSummary> = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(trace_id) = name.strip_suffix(".manifest.json") else {
            continue;
        };
        let reader = TraceReader::new(base_dir, trace_id);
        let Ok(manifest) = reader.load_manifest() else {
            continue;
        };
        let (mut tool_call_count, mut error_count) = (0u64, 0u64);
        if let Ok(values) = reader.read_values() {
            for value in values {
                match value.get("type").and_then(|t| t.as_str()) {
                    Some("tool_call") => tool_call_count += 1,
                    Some("tool_error") => error_count += 1,
                    _ => {}
                }
            }
        }
        let duration_s = duration_seconds(&manifest.started_at, &manifest.ended_at);
        summaries.push(ManifestSummary {
            manifest,
            tool_call_count,
            error_count,
            duration_s,
        });
    }
    summaries.sort_by(|a, b| b.manifest.started_at.cmp(&a.manifest.started_at));
    summaries
}

/// Seconds between two ISO-8601 timestamps, 0.0 when either fails to parse.
pub fn duration_seconds(started_at: &str, ended_at: &str) -> f64 {
    let parse = |value: &str| chrono::DateTime::parse_from_rfc3339(value).ok();
    match (parse(started_at), parse(ended_at)) {
        (Some(start), Some(end)) => {
            let micros = (end - start).num_microseconds().unwrap_or(0);
            micros as f64 / 1_000_000.0
        }
        _ => 0.0,
    }
}
