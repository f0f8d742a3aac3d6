//! Agent runner - buffered, streaming and cancellable run entry points
//!
//! One run owns one trace store. Events flow provider → plugin chain →
//! run metrics → store → optional forward callback, serialized by the
//! pipeline, so the persisted order is the emission order. A store write
//! failure aborts the run and leaves the partial log for inspection; a
//! provider failure is recovered into a final assistant message and a
//! `run_end{status=error}`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use xaiforge_core::events::now_ts;
use xaiforge_core::report::write_bench_report;
use xaiforge_core::run_metrics::RunMetrics;
use xaiforge_core::{Event, Role, RollingHasher, RunStatus, TraceManifest, TraceReader, TraceStore};
use xaiforge_policy::{load_policy_from_env, PolicyEngine, PolicyToolRegistry};
use xaiforge_tools::{build_registry, ToolContext, ToolDispatch};

use crate::observability;
use crate::pipeline::{EmitError, EventPipeline, EventSink, ForwardFn};
use crate::plugins::{load_plugins, PluginContext};
use crate::provider::{ProviderCatalog, ProviderError};

pub const DEFAULT_BASE_DIR: &str = ".xaiforge";

#[derive(Error, Debug)]
pub enum RunError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("{0}")]
    UnknownPlugin(String),

    #[error("policy error: {0}")]
    Policy(String),

    #[error("emit failed: {0}")]
    Emit(String),

    #[error(transparent)]
    Core(#[from] xaiforge_core::Error),
}

#[derive(Clone, Debug)]
pub struct RunSpec {
    pub task: String,
    pub provider: String,
    pub root: PathBuf,
    pub allow_net: bool,
    pub plugins: Vec<String>,
}

impl RunSpec {
    pub fn new(task: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            provider: provider.into(),
            root: PathBuf::from("."),
            allow_net: false,
            plugins: Vec::new(),
        }
    }
}

pub struct AgentRunner {
    base_dir: PathBuf,
    providers: ProviderCatalog,
}

impl AgentRunner {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self::with_catalog(base_dir, ProviderCatalog::builtin())
    }

    pub fn with_catalog(base_dir: impl Into<PathBuf>, providers: ProviderCatalog) -> Self {
        Self {
            base_dir: base_dir.into(),
            providers,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Sortable microsecond-resolution id; bursty generation gets a short
    /// random suffix on collision.
    fn mint_trace_id(&self) -> String {
        let mut trace_id = Utc::now().format("%Y%m%d%H%M%S%6f").to_string();
        let traces = self.base_dir.join("traces");
        while traces.join(format!("{trace_id}.jsonl")).exists() {
            trace_id.push_str(&format!("{:04x}", rand::thread_rng().gen::<u16>()));
        }
        trace_id
    }

    /// Buffered run: returns the manifest once the trace is sealed.
    pub async fn run_task(&self, spec: &RunSpec) -> Result<TraceManifest, RunError> {
        self.run_inner(spec, None, CancellationToken::new()).await
    }

    /// Like `run_task`, but aborts at the next suspension point when the
    /// token fires. A cancelled run still seals the trace with
    /// `run_end{status=error}`.
    pub async fn run_task_cancellable(
        &self,
        spec: &RunSpec,
        cancel: CancellationToken,
    ) -> Result<TraceManifest, RunError> {
        self.run_inner(spec, None, cancel).await
    }

    /// Push variant: every persisted event line is also handed to
    /// `on_event` in emission order.
    pub async fn stream_run(
        &self,
        spec: &RunSpec,
        on_event: ForwardFn<'_>,
    ) -> Result<TraceManifest, RunError> {
        self.run_inner(spec, Some(on_event), CancellationToken::new())
            .await
    }

    async fn run_inner(
        &self,
        spec: &RunSpec,
        forward: Option<ForwardFn<'_>>,
        cancel: CancellationToken,
    ) -> Result<TraceManifest, RunError> {
        observability::configure_from_env();
        let provider = self
            .providers
            .get(&spec.provider)
            .ok_or_else(|| RunError::UnknownProvider(spec.provider.clone()))?;
        let trace_id = self.mint_trace_id();
        let metrics = (std::env::var("XAIFORGE_ENABLE_METRICS").as_deref() == Ok("1"))
            .then(|| RunMetrics::new(&trace_id));
        let store = TraceStore::open(&self.base_dir, &trace_id)?;

        let base_registry: Arc<dyn ToolDispatch> = Arc::new(build_registry());
        let policy: Option<Arc<PolicyEngine>> = load_policy_from_env()
            .map_err(RunError::Policy)?
            .map(Arc::new);
        let tools: Arc<dyn ToolDispatch> = match &policy {
            Some(engine) => {
                engine.attach_trace(&trace_id);
                Arc::new(PolicyToolRegistry::new(base_registry, engine.clone()))
            }
            None => base_registry,
        };
        let ctx = ToolContext::new(&spec.root, spec.allow_net, &trace_id);
        let started_at = now_ts();
        let plugins = load_plugins(&spec.plugins).map_err(RunError::UnknownPlugin)?;
        let plugin_ctx = PluginContext {
            trace_id: trace_id.clone(),
            base_dir: self.base_dir.clone(),
            task: spec.task.clone(),
            provider: spec.provider.clone(),
            root: spec.root.clone(),
            started_at: started_at.clone(),
        };
        let mut pipeline = EventPipeline::new(store, plugins, plugin_ctx, metrics, forward);

        pipeline
            .emit_run_start(Event::run_start(
                &trace_id,
                &spec.task,
                &spec.provider,
                spec.root.display().to_string(),
            ))
            .map_err(|e| match e {
                EmitError::Store(e) => RunError::Core(e),
                EmitError::Plugin(e) => RunError::Emit(e.to_string()),
            })?;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::provider("cancelled")),
            result = provider.run(&spec.task, tools.as_ref(), &ctx, &mut pipeline) => result,
        };
        let (final_answer, status) = match outcome {
            Ok(answer) => (answer, RunStatus::Ok),
            Err(ProviderError::Emit(EmitError::Store(e))) => return Err(RunError::Core(e)),
            Err(error) => {
                let answer = format!("Run failed: {error}");
                match pipeline.emit(Event::message(&trace_id, Role::Assistant, &answer)) {
                    Ok(()) => {}
                    Err(EmitError::Store(e)) => return Err(RunError::Core(e)),
                    Err(EmitError::Plugin(e)) => {
                        warn!("could not persist failure message: {e}");
                    }
                }
                (answer, RunStatus::Error)
            }
        };

        let final_hash = pipeline.final_hash();
        let run_end = Event::run_end(
            &trace_id,
            status,
            &final_answer,
            Some(final_hash.clone()),
            Some(pipeline.event_count() + 1),
        );
        pipeline.emit_run_end(run_end).map_err(|e| match e {
            EmitError::Store(e) => RunError::Core(e),
            EmitError::Plugin(e) => RunError::Emit(e.to_string()),
        })?;
        let ended_at = now_ts();

        let (mut store, metrics) = pipeline.finish();
        store.close()?;
        let manifest = TraceManifest {
            trace_id: trace_id.clone(),
            started_at,
            ended_at,
            root_dir: spec.root.display().to_string(),
            provider: spec.provider.clone(),
            task: spec.task.clone(),
            final_hash,
            event_count: store.event_count(),
        };
        store.write_manifest(&manifest)?;
        store.write_report(&render_report(&manifest, &final_answer))?;
        if let Some(engine) = &policy {
            let report_path = self.base_dir.join("policy").join(format!("{trace_id}.json"));
            engine
                .report()
                .write_json(&report_path)
                .map_err(|e| RunError::Core(e.into()))?;
        }
        if let Some(metrics) = &metrics {
            metrics.write(&self.base_dir)?;
        }
        let reader = TraceReader::new(&self.base_dir, &trace_id);
        let events = reader.read_values()?;
        write_bench_report(&self.base_dir, &manifest, &events)?;
        info!(trace_id = %manifest.trace_id, ?status, "run sealed");
        Ok(manifest)
    }

    /// Stream the persisted lines of an existing trace through `on_event`,
    /// recomputing the rolling hash, and finish with a synthesized
    /// `run_end` carrying the integrity verdict.
    pub async fn replay_trace(
        &self,
        trace_id: &str,
        on_event: ForwardFn<'_>,
    ) -> Result<Event, RunError> {
        let reader = TraceReader::new(&self.base_dir, trace_id);
        let manifest = reader.load_manifest()?;
        let mut hasher = RollingHasher::new();
        let mut count = 0u64;
        for line in reader.iter_events()? {
            on_event(&line);
            let is_run_end = serde_json::from_str::<serde_json::Value>(&line)
                .ok()
                .and_then(|value| value.get("type").map(|t| t == "run_end"))
                .unwrap_or(false);
            if !is_run_end {
                hasher.update(&line);
            }
            count += 1;
        }
        let computed_hash = hasher.hexdigest();
        let integrity_ok = computed_hash == manifest.final_hash;
        let status = if integrity_ok {
            RunStatus::Ok
        } else {
            RunStatus::Error
        };
        let event = Event::replay_end(
            trace_id,
            status,
            "Replay complete",
            computed_hash,
            count,
            integrity_ok,
        );
        let line = event.to_json_line().map_err(xaiforge_core::Error::from)?;
        on_event(&line);
        Ok(event)
    }
}

fn render_report(manifest: &TraceManifest, final_answer: &str) -> String {
    format!(
        "# Trace {}\n\n\
         - Task: {}\n\
         - Provider: {}\n\
         - Started: {}\n\
         - Ended: {}\n\
         - Events: {}\n\
         - Final hash: `{}`\n\n\
         ## Summary\n\n{}\n",
        manifest.trace_id,
        manifest.task,
        manifest.provider,
        manifest.started_at,
        manifest.ended_at,
        manifest.event_count,
        manifest.final_hash,
        final_answer
    )
}
