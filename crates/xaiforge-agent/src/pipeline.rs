//! The serialized emit path: plugins, run metrics, trace store, forwarding
//!
//! One pipeline per run owns the trace store for the store's whole lifetime,
//! so per-trace event order is exactly emission order. Plugin hooks run
//! synchronously; a hook failure means the event is not persisted and the
//! error propagates to the runner.

use thiserror::Error;
use tracing::warn;

use xaiforge_core::run_metrics::RunMetrics;
use xaiforge_core::{Event, TraceStore};

use crate::plugins::{Plugin, PluginContext, PluginError};

#[derive(Error, Debug)]
pub enum EmitError {
    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Store(#[from] xaiforge_core::Error),
}

/// Anything a provider can push events into.
pub trait EventSink: Send {
    fn emit(&mut self, event: Event) -> Result<(), EmitError>;
}

pub type ForwardFn<'a> = &'a mut (dyn FnMut(&str) + Send);

pub struct EventPipeline<'a> {
    store: TraceStore,
    plugins: Vec<Box<dyn Plugin>>,
    ctx: PluginContext,
    metrics: Option<RunMetrics>,
    forward: Option<ForwardFn<'a>>,
}

impl<'a> EventPipeline<'a> {
    pub fn new(
        store: TraceStore,
        plugins: Vec<Box<dyn Plugin>>,
        ctx: PluginContext,
        metrics: Option<RunMetrics>,
        forward: Option<ForwardFn<'a>>,
    ) -> Self {
        Self {
            store,
            plugins,
            ctx,
            metrics,
            forward,
        }
    }

    pub fn event_count(&self) -> u64 {
        self.store.event_count()
    }

    pub fn final_hash(&self) -> String {
        self.store.final_hash()
    }

    fn apply_event_hooks(&mut self, mut event: Event) -> Result<Event, PluginError> {
        for plugin in &mut self.plugins {
            event = plugin.on_event(&self.ctx, event)?;
        }
        Ok(event)
    }

    fn record_and_write(&mut self, event: Event) -> Result<(), EmitError> {
        if let Some(metrics) = &self.metrics {
            metrics.record_event(event.event_type());
            match &event {
                Event::ToolResult { tool_name, .. } => metrics.record_tool(tool_name, "ok"),
                Event::ToolError { tool_name, .. } => metrics.record_tool(tool_name, "error"),
                _ => {}
            }
        }
        let line = event.to_json_line().map_err(xaiforge_core::Error::from)?;
        self.store.write_event(&event)?;
        if let Some(forward) = self.forward.as_mut() {
            forward(&line);
        }
        Ok(())
    }

    /// Run-start path: `on_run_start` of every plugin, then the regular
    /// event hooks, then persistence.
    pub fn emit_run_start(&mut self, mut event: Event) -> Result<(), EmitError> {
        for plugin in &mut self.plugins {
            event = plugin.on_run_start(&self.ctx, event)?;
        }
        let event = self.apply_event_hooks(event)?;
        self.record_and_write(event)
    }

    /// Run-end path. The trace must still seal when a plugin fails here, so
    /// hook errors fall back to persisting the unprocessed event.
    pub fn emit_run_end(&mut self, event: Event) -> Result<(), EmitError> {
        let mut processed = event.clone();
        let mut failed = false;
        for plugin in &mut self.plugins {
            match plugin.on_run_end(&self.ctx, processed.clone()) {
                Ok(next) => processed = next,
                Err(e) => {
                    warn!("run_end hook failed, sealing with raw event: {e}");
                    failed = true;
                    break;
                }
            }
        }
        if !failed {
            match self.apply_event_hooks(processed.clone()) {
                Ok(next) => processed = next,
                Err(e) => {
                    warn!("run_end hook failed, sealing with raw event: {e}");
                    processed = event;
                }
            }
        } else {
            processed = event;
        }
        self.record_and_write(processed)
    }

    /// Tear down, returning the store (for manifest/report writes) and the
    /// run metrics (for the metrics file).
    pub fn finish(self) -> (TraceStore, Option<RunMetrics>) {
        (self.store, self.metrics)
    }
}

impl EventSink for EventPipeline<'_> {
    fn emit(&mut self, event: Event) -> Result<(), EmitError> {
        let event = self.apply_event_hooks(event)?;
        self.record_and_write(event)
    }
}
