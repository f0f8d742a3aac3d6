//! Plugin chain - ordered event transformers with lifecycle hooks
//!
//! Plugins are instantiated per run and applied in registration order; the
//! output of plugin i is the input of plugin i+1. Hooks are synchronous and
//! must not block the runner. A hook error means the event is not persisted
//! and the runner treats the run as failed.

pub mod metrics_collector;
pub mod redactor;

use std::path::PathBuf;

use thiserror::Error;

use xaiforge_core::Event;

pub use metrics_collector::MetricsCollector;
pub use redactor::Redactor;

#[derive(Error, Debug)]
#[error("plugin {plugin} failed: {message}")]
pub struct PluginError {
    pub plugin: String,
    pub message: String,
}

impl PluginError {
    pub fn new(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PluginContext {
    pub trace_id: String,
    pub base_dir: PathBuf,
    pub task: String,
    pub provider: String,
    pub root: PathBuf,
    pub started_at: String,
}

pub trait Plugin: Send {
    fn name(&self) -> &str;

    fn on_run_start(&mut self, _ctx: &PluginContext, event: Event) -> Result<Event, PluginError> {
        Ok(event)
    }

    fn on_event(&mut self, _ctx: &PluginContext, event: Event) -> Result<Event, PluginError> {
        Ok(event)
    }

    fn on_run_end(&mut self, _ctx: &PluginContext, event: Event) -> Result<Event, PluginError> {
        Ok(event)
    }
}

pub fn available_plugins() -> Vec<&'static str> {
    vec!["metrics_collector", "redactor"]
}

/// Instantiate plugins by name, preserving the requested order.
pub fn load_plugins(names: &[String]) -> Result<Vec<Box<dyn Plugin>>, String> {
    let mut plugins: Vec<Box<dyn Plugin>> = Vec::new();
    for name in names {
        match name.as_str() {
            "metrics_collector" => plugins.push(Box::new(MetricsCollector::new())),
            "redactor" => plugins.push(Box::new(Redactor)),
            other => return Err(format!("Unknown plugin: {other}")),
        }
    }
    Ok(plugins)
}
