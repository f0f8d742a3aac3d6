//! Xaiforge Agent - end-to-end run orchestration
//!
//! Composes a task provider, the (optionally policy-wrapped) tool registry
//! and the plugin chain, and streams every event through a single serialized
//! pipeline into the trace store.

pub mod heuristic;
pub mod observability;
pub mod ollama;
pub mod openai_compat;
pub mod pipeline;
pub mod plugins;
pub mod provider;
pub mod runner;

pub use pipeline::{EmitError, EventPipeline, EventSink};
pub use provider::{ProviderCatalog, ProviderError, TaskProvider};
pub use runner::{AgentRunner, RunError, RunSpec};
