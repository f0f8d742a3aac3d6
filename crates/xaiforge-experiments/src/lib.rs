//! Xaiforge Experiments - A/B, shadow, canary and fallback execution
//!
//! Drives one request template across providers, compares the arms, and
//! gates saved summaries against thresholds.

pub mod compare;
pub mod models;
pub mod runner;

pub use compare::{compare_text, compare_tool_calls, DiffSummary, ToolCallDiff};
pub use models::{
    ExperimentComparison, ExperimentConfig, ExperimentManifest, ExperimentMode,
    ExperimentProviderResult, ExperimentRequestTemplate, ExperimentResult, ExperimentRunSummary,
};
pub use runner::{
    gate_experiment, list_experiments, load_experiment_manifest, save_experiment_artifacts,
    summarize_result, ExperimentError, ExperimentRunner, GateThresholds,
};
