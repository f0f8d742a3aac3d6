//! Xaiforge Evals - dataset scoring against a provider, with gating

pub mod runner;
pub mod scorers;

pub use runner::{gate_report, load_dataset, run_eval, EvalCase, EvalReport, EvalResult};
pub use scorers::EvalScore;
