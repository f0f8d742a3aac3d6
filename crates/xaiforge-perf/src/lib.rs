//! Xaiforge Perf - bench and load runners with percentile summaries

pub mod gate;
pub mod load;
pub mod metrics;
pub mod runner;

pub use gate::gate_performance;
pub use load::{run_load, LoadOptions, LoadResult};
pub use metrics::{combine_metrics, summarize_metrics, PerfMetrics, PerfSummary};
pub use runner::{bench_tasks, run_bench, BenchOptions, BenchResult};
