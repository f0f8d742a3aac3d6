//! xaiforge - trace-recording agent runtime
//!
//! Usage:
//!   xaiforge run "Compute 2+3*4"                 → run a task, print the manifest
//!   xaiforge run --stream "..."                  → run and print each event line
//!   xaiforge verify latest                       → replay-verify the newest trace
//!   xaiforge diff <a> <b>                        → side-by-side trace comparison
//!   xaiforge experiment run --mode ab ...        → multi-provider experiment
//!   xaiforge eval run --dataset cases.jsonl      → score a dataset, gate it
//!   xaiforge perf bench / perf load              → latency benchmarks
//!
//! Gate failures exit non-zero.

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};

use xaiforge_agent::{AgentRunner, RunSpec};
use xaiforge_core::diff::diff_traces;
use xaiforge_core::query::query_traces;
use xaiforge_core::{event_schema, list_manifests, verify_trace};
use xaiforge_evals::{gate_report, run_eval};
use xaiforge_experiments::{
    gate_experiment, list_experiments, save_experiment_artifacts, ExperimentConfig,
    ExperimentMode, ExperimentRequestTemplate, ExperimentRunner, GateThresholds,
};
use xaiforge_gateway::ModelMessage;
use xaiforge_perf::{run_bench, run_load, BenchOptions, LoadOptions};

#[derive(Parser)]
#[command(
    name = "xaiforge",
    about = "Trace-recording agent runtime with replay, experiments and perf gates",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Base directory for traces and artifacts
    #[arg(long, global = true, default_value = ".xaiforge")]
    base_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task and seal a trace
    Run {
        task: String,
        #[arg(long, default_value = "heuristic")]
        provider: String,
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long, default_value_t = false)]
        allow_net: bool,
        /// Plugin names applied in order (repeatable)
        #[arg(long = "plugin")]
        plugins: Vec<String>,
        /// Print each event line as it is persisted
        #[arg(long, default_value_t = false)]
        stream: bool,
    },
    /// Stream a recorded trace and check its integrity
    Replay { trace_id: String },
    /// Recompute the rolling hash and compare with the manifest
    Verify {
        #[arg(default_value = "latest")]
        trace_id: String,
    },
    /// Compare two traces side by side
    Diff { trace_a: String, trace_b: String },
    /// List sealed traces, newest first
    List,
    /// Count events matching `field=value AND field~substring`
    Query { expression: String },
    /// Print the JSON Schema of the event union
    Schema,
    /// Multi-provider experiments
    #[command(subcommand)]
    Experiment(ExperimentCommands),
    /// Dataset evals
    #[command(subcommand)]
    Eval(EvalCommands),
    /// Performance runs
    #[command(subcommand)]
    Perf(PerfCommands),
}

#[derive(Subcommand)]
enum ExperimentCommands {
    /// Run an experiment from a message template
    Run {
        #[arg(long)]
        id: String,
        #[arg(long, value_enum)]
        mode: ModeArg,
        /// Comma-separated provider names
        #[arg(long)]
        providers: String,
        #[arg(long)]
        message: String,
        #[arg(long, default_value_t = 0.5)]
        traffic_split: f64,
        #[arg(long, default_value = "reports")]
        reports: PathBuf,
    },
    /// Gate a saved experiment summary against thresholds
    Gate {
        #[arg(long)]
        id: String,
        #[arg(long, default_value_t = 0.7)]
        stability_min: f64,
        #[arg(long, default_value_t = 500)]
        max_latency_delta_ms: i64,
        #[arg(long, default_value_t = 0.1)]
        max_error_rate: f64,
    },
    /// List saved experiments
    List,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    Ab,
    Shadow,
    Canary,
    Fallback,
}

impl From<ModeArg> for ExperimentMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Ab => ExperimentMode::Ab,
            ModeArg::Shadow => ExperimentMode::Shadow,
            ModeArg::Canary => ExperimentMode::Canary,
            ModeArg::Fallback => ExperimentMode::Fallback,
        }
    }
}

#[derive(Subcommand)]
enum EvalCommands {
    /// Run a dataset and gate it against a baseline
    Run {
        #[arg(long)]
        dataset: PathBuf,
        #[arg(long, default_value = "reports/evals")]
        report_dir: PathBuf,
        #[arg(long)]
        baseline: Option<PathBuf>,
        #[arg(long, default_value_t = 0.95)]
        threshold: f64,
    },
}

#[derive(Subcommand)]
enum PerfCommands {
    /// Run the bench suite
    Bench {
        #[arg(long, default_value = "quick")]
        suite: String,
        #[arg(long, default_value = "mock")]
        provider: String,
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
        #[arg(long, default_value_t = 30.0)]
        timeout: f64,
        #[arg(long, default_value = "reports")]
        reports: PathBuf,
    },
    /// Run a timed load profile
    Load {
        #[arg(long, default_value_t = 10)]
        duration: u64,
        #[arg(long, default_value_t = 10)]
        concurrency: usize,
        #[arg(long, default_value_t = 0)]
        ramp_up: u64,
        #[arg(long, default_value_t = 5.0)]
        rate: f64,
        #[arg(long, default_value = "mock")]
        provider: String,
        #[arg(long, default_value_t = 30.0)]
        timeout: f64,
        #[arg(long, default_value = "reports")]
        reports: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            task,
            provider,
            root,
            allow_net,
            plugins,
            stream,
        } => {
            let runner = AgentRunner::new(&cli.base_dir);
            let spec = RunSpec {
                task,
                provider,
                root,
                allow_net,
                plugins,
            };
            let manifest = if stream {
                let mut print_line = |line: &str| println!("{line}");
                runner.stream_run(&spec, &mut print_line).await?
            } else {
                runner.run_task(&spec).await?
            };
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }
        Commands::Replay { trace_id } => {
            let runner = AgentRunner::new(&cli.base_dir);
            let mut print_line = |line: &str| println!("{line}");
            runner.replay_trace(&trace_id, &mut print_line).await?;
        }
        Commands::Verify { trace_id } => {
            let result = verify_trace(&cli.base_dir, &trace_id)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.integrity_ok {
                return Err(anyhow!("integrity mismatch for trace {}", result.trace_id));
            }
        }
        Commands::Diff { trace_a, trace_b } => {
            let diff = diff_traces(&cli.base_dir, &trace_a, &trace_b)?;
            println!("{}", diff.to_markdown());
        }
        Commands::List => {
            let manifests = list_manifests(&cli.base_dir);
            println!("{}", serde_json::to_string_pretty(&manifests)?);
        }
        Commands::Query { expression } => {
            let results = query_traces(&cli.base_dir, &expression)?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&event_schema())?);
        }
        Commands::Experiment(command) => run_experiment_command(command, &cli.base_dir).await?,
        Commands::Eval(EvalCommands::Run {
            dataset,
            report_dir,
            baseline,
            threshold,
        }) => {
            let report = run_eval(&dataset, &report_dir, None).await?;
            println!(
                "dataset={} total={} passed={} pass_rate={:.2}%",
                report.dataset,
                report.total,
                report.passed,
                report.pass_rate * 100.0
            );
            if let Some(baseline) = baseline {
                gate_report(&report, &baseline, threshold).context("eval gate")?;
            }
        }
        Commands::Perf(command) => run_perf_command(command).await?,
    }
    Ok(())
}

async fn run_experiment_command(
    command: ExperimentCommands,
    base_dir: &std::path::Path,
) -> anyhow::Result<()> {
    match command {
        ExperimentCommands::Run {
            id,
            mode,
            providers,
            message,
            traffic_split,
            reports,
        } => {
            let template =
                ExperimentRequestTemplate::from_messages(vec![ModelMessage::user(message)]);
            let mut config = ExperimentConfig::create(
                id,
                mode.into(),
                providers.split(',').map(str::to_string).collect(),
                Some(template),
            );
            config.traffic_split = traffic_split;
            let runner = ExperimentRunner::new(base_dir);
            let result = runner.run(&config).await?;
            let manifest = save_experiment_artifacts(&config, &result, base_dir, &reports)?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }
        ExperimentCommands::Gate {
            id,
            stability_min,
            max_latency_delta_ms,
            max_error_rate,
        } => {
            let thresholds = GateThresholds {
                stability_min,
                max_latency_delta_ms,
                max_error_rate,
            };
            let summary = gate_experiment(&id, base_dir, thresholds)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        ExperimentCommands::List => {
            let manifests = list_experiments(base_dir);
            println!("{}", serde_json::to_string_pretty(&manifests)?);
        }
    }
    Ok(())
}

async fn run_perf_command(command: PerfCommands) -> anyhow::Result<()> {
    match command {
        PerfCommands::Bench {
            suite,
            provider,
            concurrency,
            timeout,
            reports,
        } => {
            let result = run_bench(&BenchOptions {
                suite,
                provider,
                max_concurrency: concurrency,
                timeout_s: timeout,
                reports_root: reports,
            })
            .await?;
            println!("{}", serde_json::to_string_pretty(&result.summary)?);
        }
        PerfCommands::Load {
            duration,
            concurrency,
            ramp_up,
            rate,
            provider,
            timeout,
            reports,
        } => {
            let result = run_load(&LoadOptions {
                duration_s: duration,
                concurrency,
                ramp_up_s: ramp_up,
                request_rate: rate,
                provider,
                timeout_s: timeout,
                reports_root: reports,
            })
            .await?;
            println!("{}", serde_json::to_string_pretty(&result.summary)?);
        }
    }
    Ok(())
}
