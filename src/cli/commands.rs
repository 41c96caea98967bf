//! CLI command definitions for evalforge.
//!
//! Three commands cover the run lifecycle: `run` executes one agent
//! evaluation end to end and appends it to the history log, `report`
//! re-renders a saved results bundle, and `analyze` aggregates the
//! history log into statistics and insights.

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};

use crate::analytics::{analyze, AnalysisThresholds};
use crate::config::RunConfig;
use crate::history::{load_bundle, save_bundle, HistoryLog};
use crate::report::{render_analysis, render_bundle};
use crate::runner::result::OverallStatus;
use crate::runner::Orchestrator;

/// Default history log location.
const DEFAULT_HISTORY: &str = "./evalforge-history.jsonl";

/// Agent evaluation harness: run coding agents against test cases and
/// track results over time.
#[derive(Parser)]
#[command(name = "evalforge")]
#[command(about = "Run AI coding agents against test cases and evaluate the results")]
#[command(version)]
#[command(
    long_about = "evalforge executes a coding agent inside an isolated workspace, \
evaluates what it produced, and appends every run to an append-only history log.\n\n\
Example usage:\n  evalforge run --config ./run.yaml\n  evalforge analyze --history ./evalforge-history.jsonl"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Execute one evaluation run from a YAML run configuration.
    Run(RunArgs),

    /// Render a saved results bundle as a plain-text report.
    Report(ReportArgs),

    /// Aggregate the history log into statistics, trends and insights.
    Analyze(AnalyzeArgs),
}

/// Arguments for `evalforge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the YAML run configuration.
    #[arg(short, long)]
    pub config: PathBuf,

    /// History log to append the run to.
    #[arg(long, default_value = DEFAULT_HISTORY)]
    pub history: PathBuf,

    /// Keep the workspace on disk after the run for inspection.
    #[arg(long)]
    pub keep_workspace: bool,

    /// Also write the results bundle to this path as pretty JSON.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for `evalforge report`.
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Path to a saved results bundle (JSON).
    #[arg(short, long)]
    pub bundle: PathBuf,
}

/// Arguments for `evalforge analyze`.
#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// History log to analyze.
    #[arg(long, default_value = DEFAULT_HISTORY)]
    pub history: PathBuf,

    /// Output the full analysis as JSON instead of a text report.
    #[arg(short, long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// Lets main.rs read `log_level` before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse arguments and execute the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Execute the selected command with already-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_command(args).await,
        Commands::Report(args) => report_command(args),
        Commands::Analyze(args) => analyze_command(args),
    }
}

async fn run_command(args: RunArgs) -> anyhow::Result<()> {
    let mut config = RunConfig::from_yaml_file(&args.config)?;
    if args.keep_workspace {
        config = config.with_keep_workspace(true);
    }
    config.validate()?;

    info!(
        "Starting run for test case '{}' with agent '{}'",
        config.test_case, config.agent.agent_type
    );

    let orchestrator = Orchestrator::new();
    let bundle = orchestrator.run(config).await;

    let log = HistoryLog::new(&args.history);
    match log.append(bundle.clone()) {
        Ok(exported) => info!(
            "Appended run {} to {}",
            exported.bundle.run_id,
            args.history.display()
        ),
        Err(e) => warn!("Could not append run to history: {}", e),
    }

    if let Some(output) = &args.output {
        save_bundle(&bundle, output)?;
        info!("Wrote results bundle to {}", output.display());
    }

    print!("{}", render_bundle(&bundle));

    if bundle.summary.overall_status == OverallStatus::Failed {
        anyhow::bail!("run {} failed", bundle.run_id);
    }
    Ok(())
}

fn report_command(args: ReportArgs) -> anyhow::Result<()> {
    let bundle = load_bundle(&args.bundle)?;
    print!("{}", render_bundle(&bundle));
    Ok(())
}

fn analyze_command(args: AnalyzeArgs) -> anyhow::Result<()> {
    let log = HistoryLog::new(&args.history);
    let read = log.read()?;
    if read.skipped_lines > 0 {
        warn!(
            "Skipped {} malformed line(s) in {}",
            read.skipped_lines,
            args.history.display()
        );
    }

    let analysis = analyze(&read.records, &AnalysisThresholds::default());
    if args.json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        print!("{}", render_analysis(&analysis));
    }
    Ok(())
}
