//! `stepwise` command-line runner

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stepwise_cli::{
    logging, BookingScenario, BookingSite, LogFormat, ReplayAdvisor, SiteFault, TerminalOperator,
};
use stepwise_core::{EngineConfig, Scenario, ScenarioEngine, ScenarioPlanner};
use stepwise_escalation::{CancellationToken, InMemoryBroker, RequestHandler};

#[derive(Parser, Debug)]
#[command(name = "stepwise", version, about = "Supervised multi-step scenario runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a command against the simulated booking site
    Run(RunArgs),
    /// Print the effective configuration as TOML
    Config {
        /// Config file (defaults to $STEPWISE_CONFIG, then built-in defaults)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Natural-language command, e.g. "book room 101 on 2026-10-22"
    #[arg(short = 'm', long = "command")]
    command: String,

    /// Config file (defaults to $STEPWISE_CONFIG, then built-in defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON array of recorded recovery decisions
    #[arg(short, long)]
    decisions: Option<PathBuf>,

    /// Break part of the simulated site
    #[arg(short, long, value_enum)]
    fault: Option<SiteFault>,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => EngineConfig::from_env().context("loading config from environment"),
    }
}

fn load_advisor(path: Option<&Path>) -> Result<ReplayAdvisor> {
    let Some(path) = path else {
        return Ok(ReplayAdvisor::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading decisions from {}", path.display()))?;
    ReplayAdvisor::from_json(&raw).with_context(|| format!("parsing decisions in {}", path.display()))
}

async fn run(args: RunArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    logging::init(&config.logging.level, args.log_format);
    let advisor = load_advisor(args.decisions.as_deref())?;

    let broker = Arc::new(InMemoryBroker::new());
    let cancel = CancellationToken::new();
    let operator = TerminalOperator::stdio().context("starting terminal input")?;
    let handler = RequestHandler::new(broker.clone(), Arc::new(operator))
        .with_group(config.escalation.consumer_group.clone())
        .spawn(cancel.clone());

    let mut planner = ScenarioPlanner::new();
    planner.register(Arc::new(
        BookingScenario::new(broker.clone()).with_human_timeout(config.escalation_timeout()),
    ));
    let (scenario, score) = planner.classify_and_select(&args.command)?;
    tracing::info!(scenario = scenario.name(), score, "scenario selected");

    let site = BookingSite::new().with_fault(args.fault);
    let mut engine = ScenarioEngine::new(scenario, site, Arc::new(advisor))
        .with_config(config)
        .with_escalation(broker.clone());
    let outcome = engine.execute(&args.command).await;

    cancel.cancel();
    match handler.await {
        Ok(Ok(stats)) => tracing::debug!(?stats, "request handler stopped"),
        Ok(Err(e)) => tracing::warn!(error = %e, "request handler failed"),
        Err(e) => tracing::warn!(error = %e, "request handler panicked"),
    }

    let report = outcome?;
    let bookings: Vec<String> = engine
        .env()
        .bookings()
        .map(|b| format!("{} on {}", b.room, b.date))
        .collect();
    println!(
        "scenario {} {}: {} steps, {} recovered, booked [{}]",
        report.scenario_id,
        report.status,
        report.steps_completed,
        report.recoveries,
        bookings.join(", ")
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Run(args) => run(args).await,
        Command::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
