//! snapcheck - black-box automation probe for the AI screenshot analyzer.
//!
//! Single-shot: build the target, start it, simulate the capture hotkey,
//! wait for the analysis marker, validate, clean up, and exit 0 or 1.
//! Flakiness is surfaced, never retried.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use snapcheck::config::{ProbeConfig, Provider};
use snapcheck::doctor;
use snapcheck::session::{RunSession, print_summary};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "snapcheck")]
#[command(author, version, about = "Black-box automation probe for the AI screenshot analyzer")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the end-to-end hotkey scenario against the target
    Run(RunArgs),
    /// Check host permissions and utilities the scenario depends on
    Doctor,
}

#[derive(Args)]
struct RunArgs {
    /// AI provider the target is launched with
    #[arg(long, value_enum, default_value_t = Provider::Openai)]
    provider: Provider,

    /// Maximum wait for the analysis result after the trigger fires
    #[arg(long, default_value = "60s", value_parser = humantime::parse_duration)]
    deadline: Duration,

    /// Directory containing the target's Cargo project
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Path to the target binary (defaults to the release build output)
    #[arg(long)]
    binary: Option<PathBuf>,

    /// Skip `cargo build --release` and use the binary as-is
    #[arg(long)]
    skip_build: bool,

    /// SIGTERM-to-SIGKILL grace period during cleanup
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    grace: Duration,

    /// Time the target gets to initialize before the trigger fires
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    startup_wait: Duration,

    /// API credential forwarded to the target
    #[arg(long, env = "AI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Run even when no API credential is available
    #[arg(long)]
    allow_missing_key: bool,

    /// Emit the summary as JSON instead of the human-readable block
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Command::Run(args) => run_scenario(args),
        Command::Doctor => run_doctor(),
    }
}

fn run_scenario(args: RunArgs) -> Result<()> {
    if args.api_key.is_none() && !args.allow_missing_key {
        anyhow::bail!(
            "AI_API_KEY is not set; export it or pass --allow-missing-key to run without it"
        );
    }

    let mut config = ProbeConfig::new(args.provider, args.deadline, args.project_dir)
        .with_grace_period(args.grace)
        .with_startup_wait(args.startup_wait);
    if let Some(binary) = args.binary {
        config = config.with_binary(binary);
    }
    if let Some(key) = args.api_key {
        config = config.with_api_key(key);
    }
    if args.skip_build {
        config = config.skip_build();
    }

    info!(
        "Starting automation probe (provider={}, deadline={:?})",
        config.provider, config.deadline
    );
    let report = RunSession::new(config).run();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    std::process::exit(if report.passed() { 0 } else { 1 });
}

fn run_doctor() -> Result<()> {
    let checks = doctor::run_all();
    let usable = doctor::report(&checks);
    std::process::exit(if usable { 0 } else { 1 });
}
