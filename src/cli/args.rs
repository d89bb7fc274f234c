use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Declarative browser-automation test orchestrator driving Chrome over CDP",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path (defaults to ./cdp-orchestrator.{yaml,json,toml} if present)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level, honored unless RUST_LOG is set
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON instead of human-readable text
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a single test definition to completion
    Run(RunArgs),

    /// List the test ids found under a test directory
    ListTests(ListTestsArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Id of the test to run (matches its `id` field)
    pub test_id: String,

    /// Directory to scan for `*.json` test definitions (overrides the config file)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Print the full TestResult as JSON instead of a human-readable summary
    #[arg(long)]
    pub json: bool,

    /// Attach to an existing Chrome DevTools websocket instead of launching a new instance
    #[arg(long)]
    pub ws_url: Option<String>,

    /// Run Chrome with a visible window instead of headless mode
    #[arg(long)]
    pub headful: bool,
}

#[derive(Args)]
pub struct ListTestsArgs {
    /// Directory to scan for `*.json` test definitions (overrides the config file)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}
