//! Command-line surface: argument parsing, logging/config bootstrap, and
//! subcommand dispatch.

mod args;
mod list_tests;
mod run;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use args::{CliArgs, Commands};

use crate::config::AppConfig;

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();
    init_logging(&cli.log_level, cli.json_logs)?;

    let config = AppConfig::load(cli.config.as_ref()).context("failed to load configuration")?;

    info!(version = env!("CARGO_PKG_VERSION"), "cdp-orchestrator starting");

    let result = match cli.command {
        Commands::Run(args) => run::cmd_run(args, &config).await,
        Commands::ListTests(args) => list_tests::cmd_list_tests(args, &config).await,
    };

    if let Err(err) = &result {
        error!(error = %err, "command failed");
    }

    result
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    Ok(())
}
