use anyhow::{Context, Result};
use orchestrator_core_types::{RunStatus, StepStatus, TestResult};
use orchestrator_registry::{shared, FilesystemTestRepository};
use run_coordinator::RunCoordinator;
use step_flow::RunOptions;

use super::args::RunArgs;
use crate::config::AppConfig;

pub async fn cmd_run(args: RunArgs, config: &AppConfig) -> Result<()> {
    let dir = args.dir.unwrap_or_else(|| config.tests_dir.clone());
    let repo = FilesystemTestRepository::load_dir(&dir)
        .await
        .with_context(|| format!("loading test definitions from {}", dir.display()))?;
    let def = repo
        .get(&args.test_id)
        .with_context(|| format!("test `{}` not found under {}", args.test_id, dir.display()))?;

    let bus = orchestrator_event_bus::run_event_bus(256);
    let coordinator = RunCoordinator::new(shared(repo), bus);

    let mut cdp = config.cdp.clone();
    if let Some(ws_url) = args.ws_url {
        cdp.websocket_url = Some(ws_url);
    }
    if args.headful {
        cdp.headless = false;
    }

    let options = RunOptions { cdp, ..Default::default() };

    let result = coordinator.run(&def, options).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    match result.status {
        RunStatus::Passed => Ok(()),
        RunStatus::Failed => std::process::exit(1),
    }
}

fn print_summary(result: &TestResult) {
    println!(
        "{}  {}  ({} ms)",
        result.test_id,
        match result.status {
            RunStatus::Passed => "PASSED",
            RunStatus::Failed => "FAILED",
        },
        result.duration_ms()
    );

    for outcome in &result.steps {
        let marker = match outcome.status {
            StepStatus::Passed => "ok ",
            StepStatus::Failed => "FAIL",
            StepStatus::Skipped => "skip",
        };
        println!("  [{marker}] {}", outcome.full_label());
        if let Some(error) = &outcome.error {
            println!("        {error}");
        }
    }

    if let Some(failure) = &result.failure {
        println!("\nfailed at: {}", failure.step_label);
        println!("  {}", failure.message);
    }

    if !result.console.is_empty() {
        println!("\nconsole ({} messages):", result.console.len());
        for record in result.console.iter().take(20) {
            println!("  [{:?}] {}", record.level, record.text);
        }
    }
}
