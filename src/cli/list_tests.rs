use anyhow::{Context, Result};
use orchestrator_registry::FilesystemTestRepository;

use super::args::ListTestsArgs;
use crate::config::AppConfig;

pub async fn cmd_list_tests(args: ListTestsArgs, config: &AppConfig) -> Result<()> {
    let dir = args.dir.unwrap_or_else(|| config.tests_dir.clone());
    let repo = FilesystemTestRepository::load_dir(&dir)
        .await
        .with_context(|| format!("loading test definitions from {}", dir.display()))?;

    let mut ids = repo.ids();
    ids.sort();

    if ids.is_empty() {
        println!("no test definitions found under {}", dir.display());
        return Ok(());
    }

    for id in ids {
        println!("{id}");
    }

    Ok(())
}
