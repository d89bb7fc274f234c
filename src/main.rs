use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    cdp_orchestrator_cli::cli::run().await
}
