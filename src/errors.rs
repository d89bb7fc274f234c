//! Top-level error type for the `cdp-orchestrator` binary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Coordinator(#[from] run_coordinator::CoordinatorError),

    #[error(transparent)]
    Registry(#[from] orchestrator_registry::RegistryError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("test `{0}` not found under the given test directory")]
    TestNotFound(String),
}
