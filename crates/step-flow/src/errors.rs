//! Flow execution error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("test `{0}` not found in the test repository")]
    TestNotFound(String),

    #[error("run_test cycle detected: `{0}` is already on the call stack")]
    Cycle(String),

    #[error("run timed out after {0}ms")]
    Timeout(u64),

    #[error(transparent)]
    Action(#[from] step_primitives::ActionError),

    #[error(transparent)]
    Cdp(#[from] cdp_adapter::AdapterError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<orchestrator_core_types::RunContextError> for FlowError {
    fn from(err: orchestrator_core_types::RunContextError) -> Self {
        match err {
            orchestrator_core_types::RunContextError::Cycle(id) => FlowError::Cycle(id),
        }
    }
}
