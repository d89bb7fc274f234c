//! Crate-wide error type for the data model itself (malformed test files).
//! Execution errors (CDP failures, step failures) live in their owning
//! crates' own `thiserror` enums and carry a `CoreError` only when they
//! wrap a data-model problem.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid step definition: {0}")]
    InvalidStep(String),

    #[error("invalid test definition: {0}")]
    InvalidTest(#[from] serde_json::Error),

    #[error(transparent)]
    Cycle(#[from] crate::run_context::RunContextError),

    #[error(transparent)]
    Mock(#[from] crate::mock::MockRuleError),
}
