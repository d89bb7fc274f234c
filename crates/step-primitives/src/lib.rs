//! Step primitives: the concrete CDP-driven implementation of every
//! [`StepKind`] the orchestrator can execute, apart from the nesting
//! constructs (`loop`, `run_test`) owned by the step runner.

pub mod errors;
mod locator;
mod primitives;
pub mod types;

pub use errors::*;
pub use locator::{js_literal, match_expr};
pub use primitives::execute_step;
pub use types::*;
