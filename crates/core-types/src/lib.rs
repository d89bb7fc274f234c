//! Shared data model for the CDP test orchestrator: step definitions, test
//! definitions, the interpolation engine, mock rules, and run results.
//!
//! Every other workspace crate depends on this one and none of it depends
//! back, so it carries no async runtime and no CDP transport concerns —
//! those live in `cdp-adapter`, `step-primitives`, and `step-flow`.

pub mod console_network;
pub mod error;
pub mod ids;
pub mod interpolate;
pub mod mock;
pub mod outcome;
pub mod run_context;
pub mod session_registry;
pub mod step;
pub mod test_def;

pub use console_network::{ConsoleLevel, ConsoleRecord, NetworkRecord};
pub use error::CoreError;
pub use ids::{FrameId, RunId, SessionId, TargetId};
pub use interpolate::{interpolate, interpolate_step, BrowserSyncedVars, EnvMap, VariableStore};
pub use mock::{CompiledMockRule, MockRuleError};
pub use outcome::{FailureDetail, LoopBreadcrumb, RunStatus, StepOutcome, StepStatus, TestResult};
pub use run_context::{RunContext, RunContextError};
pub use session_registry::{NullSessionRegistry, SessionEntry, SessionRegistry};
pub use step::{
    as_name_of, CloseModalStrategy, DialogAction, FormField, LoopSpec, MatchMode, RetrySpec, Step,
    StepHeader, StepKind,
};
pub use test_def::TestDefinition;
