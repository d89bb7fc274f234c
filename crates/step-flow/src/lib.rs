//! Step Runner
//!
//! Drives a single [`orchestrator_core_types::TestDefinition`] against a
//! fresh CDP tab: before-hooks, navigation, `verify_page`, the main step
//! list (including loops and nested `run_test` calls), and after-hooks.

pub mod errors;
pub mod executor;
pub mod types;

pub use errors::FlowError;
pub use executor::run_test;
pub use types::{RunOptions, TestRepository};
