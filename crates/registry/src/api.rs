//! The [`SessionRegistry`] contract (spec §4.7) and its null implementation
//! now live in `orchestrator-core-types`, so the CDP Tab Client can consult
//! them without this crate depending back on `step-flow`/`cdp-adapter`.
//! Re-exported here so existing callers of
//! `orchestrator_registry::{SessionRegistry, NullSessionRegistry}` keep
//! working unchanged.
pub use orchestrator_core_types::{NullSessionRegistry, SessionRegistry};
