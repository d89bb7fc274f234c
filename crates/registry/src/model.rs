//! [`SessionEntry`] now lives in `orchestrator-core-types` alongside the
//! [`crate::api::SessionRegistry`] trait it's carried by. Re-exported here
//! for existing callers.
pub use orchestrator_core_types::SessionEntry;
