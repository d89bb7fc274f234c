//! `cdp-orchestrator`: a declarative browser-automation test orchestrator
//! driving Chrome over the Chrome DevTools Protocol.
//!
//! This crate is the CLI shell around the orchestrator's library crates
//! (`cdp-adapter`, `step-primitives`, `step-flow`, `orchestrator-registry`,
//! `run-coordinator`): argument parsing, configuration loading, and logging
//! bootstrap live here; the actual browser driving lives in those crates.

pub mod cli;
pub mod config;
pub mod errors;
