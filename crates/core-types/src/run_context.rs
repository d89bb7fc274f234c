//! `RunContext` (spec §3): the mutable state threaded through one run —
//! the variable store, browser-synced markers, and the visited-test set
//! used to reject `run_test` cycles.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::interpolate::{BrowserSyncedVars, EnvMap, VariableStore};
use crate::ids::RunId;

#[derive(Debug, thiserror::Error)]
pub enum RunContextError {
    #[error("run_test cycle detected: `{0}` is already on the call stack")]
    Cycle(String),
}

/// Threaded by value through nested `run_test` calls; each nested test gets
/// its own `RunContext` derived from the parent via [`RunContext::enter_test`]
/// so the parent's variable store and synced-variable set are visible to the
/// child, but the child's writes do not leak back out (spec §4.7).
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub env: EnvMap,
    pub vars: VariableStore,
    pub synced: BrowserSyncedVars,
    visited_tests: HashSet<String>,
}

impl RunContext {
    pub fn new(run_id: RunId, env: EnvMap, inputs: Map<String, Value>) -> Self {
        Self {
            run_id,
            env,
            vars: inputs,
            synced: BrowserSyncedVars::new(),
            visited_tests: HashSet::new(),
        }
    }

    /// Returns a child context with `test_id` added to the visited set, or
    /// an error if `test_id` is already an ancestor (a cycle).
    pub fn enter_test(&self, test_id: &str) -> Result<Self, RunContextError> {
        if self.visited_tests.contains(test_id) {
            return Err(RunContextError::Cycle(test_id.to_string()));
        }
        let mut visited_tests = self.visited_tests.clone();
        visited_tests.insert(test_id.to_string());
        Ok(Self {
            run_id: self.run_id.clone(),
            env: self.env.clone(),
            vars: self.vars.clone(),
            synced: self.synced.clone(),
            visited_tests,
        })
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Marks `test_id` as already on the call stack without going through
    /// [`RunContext::enter_test`]'s cycle check. Used once, by the top-level
    /// runner, to seed the root test's own id before any nested `run_test`
    /// can loop back around to it.
    pub fn with_root(mut self, test_id: impl Into<String>) -> Self {
        self.visited_tests.insert(test_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ctx() -> RunContext {
        RunContext::new(RunId::new(Utc::now()), Map::new(), Map::new())
    }

    #[test]
    fn enter_test_tracks_ancestry() {
        let root = ctx();
        let child = root.enter_test("login").unwrap();
        assert!(child.enter_test("login").is_err());
    }

    #[test]
    fn sibling_tests_do_not_collide() {
        let root = ctx();
        let a = root.enter_test("a").unwrap();
        // "b" was never on a's ancestry chain from root's perspective either.
        assert!(a.enter_test("b").is_ok());
        assert!(root.enter_test("b").is_ok());
    }

    #[test]
    fn root_test_id_blocks_a_cycle_back_to_itself() {
        let root = ctx().with_root("a");
        let child = root.enter_test("b").unwrap();
        assert!(matches!(child.enter_test("a"), Err(RunContextError::Cycle(id)) if id == "a"));
    }

    #[test]
    fn child_writes_do_not_leak_to_parent() {
        let mut root = ctx();
        root.set_var("x", Value::from(1));
        let mut child = root.enter_test("nested").unwrap();
        child.set_var("x", Value::from(2));
        assert_eq!(root.vars.get("x"), Some(&Value::from(1)));
        assert_eq!(child.vars.get("x"), Some(&Value::from(2)));
    }
}
