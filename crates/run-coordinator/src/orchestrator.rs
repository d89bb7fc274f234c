//! The Run Coordinator (spec §4.6): enforces a single active run per
//! process. A second `run` call while one is already in flight is rejected
//! rather than queued — this orchestrator drives one browser tab, and
//! concurrent runs would fight over it.
//!
//! Scaled down from the upstream scheduler's `Orchestrator<R, E>`: that type
//! spawns a background worker pulling off a multi-lane dispatch queue with
//! per-tool concurrency limits; a single tab has no queue to drain, just one
//! `Mutex<Option<ActiveRun>>` guarding entry.

use std::sync::Arc;

use orchestrator_core_types::{RunId, TestDefinition};
use orchestrator_event_bus::RunEventBus;
use step_flow::{RunOptions, TestRepository};
use tokio::sync::Mutex;
use tracing::info;

use crate::errors::CoordinatorError;

#[derive(Clone, Debug)]
struct ActiveRun {
    test_id: String,
    run_id: RunId,
}

pub struct RunCoordinator {
    repo: Arc<dyn TestRepository>,
    bus: Arc<RunEventBus>,
    active: Mutex<Option<ActiveRun>>,
}

impl RunCoordinator {
    pub fn new(repo: Arc<dyn TestRepository>, bus: Arc<RunEventBus>) -> Self {
        Self {
            repo,
            bus,
            active: Mutex::new(None),
        }
    }

    /// `true` while a run is in flight; a best-effort snapshot for a status
    /// endpoint, not something callers should branch `run` on (there's a
    /// race between checking and calling `run` either way — `run` itself is
    /// the authority).
    pub async fn is_busy(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Runs `def`, rejecting the call outright if another run is already in
    /// progress. Clears the active-run marker on every exit path, success or
    /// failure.
    pub async fn run(
        &self,
        def: &TestDefinition,
        options: RunOptions,
    ) -> Result<orchestrator_core_types::TestResult, CoordinatorError> {
        {
            let mut guard = self.active.lock().await;
            if let Some(running) = guard.as_ref() {
                return Err(CoordinatorError::AlreadyRunning(running.test_id.clone()));
            }
            // The real run id is minted inside `step_flow::run_test`; this
            // placeholder only needs to be distinct enough for `is_busy`
            // diagnostics, so seed it from the current instant.
            *guard = Some(ActiveRun {
                test_id: def.id.clone(),
                run_id: RunId::new(chrono::Utc::now()),
            });
        }

        info!(test_id = %def.id, "run starting");
        let result = step_flow::run_test(def, self.repo.clone(), options, Some(self.bus.clone())).await;

        *self.active.lock().await = None;

        result.map_err(CoordinatorError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orchestrator_core_types::Step;
    use serde_json::json;

    struct EmptyRepo;

    #[async_trait]
    impl TestRepository for EmptyRepo {
        async fn get_test(&self, _id: &str) -> Option<TestDefinition> {
            None
        }
    }

    fn noop_test(id: &str) -> TestDefinition {
        TestDefinition {
            id: id.to_string(),
            url: None,
            before: Vec::new(),
            steps: vec![Step::try_from(json!({"wait": 0})).unwrap()],
            after: Vec::new(),
            env: Default::default(),
            inputs: Default::default(),
            verify_page: None,
            resume_from: None,
            timeout_ms: Some(200),
        }
    }

    #[tokio::test]
    async fn rejects_concurrent_runs() {
        let coordinator = RunCoordinator::new(
            Arc::new(EmptyRepo),
            orchestrator_event_bus::run_event_bus(16),
        );

        *coordinator.active.lock().await = Some(ActiveRun {
            test_id: "already-running".to_string(),
            run_id: RunId::new(chrono::Utc::now()),
        });
        assert!(coordinator.is_busy().await);

        let def = noop_test("second");
        let err = coordinator.run(&def, RunOptions::default()).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::AlreadyRunning(id) if id == "already-running"));
    }
}
