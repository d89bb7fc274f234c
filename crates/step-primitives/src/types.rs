//! Shared execution context and report types for step primitives.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ActionError;

/// Per-step execution context: just a deadline and a correlation id, since
/// a run only ever drives a single attached tab — no route/session lookup
/// is needed to know which page a primitive talks to.
#[derive(Clone)]
pub struct ExecCtx {
    pub deadline: Instant,
    pub action_id: String,
}

impl ExecCtx {
    pub fn new(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            action_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Outcome of running one step primitive, independent of how the step
/// runner turns it into a `StepOutcome` for the test result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReport {
    pub ok: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub value: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl ActionReport {
    pub fn success(started_at: DateTime<Utc>, value: Option<serde_json::Value>) -> Self {
        Self {
            ok: true,
            started_at,
            finished_at: Utc::now(),
            value,
            error: None,
        }
    }

    pub fn failure(started_at: DateTime<Utc>, error: &ActionError) -> Self {
        Self {
            ok: false,
            started_at,
            finished_at: Utc::now(),
            value: None,
            error: Some(error.to_string()),
        }
    }
}
