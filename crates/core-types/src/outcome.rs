//! Per-step and per-run results (spec §3 `StepOutcome`/`TestResult`).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::console_network::{ConsoleRecord, NetworkRecord};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    /// The step's `if` guard evaluated falsy; it never executed.
    Skipped,
}

/// One breadcrumb of loop position, prepended to a failing step's context
/// so a step that fails on loop iteration 7 reports `loop[item=7/20]`
/// rather than just its own label (spec §4.5 "Loop Executor").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoopBreadcrumb {
    pub var_name: String,
    pub index: usize,
    pub total: Option<usize>,
}

impl std::fmt::Display for LoopBreadcrumb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.total {
            Some(total) => write!(f, "loop[{}={}/{}]", self.var_name, self.index, total),
            None => write!(f, "loop[{}={}]", self.var_name, self.index),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_label: String,
    pub kind: String,
    pub status: StepStatus,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default)]
    pub loop_context: Vec<LoopBreadcrumb>,
}

impl StepOutcome {
    /// The label as it should appear in a failure message: the step's own
    /// label prefixed by every enclosing loop breadcrumb, outermost first.
    pub fn full_label(&self) -> String {
        let mut parts: Vec<String> = self.loop_context.iter().map(|b| b.to_string()).collect();
        parts.push(self.step_label.clone());
        parts.join(" > ")
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailureDetail {
    pub step_label: String,
    /// The failing step reconstructed as JSON, for diagnostics.
    pub step_def: Value,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestResult {
    pub test_id: String,
    pub run_id: String,
    pub status: RunStatus,
    pub steps: Vec<StepOutcome>,
    #[serde(default)]
    pub console: Vec<ConsoleRecord>,
    #[serde(default)]
    pub network: Vec<NetworkRecord>,
    /// DOM snapshots keyed by the index into `TestDefinition::steps` of the
    /// step that captured them — every step with `capture_dom: true`, plus
    /// the failing step if any (spec §7).
    #[serde(default)]
    pub dom_snapshot: BTreeMap<usize, String>,
    #[serde(default)]
    pub screenshot_base64: Option<String>,
    #[serde(default)]
    pub failure: Option<FailureDetail>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TestResult {
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breadcrumb_formats_with_total() {
        let b = LoopBreadcrumb {
            var_name: "item".into(),
            index: 2,
            total: Some(5),
        };
        assert_eq!(b.to_string(), "loop[item=2/5]");
    }

    #[test]
    fn full_label_chains_breadcrumbs_outermost_first() {
        let outcome = StepOutcome {
            step_label: "click submit".into(),
            kind: "click".into(),
            status: StepStatus::Failed,
            value: None,
            error: Some("not found".into()),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            loop_context: vec![
                LoopBreadcrumb {
                    var_name: "page".into(),
                    index: 0,
                    total: Some(3),
                },
                LoopBreadcrumb {
                    var_name: "row".into(),
                    index: 4,
                    total: None,
                },
            ],
        };
        assert_eq!(
            outcome.full_label(),
            "loop[page=0/3] > loop[row=4] > click submit"
        );
    }
}
