//! `TestDefinition` (spec §3): a single named test file — a URL to load,
//! hook steps that run before/after the main body, and the inputs that
//! seed the run's variable store.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::step::Step;

fn default_vec() -> Vec<Step> {
    Vec::new()
}

fn default_map() -> Map<String, Value> {
    Map::new()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestDefinition {
    pub id: String,

    /// Navigated to before `before` hooks run; omitted when a test is only
    /// ever reached via `run_test` from a parent that already navigated.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_vec")]
    pub before: Vec<Step>,

    pub steps: Vec<Step>,

    #[serde(default = "default_vec")]
    pub after: Vec<Step>,

    /// Seeds `$env.*` lookups for this test; merged over (never replacing)
    /// the process environment visible to the orchestrator (spec §4.1).
    #[serde(default = "default_map")]
    pub env: Map<String, Value>,

    /// Seeds the run's variable store as though each key had been captured
    /// by an earlier step's `as`.
    #[serde(default = "default_map")]
    pub inputs: Map<String, Value>,

    /// JS boolean expression evaluated right after navigation; a falsy
    /// result fails the run before any step executes (spec §4.3).
    #[serde(default)]
    pub verify_page: Option<String>,

    /// Offset into `steps` to resume from, skipping every step before it
    /// (spec §3/§8). Clamped to `[0, steps.len()]`; reverts to `0` (with a
    /// warning) if doing so would skip a step that captures a variable via
    /// `as`, since that variable would otherwise be unset for the rest of
    /// the run.
    #[serde(default)]
    pub resume_from: Option<usize>,

    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl TestDefinition {
    /// Index of the first main step to execute, honoring `resume_from`.
    /// Returns the resolved index plus a warning message when the
    /// requested offset was rejected and `0` was used instead.
    pub fn start_index(&self) -> (usize, Option<String>) {
        let Some(requested) = self.resume_from else {
            return (0, None);
        };

        let start = requested.min(self.steps.len());

        let skips_an_as = self.steps[..start]
            .iter()
            .any(|s| crate::step::as_name_of(&s.kind).is_some());

        if skips_an_as {
            let warning = format!(
                "resume_from {requested} would skip a step that captures a variable via `as`; resuming from 0 instead"
            );
            (0, Some(warning))
        } else {
            (start, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_test_definition_parses() {
        let raw = json!({
            "id": "smoke",
            "url": "https://example.com",
            "steps": [{"eval": "1+1", "as": "two"}]
        });
        let def: TestDefinition = serde_json::from_value(raw).unwrap();
        assert_eq!(def.id, "smoke");
        assert!(def.before.is_empty());
        assert_eq!(def.start_index(), (0, None));
    }

    #[test]
    fn resume_from_zero_is_a_no_op() {
        let raw = json!({
            "id": "t",
            "steps": [{"wait": 0}, {"wait": 0}],
            "resume_from": 0
        });
        let def: TestDefinition = serde_json::from_value(raw).unwrap();
        assert_eq!(def.start_index(), (0, None));
    }

    #[test]
    fn resume_from_an_offset_skips_the_steps_before_it() {
        let raw = json!({
            "id": "t",
            "steps": [{"wait": 0}, {"wait": 0}, {"wait": 0}],
            "resume_from": 2
        });
        let def: TestDefinition = serde_json::from_value(raw).unwrap();
        assert_eq!(def.start_index(), (2, None));
    }

    #[test]
    fn resume_from_len_runs_zero_main_steps() {
        let raw = json!({
            "id": "t",
            "steps": [{"wait": 0}, {"wait": 0}],
            "resume_from": 2
        });
        let def: TestDefinition = serde_json::from_value(raw).unwrap();
        assert_eq!(def.start_index(), (2, None));
    }

    #[test]
    fn resume_from_beyond_len_clamps_to_len() {
        let raw = json!({
            "id": "t",
            "steps": [{"wait": 0}, {"wait": 0}],
            "resume_from": 50
        });
        let def: TestDefinition = serde_json::from_value(raw).unwrap();
        assert_eq!(def.start_index(), (2, None));
    }

    #[test]
    fn resume_from_that_would_skip_an_as_step_reverts_to_zero_with_a_warning() {
        let raw = json!({
            "id": "t",
            "steps": [
                {"eval": "1", "as": "x"},
                {"wait": 0}
            ],
            "resume_from": 1
        });
        let def: TestDefinition = serde_json::from_value(raw).unwrap();
        let (start, warning) = def.start_index();
        assert_eq!(start, 0);
        assert!(warning.unwrap().contains("resume_from 1"));
    }
}
