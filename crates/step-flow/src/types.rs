//! Shared types for the step runner.

use std::sync::Arc;

use async_trait::async_trait;
use cdp_adapter::CdpConfig;
use orchestrator_core_types::{NullSessionRegistry, SessionRegistry, TestDefinition};
use serde_json::{Map, Value};

/// Read-only lookup used to resolve `run_test` targets. The core runner only
/// depends on this trait; a concrete filesystem-backed implementation lives
/// in `orchestrator-registry` and is peripheral to this crate.
#[async_trait]
pub trait TestRepository: Send + Sync {
    async fn get_test(&self, id: &str) -> Option<TestDefinition>;
}

/// Knobs a caller sets for one `run_test` invocation, beyond what the
/// `TestDefinition` itself carries.
#[derive(Clone)]
pub struct RunOptions {
    pub cdp: CdpConfig,
    /// Merged over `TestDefinition.inputs` before the run starts, as though
    /// each key had already been captured by an earlier step's `as`.
    pub initial_vars: Map<String, Value>,
    /// Caller-supplied session identifier driving the CDP Tab Client's
    /// target-selection algorithm (spec §4.2): when set, a live registered
    /// target is reused, or a freshly created one is registered for next
    /// time. `None` skips straight to `create_tab`.
    pub session_id: Option<String>,
    pub registry: Arc<dyn SessionRegistry>,
    /// When no session id resolves a target, open and own a fresh isolated
    /// tab rather than attaching to whatever page already exists.
    pub create_tab: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            cdp: CdpConfig::default(),
            initial_vars: Map::new(),
            session_id: None,
            registry: Arc::new(NullSessionRegistry),
            create_tab: true,
        }
    }
}

pub(crate) const DEFAULT_RUN_TIMEOUT_MS: u64 = 30_000;
pub(crate) const DEFAULT_VERIFY_PAGE_TIMEOUT_MS: u64 = 10_000;
pub(crate) const VERIFY_PAGE_POLL_MS: u64 = 200;

/// Before-hook dispatch order: `http_request` first (no browser needed),
/// then `mock_network` (registered before navigation), then everything else.
pub(crate) fn hook_phase(kind: &orchestrator_core_types::StepKind) -> u8 {
    use orchestrator_core_types::StepKind;
    match kind {
        StepKind::HttpRequest { .. } => 0,
        StepKind::MockNetwork { .. } => 1,
        _ => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core_types::Step;
    use serde_json::json;

    #[test]
    fn http_request_runs_before_mock_network_runs_before_everything_else() {
        let http = Step::try_from(json!({"http_request": {"url": "http://x"}})).unwrap();
        let mock = Step::try_from(json!({"mock_network": {"match": "*", "status": 200}})).unwrap();
        let click = Step::try_from(json!({"click": "#go"})).unwrap();

        assert!(hook_phase(&http.kind) < hook_phase(&mock.kind));
        assert!(hook_phase(&mock.kind) < hook_phase(&click.kind));
    }
}
