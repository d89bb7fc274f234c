//! mock_network primitive.

use cdp_adapter::Cdp;
use chrono::Utc;
use orchestrator_core_types::CompiledMockRule;
use serde_json::Value;
use tracing::info;

use crate::{errors::ActionError, types::ActionReport, types::ExecCtx};

pub async fn execute_mock_network(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    pattern: &str,
    status: u16,
    body: Option<&Value>,
    delay_ms: Option<u64>,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    info!(action_id = %ctx.action_id, pattern, status, "mock_network");
    let rule = CompiledMockRule::compile(pattern, status, body.cloned(), delay_ms)
        .map_err(|err| ActionError::Internal(err.to_string()))?;
    client.add_mock_rule(rule).await?;
    Ok(ActionReport::success(started_at, None))
}
