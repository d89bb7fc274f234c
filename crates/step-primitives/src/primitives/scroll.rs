//! scroll_to primitive.

use cdp_adapter::Cdp;
use chrono::Utc;
use tracing::info;

use crate::{errors::ActionError, locator::js_literal, types::ActionReport, types::ExecCtx};

pub async fn execute_scroll_to(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    selector: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    info!(action_id = %ctx.action_id, selector, "scroll_to");

    let script = format!(
        r#"(() => {{
    const el = document.querySelector({selector});
    if (!el) return false;
    el.scrollIntoView({{block: 'center', inline: 'center'}});
    return true;
}})()"#,
        selector = js_literal(selector),
    );
    let ok = client.evaluate(&script).await?.as_bool().unwrap_or(false);
    if !ok {
        return Err(ActionError::AnchorNotFound(format!(
            "scroll_to target not found for selector `{selector}`"
        )));
    }
    Ok(ActionReport::success(started_at, None))
}
