//! click / hover / click_text / click_nth primitives.

use cdp_adapter::Cdp;
use chrono::Utc;
use orchestrator_core_types::MatchMode;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    errors::ActionError,
    locator::{js_literal, match_expr},
    types::{ActionReport, ExecCtx},
};

const CANDIDATE_SELECTOR: &str = "button, a, [role=\"button\"], [tabindex]";
const ANCHOR_ATTR: &str = "data-step-anchor";

pub async fn execute_click(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    selector: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    info!(action_id = %ctx.action_id, selector, "click");
    client.click(selector, ctx.remaining()).await?;
    Ok(ActionReport::success(started_at, None))
}

pub async fn execute_hover(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    selector: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    info!(action_id = %ctx.action_id, selector, "hover");
    client.hover(selector, ctx.remaining()).await?;
    Ok(ActionReport::success(started_at, None))
}

/// Scans for the first candidate (button/anchor/role=button/tabindex)
/// within `scope` (a selector, or the whole document) whose text matches,
/// tags it, then clicks it through its tagged selector.
pub async fn execute_click_text(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    text: &str,
    scope: Option<&str>,
    match_mode: MatchMode,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let selector = locate_nth_match(client, scope, None, text, match_mode, 0).await?;
    debug!(action_id = %ctx.action_id, %selector, "click_text resolved anchor");
    client.click(&selector, ctx.remaining()).await?;
    Ok(ActionReport::success(started_at, None))
}

pub async fn execute_click_nth(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    index: usize,
    text: Option<&str>,
    selector: Option<&str>,
    match_mode: MatchMode,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let tagged =
        locate_nth_match(client, None, selector, text.unwrap_or(""), match_mode, index).await?;
    client.click(&tagged, ctx.remaining()).await?;
    Ok(ActionReport::success(started_at, None))
}

/// Finds the `index`-th element (among elements matching `selector`, or the
/// default clickable-candidate set, optionally filtered by `text`), tags it
/// with a unique attribute, and returns a selector targeting that tag.
async fn locate_nth_match(
    client: &dyn Cdp,
    scope: Option<&str>,
    selector: Option<&str>,
    text: &str,
    match_mode: MatchMode,
    index: usize,
) -> Result<String, ActionError> {
    let token = format!("anchor-{}", Uuid::new_v4().simple());
    let candidate_selector = selector.unwrap_or(CANDIDATE_SELECTOR);
    let root_expr = match scope {
        Some(s) => format!("(document.querySelector({}) || document)", js_literal(s)),
        None => "document".to_string(),
    };
    let filter_expr = if text.is_empty() {
        "true".to_string()
    } else {
        match_expr("(el.innerText || el.textContent || '')", text, match_mode)
    };

    let script = format!(
        r#"(() => {{
    const root = {root_expr};
    const candidates = Array.from(root.querySelectorAll({candidate_selector}));
    const matches = candidates.filter(el => {filter_expr});
    if ({index} >= matches.length) return {{count: matches.length, ok: false}};
    matches[{index}].setAttribute({attr}, {token});
    return {{count: matches.length, ok: true}};
}})()"#,
        candidate_selector = js_literal(candidate_selector),
        attr = js_literal(ANCHOR_ATTR),
        token = js_literal(&token),
    );

    let result = client.evaluate(&script).await?;
    let ok = result.get("ok").and_then(|v| v.as_bool()).unwrap_or(false);
    if !ok {
        let count = result.get("count").and_then(|v| v.as_u64()).unwrap_or(0);
        return Err(ActionError::OutOfBounds(count as usize));
    }
    Ok(format!("[{ANCHOR_ATTR}=\"{token}\"]"))
}
