//! select / choose_dropdown / expand_menu / toggle primitives.

use std::time::{Duration, Instant};

use cdp_adapter::Cdp;
use chrono::Utc;
use tokio::time::sleep;
use tracing::info;

use crate::{errors::ActionError, locator::js_literal, types::ActionReport, types::ExecCtx};

pub async fn execute_select(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    selector: &str,
    value: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    info!(action_id = %ctx.action_id, selector, value, "select");
    client.select(selector, value, ctx.remaining()).await?;
    Ok(ActionReport::success(started_at, None))
}

/// Clicks the trigger, then polls for a `[role="menuitem"]`/`[role="option"]`
/// whose text matches, clicking the first one found.
pub async fn execute_choose_dropdown(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    trigger_selector: &str,
    text: &str,
    timeout_ms: u64,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    client.click(trigger_selector, ctx.remaining()).await?;

    let token = format!("choice-{}", uuid::Uuid::new_v4().simple());
    let script = format!(
        r#"(() => {{
    const options = Array.from(document.querySelectorAll('[role="menuitem"], [role="option"]'));
    const target = {text}.trim().toLowerCase();
    const match = options.find(el => (el.innerText || el.textContent || '').trim().toLowerCase().includes(target));
    if (!match) return false;
    match.setAttribute({attr}, {token});
    return true;
}})()"#,
        text = js_literal(text),
        attr = js_literal("data-step-anchor"),
        token = js_literal(&token),
    );

    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if client.evaluate(&script).await?.as_bool().unwrap_or(false) {
            break;
        }
        if Instant::now() >= deadline {
            return Err(ActionError::AnchorNotFound(format!(
                "no menu option matching `{text}` within {timeout_ms}ms"
            )));
        }
        sleep(Duration::from_millis(100)).await;
    }

    client
        .click(&format!("[data-step-anchor=\"{token}\"]"), ctx.remaining())
        .await?;
    Ok(ActionReport::success(started_at, None))
}

/// Clicks a collapsed group's toggle, identified by
/// `aria-label="<group>, collapsed"`. No-ops (success) if already expanded.
pub async fn execute_expand_menu(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    group: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let expanded_label = format!("{group}, expanded");
    let collapsed_label = format!("{group}, collapsed");

    let check_expanded = format!(
        "!!document.querySelector({selector})",
        selector = js_literal(&format!("[aria-label=\"{expanded_label}\"]"))
    );
    if client
        .evaluate(&check_expanded)
        .await?
        .as_bool()
        .unwrap_or(false)
    {
        return Ok(ActionReport::success(started_at, None));
    }

    let toggle_selector = format!("[aria-label=\"{collapsed_label}\"]");
    client.click(&toggle_selector, ctx.remaining()).await?;
    Ok(ActionReport::success(started_at, None))
}

/// Resolves the input associated with a label (via `for`, a nested input,
/// or an ARIA switch/checkbox role), compares its current checked state
/// against the desired one, and clicks only if a change is needed.
pub async fn execute_toggle(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    label: &str,
    desired_state: Option<bool>,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let token = format!("toggle-{}", uuid::Uuid::new_v4().simple());
    let script = format!(
        r#"(() => {{
    const target = {label}.trim().toLowerCase();
    const labels = Array.from(document.querySelectorAll('label'));
    const labelEl = labels.find(el => (el.innerText || el.textContent || '').trim().toLowerCase().includes(target));
    if (!labelEl) return null;

    let input = null;
    const forId = labelEl.getAttribute('for');
    if (forId) input = document.getElementById(forId);
    if (!input) input = labelEl.querySelector('input, [role="switch"], [role="checkbox"]');
    if (!input) return null;

    const checked = input.type === 'checkbox' || input.type === 'radio'
        ? input.checked
        : input.getAttribute('aria-checked') === 'true';

    input.setAttribute({attr}, {token});
    return {{checked}};
}})()"#,
        label = js_literal(label),
        attr = js_literal("data-step-anchor"),
        token = js_literal(&token),
    );

    let result = client.evaluate(&script).await?;
    if result.is_null() {
        return Err(ActionError::AnchorNotFound(format!(
            "no input associated with label `{label}`"
        )));
    }
    let checked = result.get("checked").and_then(|v| v.as_bool()).unwrap_or(false);

    if let Some(desired) = desired_state {
        if checked == desired {
            return Ok(ActionReport::success(started_at, None));
        }
    }

    client
        .click(&format!("[data-step-anchor=\"{token}\"]"), ctx.remaining())
        .await?;
    Ok(ActionReport::success(started_at, None))
}
