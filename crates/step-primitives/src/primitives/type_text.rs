//! fill / type / clear_input / scan_input / fill_form primitives.

use cdp_adapter::Cdp;
use chrono::Utc;
use orchestrator_core_types::FormField;
use tokio::time::sleep;
use tracing::info;

use crate::{errors::ActionError, locator::js_literal, types::ActionReport, types::ExecCtx};

/// Sets the field's value directly (DOM `.value` assignment) and fires
/// `input`/`change`. Fast path used by most steps.
pub async fn execute_fill(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    selector: &str,
    value: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    info!(action_id = %ctx.action_id, selector, "fill");
    client.fill(selector, value, ctx.remaining()).await?;
    Ok(ActionReport::success(started_at, None))
}

/// Simulates real keystrokes, one character at a time with an optional
/// per-character delay, clearing the field first when requested. Used when
/// a page's input listens for individual keydown events rather than just
/// the end value.
pub async fn execute_type(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    selector: &str,
    text: &str,
    clear_first: bool,
    delay_ms: u64,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    info!(action_id = %ctx.action_id, selector, clear_first, delay_ms, "type");

    if clear_first {
        execute_clear_input(client, ctx, selector).await?;
    } else {
        focus_field(client, selector).await?;
    }

    for ch in text.chars() {
        let script = format!(
            r#"(() => {{
    const el = document.querySelector({selector});
    if (!el) return false;
    el.value = (el.value || '') + {ch};
    el.dispatchEvent(new Event('input', {{bubbles: true}}));
    return true;
}})()"#,
            selector = js_literal(selector),
            ch = js_literal(&ch.to_string()),
        );
        let ok = client.evaluate(&script).await?.as_bool().unwrap_or(false);
        if !ok {
            return Err(ActionError::AnchorNotFound(format!(
                "type target not found for selector `{selector}`"
            )));
        }
        if delay_ms > 0 {
            sleep(std::time::Duration::from_millis(delay_ms)).await;
        }
    }

    let script = format!(
        "(() => {{ const el = document.querySelector({selector}); if (el) el.dispatchEvent(new Event('change', {{bubbles: true}})); }})()",
        selector = js_literal(selector),
    );
    client.evaluate(&script).await?;

    Ok(ActionReport::success(started_at, None))
}

pub async fn execute_clear_input(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    selector: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let script = format!(
        r#"(() => {{
    const el = document.querySelector({selector});
    if (!el) return false;
    el.focus();
    el.value = '';
    el.dispatchEvent(new Event('input', {{bubbles: true}}));
    el.dispatchEvent(new Event('change', {{bubbles: true}}));
    return true;
}})()"#,
        selector = js_literal(selector),
    );
    let ok = client.evaluate(&script).await?.as_bool().unwrap_or(false);
    if !ok {
        return Err(ActionError::AnchorNotFound(format!(
            "clear_input target not found for selector `{selector}`"
        )));
    }
    Ok(ActionReport::success(started_at, None))
}

async fn focus_field(client: &dyn Cdp, selector: &str) -> Result<(), ActionError> {
    let script = format!(
        "(() => {{ const el = document.querySelector({selector}); if (!el) return false; el.focus(); return true; }})()",
        selector = js_literal(selector),
    );
    let ok = client.evaluate(&script).await?.as_bool().unwrap_or(false);
    if !ok {
        return Err(ActionError::AnchorNotFound(format!(
            "focus target not found for selector `{selector}`"
        )));
    }
    Ok(())
}

/// Fills, then presses Enter — used to submit single-field search/filter
/// inputs without a separate click on a submit button.
pub async fn execute_scan_input(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    selector: &str,
    value: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    client.fill(selector, value, ctx.remaining()).await?;
    client.press_key("Enter", &[]).await?;
    Ok(ActionReport::success(started_at, None))
}

/// Fills each field in order; reports the index and selector of the first
/// one that fails rather than aborting with just a generic error.
pub async fn execute_fill_form(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    fields: &[FormField],
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    for (index, field) in fields.iter().enumerate() {
        client
            .fill(&field.selector, &field.value, ctx.remaining())
            .await
            .map_err(|err| {
                ActionError::AnchorNotFound(format!(
                    "fill_form failed at field {index} (`{}`): {err}",
                    field.selector
                ))
            })?;
    }
    Ok(ActionReport::success(started_at, None))
}
