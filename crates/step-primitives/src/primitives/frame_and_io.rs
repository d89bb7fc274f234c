//! switch_frame / press_key / screenshot / evaluate primitives.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use cdp_adapter::Cdp;
use chrono::Utc;
use tracing::info;

use crate::{errors::ActionError, types::ActionReport, types::ExecCtx};

pub async fn execute_switch_frame(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    selector: Option<&str>,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    info!(action_id = %ctx.action_id, ?selector, "switch_frame");
    client.switch_frame(selector, ctx.remaining()).await?;
    Ok(ActionReport::success(started_at, None))
}

pub async fn execute_press_key(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    key: &str,
    modifiers: &[String],
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    info!(action_id = %ctx.action_id, key, "press_key");
    client.press_key(key, modifiers).await?;
    Ok(ActionReport::success(started_at, None))
}

/// Captures a PNG screenshot; the base64 payload is always the reported
/// value, regardless of whether `as` is set to store it in vars.
pub async fn execute_screenshot(
    client: &dyn Cdp,
    ctx: &ExecCtx,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    info!(action_id = %ctx.action_id, "screenshot");
    let png = client.screenshot().await?;
    let encoded = STANDARD.encode(png);
    Ok(ActionReport::success(
        started_at,
        Some(serde_json::Value::String(encoded)),
    ))
}

/// Runs the expression in the current execution context. With no `as` and
/// outside a hook, a strict `false` return is an assertion failure; other
/// falsy values (`0`, `""`, `null`, `undefined`) are legal side effects.
pub async fn execute_evaluate(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    expr: &str,
    has_as: bool,
    in_hook: bool,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    info!(action_id = %ctx.action_id, "evaluate");
    let value = client.evaluate(expr).await?;

    if !has_as && !in_hook && value.as_bool() == Some(false) {
        let err = ActionError::AssertionFailed(format!(
            "evaluate `{expr}` returned false with no `as`"
        ));
        return Ok(ActionReport::failure(started_at, &err));
    }

    Ok(ActionReport::success(started_at, Some(value)))
}
