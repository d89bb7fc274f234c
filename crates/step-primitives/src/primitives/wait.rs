//! wait / wait_for / wait_for_text / wait_for_text_gone primitives.

use std::time::{Duration, Instant};

use cdp_adapter::Cdp;
use chrono::Utc;
use orchestrator_core_types::MatchMode;
use tokio::time::sleep;
use tracing::info;

use crate::{
    errors::ActionError,
    locator::{js_literal, match_expr},
    types::ActionReport,
    types::ExecCtx,
};

pub async fn execute_wait(
    _client: &dyn Cdp,
    ctx: &ExecCtx,
    ms: u64,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    info!(action_id = %ctx.action_id, ms, "wait");
    sleep(Duration::from_millis(ms)).await;
    Ok(ActionReport::success(started_at, None))
}

pub async fn execute_wait_for(
    client: &dyn Cdp,
    selector: &str,
    timeout_ms: u64,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let script = format!(
        "!!document.querySelector({selector})",
        selector = js_literal(selector),
    );
    poll_until(client, &script, timeout_ms, || {
        format!("element `{selector}` did not appear within {timeout_ms}ms")
    })
    .await?;
    Ok(ActionReport::success(started_at, None))
}

pub async fn execute_wait_for_text(
    client: &dyn Cdp,
    selector: &str,
    text: &str,
    match_mode: MatchMode,
    timeout_ms: u64,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let script = text_present_script(selector, text, match_mode);
    poll_until(client, &script, timeout_ms, || {
        format!("text `{text}` did not appear in `{selector}` within {timeout_ms}ms")
    })
    .await?;
    Ok(ActionReport::success(started_at, None))
}

pub async fn execute_wait_for_text_gone(
    client: &dyn Cdp,
    selector: &str,
    text: &str,
    match_mode: MatchMode,
    timeout_ms: u64,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let present_script = text_present_script(selector, text, match_mode);
    let gone_script = format!("!({present_script})");
    poll_until(client, &gone_script, timeout_ms, || {
        format!("text `{text}` did not disappear from `{selector}` within {timeout_ms}ms")
    })
    .await?;
    Ok(ActionReport::success(started_at, None))
}

fn text_present_script(selector: &str, text: &str, match_mode: MatchMode) -> String {
    let match_check = match_expr("(el.innerText || el.textContent || '')", text, match_mode);
    format!(
        r#"(() => {{
    const el = document.querySelector({selector});
    if (!el) return false;
    return {match_check};
}})()"#,
        selector = js_literal(selector),
    )
}

async fn poll_until(
    client: &dyn Cdp,
    script: &str,
    timeout_ms: u64,
    message: impl Fn() -> String,
) -> Result<(), ActionError> {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if client.evaluate(script).await?.as_bool().unwrap_or(false) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(ActionError::WaitTimeout(message()));
        }
        sleep(Duration::from_millis(100)).await;
    }
}
