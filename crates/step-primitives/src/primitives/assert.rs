//! assert / assert_text / console_check / network_check primitives.

use std::time::{Duration, Instant};

use cdp_adapter::Cdp;
use chrono::Utc;
use orchestrator_core_types::{ConsoleLevel, MatchMode, RetrySpec};
use tokio::time::sleep;
use tracing::info;

use crate::{
    errors::ActionError,
    locator::{js_literal, match_expr},
    types::{ActionReport, ExecCtx},
};

/// Evaluates at least once; on falsy/error, sleeps `retry.interval_ms` and
/// retries until `retry.timeout_ms` elapses, reporting the last error seen.
pub async fn execute_assert(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    expr: &str,
    retry: Option<RetrySpec>,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    info!(action_id = %ctx.action_id, expr, "assert");
    let retry = retry.unwrap_or(RetrySpec {
        interval_ms: 0,
        timeout_ms: 0,
    });
    let deadline = Instant::now() + Duration::from_millis(retry.timeout_ms);

    let mut last_error = String::new();
    loop {
        match client.evaluate(expr).await {
            Ok(value) if value.as_bool() == Some(true) || truthy(&value) => {
                return Ok(ActionReport::success(started_at, None));
            }
            Ok(value) => {
                last_error = format!("assertion `{expr}` was falsy: {value}");
            }
            Err(err) => {
                last_error = format!("assertion `{expr}` errored: {err}");
            }
        }
        if Instant::now() >= deadline {
            let err = ActionError::AssertionFailed(last_error);
            return Ok(ActionReport::failure(started_at, &err));
        }
        sleep(Duration::from_millis(retry.interval_ms.max(1))).await;
    }
}

fn truthy(value: &serde_json::Value) -> bool {
    !matches!(
        value,
        serde_json::Value::Bool(false) | serde_json::Value::Null
    ) && !matches!(value, serde_json::Value::Number(n) if n.as_f64() == Some(0.0))
        && !matches!(value, serde_json::Value::String(s) if s.is_empty())
}

/// Checks for presence (or, with `absent`, absence) of matching text within
/// `selector` (default `body`). Retries like [`execute_assert`] when `retry`
/// is set; otherwise tried exactly once.
pub async fn execute_assert_text(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    selector: Option<&str>,
    text: &str,
    match_mode: MatchMode,
    absent: bool,
    retry: Option<RetrySpec>,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let selector = selector.unwrap_or("body");
    let match_check = match_expr("(el.innerText || el.textContent || '')", text, match_mode);
    let script = format!(
        r#"(() => {{
    const el = document.querySelector({selector});
    if (!el) return false;
    return {match_check};
}})()"#,
        selector = js_literal(selector),
    );

    let retry = retry.unwrap_or(RetrySpec {
        interval_ms: 0,
        timeout_ms: 0,
    });
    let deadline = Instant::now() + Duration::from_millis(retry.timeout_ms);

    loop {
        let present = client.evaluate(&script).await?.as_bool().unwrap_or(false);
        let ok = present != absent;
        if ok {
            return Ok(ActionReport::success(started_at, None));
        }
        if Instant::now() >= deadline {
            let verb = if absent { "still present in" } else { "not found in" };
            let err = ActionError::AssertionFailed(format!(
                "text `{text}` {verb} `{selector}`"
            ));
            return Ok(ActionReport::failure(started_at, &err));
        }
        sleep(Duration::from_millis(retry.interval_ms.max(1))).await;
    }
}

/// Fails if any collected console message's level is in `levels` (`warn` is
/// accepted as an alias for `warning`). Does not clear the collected log.
pub async fn execute_console_check(
    client: &dyn Cdp,
    _ctx: &ExecCtx,
    levels: &[String],
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let wanted: Vec<ConsoleLevel> = levels.iter().filter_map(|l| parse_level(l)).collect();

    let hits: Vec<String> = client
        .console_messages()
        .into_iter()
        .filter(|record| wanted.contains(&record.level))
        .map(|record| format!("[{:?}] {}", record.level, record.text))
        .collect();

    if hits.is_empty() {
        return Ok(ActionReport::success(started_at, None));
    }
    let err = ActionError::AssertionFailed(format!(
        "console_check matched {} message(s): {}",
        hits.len(),
        hits.join("; ")
    ));
    Ok(ActionReport::failure(started_at, &err))
}

fn parse_level(level: &str) -> Option<ConsoleLevel> {
    match level.to_lowercase().as_str() {
        "log" => Some(ConsoleLevel::Log),
        "info" => Some(ConsoleLevel::Info),
        "warn" | "warning" => Some(ConsoleLevel::Warning),
        "error" => Some(ConsoleLevel::Error),
        _ => None,
    }
}

/// When `enabled`, fails if any collected response has status >= 400,
/// listing `"<status> <url>"` entries. `enabled: false` is a no-op pass.
pub async fn execute_network_check(
    client: &dyn Cdp,
    _ctx: &ExecCtx,
    enabled: bool,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    if !enabled {
        return Ok(ActionReport::success(started_at, None));
    }

    let failures: Vec<String> = client
        .network_responses()
        .into_iter()
        .filter(|record| record.status.map(|s| s >= 400).unwrap_or(false))
        .map(|record| format!("{} {}", record.status.unwrap_or(0), record.url))
        .collect();

    if failures.is_empty() {
        return Ok(ActionReport::success(started_at, None));
    }
    let err = ActionError::AssertionFailed(format!(
        "network_check found {} failing response(s): {}",
        failures.len(),
        failures.join("; ")
    ));
    Ok(ActionReport::failure(started_at, &err))
}
