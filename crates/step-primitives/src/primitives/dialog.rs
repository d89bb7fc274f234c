//! handle_dialog / close_modal primitives.

use cdp_adapter::{Cdp, DialogAction as CdpDialogAction};
use chrono::Utc;
use orchestrator_core_types::{CloseModalStrategy, DialogAction};
use tracing::info;

use crate::{errors::ActionError, locator::js_literal, types::ActionReport, types::ExecCtx};

const CLOSE_BUTTON_SELECTORS: &[&str] = &[
    "[aria-label=\"Close\"]",
    "[aria-label=\"close\"]",
    ".modal [aria-label=\"Close\"]",
    "[data-dismiss=\"modal\"]",
    ".modal-close",
    ".close",
];

pub async fn execute_handle_dialog(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    action: DialogAction,
    text: Option<&str>,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    info!(action_id = %ctx.action_id, ?action, "handle_dialog");
    let cdp_action = match action {
        DialogAction::Accept => CdpDialogAction::Accept,
        DialogAction::Dismiss => CdpDialogAction::Dismiss,
    };
    client.handle_dialog(cdp_action, text).await?;
    Ok(ActionReport::success(started_at, None))
}

/// `Button`: clicks the first close-button-like selector found. `Escape`:
/// presses Escape. `Backdrop`: clicks the dialog's backdrop overlay. `Auto`
/// (the default): tries a close button first, falling back to Escape.
pub async fn execute_close_modal(
    client: &dyn Cdp,
    ctx: &ExecCtx,
    strategy: Option<CloseModalStrategy>,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let strategy = strategy.unwrap_or_default();
    info!(action_id = %ctx.action_id, ?strategy, "close_modal");

    match strategy {
        CloseModalStrategy::Button => {
            click_close_button(client, ctx).await?;
        }
        CloseModalStrategy::Escape => {
            client.press_key("Escape", &[]).await?;
        }
        CloseModalStrategy::Backdrop => {
            click_backdrop(client, ctx).await?;
        }
        CloseModalStrategy::Auto => {
            if click_close_button(client, ctx).await.is_err() {
                client.press_key("Escape", &[]).await?;
            }
        }
    }
    Ok(ActionReport::success(started_at, None))
}

async fn click_close_button(client: &dyn Cdp, ctx: &ExecCtx) -> Result<(), ActionError> {
    for selector in CLOSE_BUTTON_SELECTORS {
        let script = format!(
            "!!document.querySelector({selector})",
            selector = js_literal(selector),
        );
        if client.evaluate(&script).await?.as_bool().unwrap_or(false) {
            client.click(selector, ctx.remaining()).await?;
            return Ok(());
        }
    }
    Err(ActionError::AnchorNotFound(
        "close_modal found no close-button candidate".to_string(),
    ))
}

async fn click_backdrop(client: &dyn Cdp, ctx: &ExecCtx) -> Result<(), ActionError> {
    const BACKDROP_SELECTORS: &[&str] = &[".modal-backdrop", "[data-backdrop]", ".overlay"];
    for selector in BACKDROP_SELECTORS {
        let script = format!(
            "!!document.querySelector({selector})",
            selector = js_literal(selector),
        );
        if client.evaluate(&script).await?.as_bool().unwrap_or(false) {
            client.click(selector, ctx.remaining()).await?;
            return Ok(());
        }
    }
    Err(ActionError::AnchorNotFound(
        "close_modal found no backdrop candidate".to_string(),
    ))
}
