//! Step primitive dispatch: one `execute_step` call per [`StepKind`],
//! delegating to the per-family modules below. `Loop` and `RunTest` are not
//! handled here — those are nesting constructs owned by the step runner.

mod assert;
mod click;
mod dialog;
mod frame_and_io;
mod http;
mod mock;
mod scroll;
mod select;
mod type_text;
mod wait;

pub use assert::*;
pub use click::*;
pub use dialog::*;
pub use frame_and_io::*;
pub use http::*;
pub use mock::*;
pub use scroll::*;
pub use select::*;
pub use type_text::*;
pub use wait::*;

use cdp_adapter::Cdp;
use orchestrator_core_types::{Step, StepKind};

use crate::{errors::ActionError, types::ActionReport, types::ExecCtx};

/// Dispatches one step to its primitive. `in_hook` affects only `evaluate`'s
/// implicit-assertion rule (spec: no assertion check inside a hook).
pub async fn execute_step(
    client: &dyn Cdp,
    step: &Step,
    ctx: &ExecCtx,
    in_hook: bool,
) -> Result<ActionReport, ActionError> {
    match &step.kind {
        StepKind::Evaluate { eval, as_name } => {
            execute_evaluate(client, ctx, eval, as_name.is_some(), in_hook).await
        }
        StepKind::Fill { selector, value } => execute_fill(client, ctx, selector, value).await,
        StepKind::Click { selector } => execute_click(client, ctx, selector).await,
        StepKind::Assert { expr, retry } => execute_assert(client, ctx, expr, retry.clone()).await,
        StepKind::Wait { ms } => execute_wait(client, ctx, *ms).await,
        StepKind::WaitFor {
            selector,
            timeout_ms,
        } => execute_wait_for(client, selector, timeout_ms.unwrap_or(5000)).await,
        StepKind::ConsoleCheck { levels } => execute_console_check(client, ctx, levels).await,
        StepKind::NetworkCheck { enabled } => execute_network_check(client, ctx, *enabled).await,
        StepKind::MockNetwork {
            pattern,
            status,
            body,
            delay_ms,
        } => execute_mock_network(client, ctx, pattern, *status, body.as_ref(), *delay_ms).await,
        StepKind::RunTest { .. } => Err(ActionError::Internal(
            "run_test is handled by the step runner, not execute_step".to_string(),
        )),
        StepKind::Screenshot { .. } => execute_screenshot(client, ctx).await,
        StepKind::Select { selector, value } => execute_select(client, ctx, selector, value).await,
        StepKind::PressKey { key, modifiers } => {
            execute_press_key(client, ctx, key, modifiers.as_deref().unwrap_or(&[])).await
        }
        StepKind::Hover { selector } => execute_hover(client, ctx, selector).await,
        StepKind::SwitchFrame { selector } => {
            execute_switch_frame(client, ctx, selector.as_deref()).await
        }
        StepKind::HandleDialog { action, text } => {
            execute_handle_dialog(client, ctx, *action, text.as_deref()).await
        }
        StepKind::HttpRequest {
            url,
            method,
            body,
            headers,
            ..
        } => {
            execute_http_request(ctx, url, method.as_deref(), body.as_ref(), headers.as_ref())
                .await
        }
        StepKind::Loop(_) => Err(ActionError::Internal(
            "loop is handled by the step runner, not execute_step".to_string(),
        )),
        StepKind::ScanInput { selector, value } => {
            execute_scan_input(client, ctx, selector, value).await
        }
        StepKind::FillForm { fields } => execute_fill_form(client, ctx, fields).await,
        StepKind::ScrollTo { selector } => execute_scroll_to(client, ctx, selector).await,
        StepKind::ClearInput { selector } => execute_clear_input(client, ctx, selector).await,
        StepKind::WaitForText {
            selector,
            text,
            match_mode,
            timeout_ms,
        } => {
            execute_wait_for_text(
                client,
                selector.as_deref().unwrap_or("body"),
                text,
                *match_mode,
                timeout_ms.unwrap_or(5000),
            )
            .await
        }
        StepKind::WaitForTextGone {
            selector,
            text,
            match_mode,
            timeout_ms,
        } => {
            execute_wait_for_text_gone(
                client,
                selector.as_deref().unwrap_or("body"),
                text,
                *match_mode,
                timeout_ms.unwrap_or(5000),
            )
            .await
        }
        StepKind::AssertText {
            selector,
            text,
            match_mode,
            absent,
            retry,
        } => {
            execute_assert_text(
                client,
                ctx,
                selector.as_deref(),
                text,
                *match_mode,
                *absent,
                retry.clone(),
            )
            .await
        }
        StepKind::ClickText {
            text,
            scope,
            match_mode,
        } => execute_click_text(client, ctx, text, scope.as_deref(), *match_mode).await,
        StepKind::ClickNth {
            index,
            text,
            selector,
            match_mode,
        } => {
            execute_click_nth(
                client,
                ctx,
                *index,
                text.as_deref(),
                selector.as_deref(),
                *match_mode,
            )
            .await
        }
        StepKind::Type {
            selector,
            text,
            clear_first,
            delay_ms,
        } => {
            execute_type(
                client,
                ctx,
                selector,
                text,
                *clear_first,
                delay_ms.unwrap_or(0),
            )
            .await
        }
        StepKind::ChooseDropdown {
            trigger_selector,
            text,
            timeout_ms,
        } => {
            execute_choose_dropdown(
                client,
                ctx,
                trigger_selector,
                text,
                timeout_ms.unwrap_or(5000),
            )
            .await
        }
        StepKind::ExpandMenu { group } => execute_expand_menu(client, ctx, group).await,
        StepKind::Toggle { label, state } => execute_toggle(client, ctx, label, *state).await,
        StepKind::CloseModal { strategy } => execute_close_modal(client, ctx, *strategy).await,
    }
}
