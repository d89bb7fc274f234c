//! The Step Runner: drives one [`TestDefinition`] end to end against a
//! fresh CDP tab, and the Loop Executor nested inside it.
//!
//! Mirrors the upstream flow executor's shape — a single recursive dispatch
//! function, `#[async_recursion]` at every self-referential edge, a race
//! against a wall-clock deadline — generalized from a graph of `FlowNode`s
//! to this crate's simpler "hooks, then a linear step list" model.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_recursion::async_recursion;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use cdp_adapter::{Cdp, CdpClient};
use chrono::{DateTime, Utc};
use orchestrator_core_types::{
    as_name_of, interpolate, interpolate_step, FailureDetail, LoopBreadcrumb, LoopSpec, RunContext,
    RunId, RunStatus, Step, StepKind, StepOutcome, StepStatus, TestDefinition, TestResult,
};
use orchestrator_event_bus::{RunEvent, RunEventBus};
use serde_json::Value;
use step_primitives::{execute_step, ActionError, ActionReport, ExecCtx};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::errors::FlowError;
use crate::types::{
    hook_phase, RunOptions, TestRepository, DEFAULT_RUN_TIMEOUT_MS, DEFAULT_VERIFY_PAGE_TIMEOUT_MS,
    VERIFY_PAGE_POLL_MS,
};

/// Runs `def` to completion: connects a tab, works through before-hooks,
/// navigation, `verify_page`, the main step list, and after-hooks, then
/// tears the tab down regardless of outcome.
///
/// `repo` resolves `run_test` targets; pass `None` for the event bus if the
/// caller has no interest in live progress.
pub async fn run_test(
    def: &TestDefinition,
    repo: Arc<dyn TestRepository>,
    options: RunOptions,
    bus: Option<Arc<RunEventBus>>,
) -> Result<TestResult, FlowError> {
    let started_at = Utc::now();
    let run_id = RunId::new(started_at);

    let mut env = def.env.clone();
    for (k, v) in std::env::vars() {
        env.entry(k).or_insert(Value::String(v));
    }

    let mut inputs = def.inputs.clone();
    for (k, v) in options.initial_vars.clone() {
        inputs.insert(k, v);
    }

    // Mark the root test's own id on the call stack up front, so a nested
    // `run_test` graph that loops back around to it is caught as a cycle
    // rather than recursing until the run timeout kills it.
    let ctx = RunContext::new(run_id.clone(), env, inputs).with_root(def.id.clone());

    emit(&bus, RunEvent::RunStart { run_id: run_id.clone(), test_id: def.id.clone() }).await;

    let client = Arc::new(CdpClient::with_session(
        options.cdp.clone(),
        options.session_id.clone(),
        options.registry.clone(),
        options.create_tab,
    ));
    let run_timeout = Duration::from_millis(def.timeout_ms.unwrap_or(DEFAULT_RUN_TIMEOUT_MS));

    let outcome = match tokio::time::timeout(
        run_timeout,
        execute_run(def, &repo, client.clone(), ctx, &bus),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(_) => RunOutcome {
            steps: Vec::new(),
            status: RunStatus::Failed,
            failure: Some(FailureDetail {
                step_label: "<run>".to_string(),
                step_def: Value::Null,
                message: format!("test `{}` timed out after {}ms", def.id, run_timeout.as_millis()),
            }),
            dom_snapshot: BTreeMap::new(),
            screenshot_base64: None,
        },
    };

    let mut console = client.console_messages();
    let mut network = client.network_responses();
    let _ = client.close().await;

    console.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    network.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let result = TestResult {
        test_id: def.id.clone(),
        run_id: run_id.0.clone(),
        status: outcome.status,
        steps: outcome.steps,
        console,
        network,
        dom_snapshot: outcome.dom_snapshot,
        screenshot_base64: outcome.screenshot_base64,
        failure: outcome.failure,
        started_at,
        finished_at: Utc::now(),
    };

    match result.status {
        RunStatus::Passed => info!(test_id = %def.id, run_id = %run_id.0, "test passed"),
        RunStatus::Failed => warn!(test_id = %def.id, run_id = %run_id.0, "test failed"),
    }

    emit(
        &bus,
        RunEvent::RunComplete { run_id, result: Box::new(result.clone()) },
    )
    .await;

    Ok(result)
}

struct RunOutcome {
    steps: Vec<StepOutcome>,
    status: RunStatus,
    failure: Option<FailureDetail>,
    dom_snapshot: BTreeMap<usize, String>,
    screenshot_base64: Option<String>,
}

async fn execute_run(
    def: &TestDefinition,
    repo: &Arc<dyn TestRepository>,
    client: Arc<CdpClient>,
    mut ctx: RunContext,
    bus: &Option<Arc<RunEventBus>>,
) -> RunOutcome {
    let mut steps_out: Vec<StepOutcome> = Vec::new();
    let mut dom_snapshot: BTreeMap<usize, String> = BTreeMap::new();

    if let Err(err) = cdp_adapter::start(client.clone()).await {
        return RunOutcome {
            steps: steps_out,
            status: RunStatus::Failed,
            failure: Some(FailureDetail {
                step_label: "<connect>".to_string(),
                step_def: Value::Null,
                message: err.to_string(),
            }),
            dom_snapshot,
            screenshot_base64: None,
        };
    }

    // Hook phase 0: `http_request` before-hooks, no browser needed yet.
    if let Err(failure) =
        run_before_phase(client.as_ref(), repo, &def.before, 0, &mut ctx, bus, &mut steps_out).await
    {
        run_after_hooks(client.as_ref(), repo, &def.after, &mut ctx, bus, &mut steps_out).await;
        let screenshot_base64 = capture_screenshot(client.as_ref()).await;
        return RunOutcome {
            steps: steps_out,
            status: RunStatus::Failed,
            failure: Some(failure),
            dom_snapshot,
            screenshot_base64,
        };
    }

    // Hook phase 1: `mock_network` before-hooks, registered before navigation.
    if let Err(failure) =
        run_before_phase(client.as_ref(), repo, &def.before, 1, &mut ctx, bus, &mut steps_out).await
    {
        run_after_hooks(client.as_ref(), repo, &def.after, &mut ctx, bus, &mut steps_out).await;
        let screenshot_base64 = capture_screenshot(client.as_ref()).await;
        return RunOutcome {
            steps: steps_out,
            status: RunStatus::Failed,
            failure: Some(failure),
            dom_snapshot,
            screenshot_base64,
        };
    }

    if let Some(url) = &def.url {
        let url = interpolate(url, &ctx.env, &ctx.vars, &ctx.synced);
        let deadline = Duration::from_millis(def.timeout_ms.unwrap_or(DEFAULT_RUN_TIMEOUT_MS));
        if let Err(err) = client.navigate(&url, deadline).await {
            run_after_hooks(client.as_ref(), repo, &def.after, &mut ctx, bus, &mut steps_out).await;
            let screenshot_base64 = capture_screenshot(client.as_ref()).await;
            return RunOutcome {
                steps: steps_out,
                status: RunStatus::Failed,
                failure: Some(FailureDetail {
                    step_label: "<navigate>".to_string(),
                    step_def: Value::String(url),
                    message: err.to_string(),
                }),
                dom_snapshot,
                screenshot_base64,
            };
        }
    }

    if let Some(expr) = &def.verify_page {
        let expr = interpolate(expr, &ctx.env, &ctx.vars, &ctx.synced);
        let deadline = tokio::time::Instant::now() + Duration::from_millis(DEFAULT_VERIFY_PAGE_TIMEOUT_MS);
        loop {
            let satisfied = client
                .evaluate(&expr)
                .await
                .map(|v| is_truthy(&v))
                .unwrap_or(false);
            if satisfied {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                run_after_hooks(client.as_ref(), repo, &def.after, &mut ctx, bus, &mut steps_out).await;
                let screenshot_base64 = capture_screenshot(client.as_ref()).await;
                return RunOutcome {
                    steps: steps_out,
                    status: RunStatus::Failed,
                    failure: Some(FailureDetail {
                        step_label: "<verify_page>".to_string(),
                        step_def: Value::String(expr.clone()),
                        message: format!(
                            "verify_page `{expr}` did not become true within {}ms",
                            DEFAULT_VERIFY_PAGE_TIMEOUT_MS
                        ),
                    }),
                    dom_snapshot,
                    screenshot_base64,
                };
            }
            sleep(Duration::from_millis(VERIFY_PAGE_POLL_MS)).await;
        }
    }

    // Hook phase 2: everything else, after navigation has happened.
    if let Err(failure) =
        run_before_phase(client.as_ref(), repo, &def.before, 2, &mut ctx, bus, &mut steps_out).await
    {
        run_after_hooks(client.as_ref(), repo, &def.after, &mut ctx, bus, &mut steps_out).await;
        let screenshot_base64 = capture_screenshot(client.as_ref()).await;
        return RunOutcome {
            steps: steps_out,
            status: RunStatus::Failed,
            failure: Some(failure),
            dom_snapshot,
            screenshot_base64,
        };
    }

    let (start_index, resume_warning) = def.start_index();
    if let Some(warning) = resume_warning {
        warn!(test_id = %def.id, "{warning}");
    }
    let step_deadline = Duration::from_millis(def.timeout_ms.unwrap_or(DEFAULT_RUN_TIMEOUT_MS));

    for (i, raw_step) in def.steps.iter().enumerate() {
        if i < start_index {
            continue;
        }

        let outcome = execute_one(
            client.as_ref(),
            repo,
            raw_step,
            &mut ctx,
            step_deadline,
            false,
            bus,
        )
        .await;

        if raw_step.header.capture_dom || outcome.status == StepStatus::Failed {
            if let Ok(snapshot) = client.dom_snapshot().await {
                dom_snapshot.insert(i, snapshot);
            }
        }

        let failed = outcome.status == StepStatus::Failed;
        let label = outcome.full_label();
        let message = outcome.error.clone().unwrap_or_default();
        steps_out.push(outcome);

        if failed {
            run_after_hooks(client.as_ref(), repo, &def.after, &mut ctx, bus, &mut steps_out).await;
            let screenshot_base64 = capture_screenshot(client.as_ref()).await;
            return RunOutcome {
                steps: steps_out,
                status: RunStatus::Failed,
                failure: Some(FailureDetail {
                    step_label: label,
                    step_def: raw_step.to_json(),
                    message,
                }),
                dom_snapshot,
                screenshot_base64,
            };
        }
    }

    run_after_hooks(client.as_ref(), repo, &def.after, &mut ctx, bus, &mut steps_out).await;

    RunOutcome {
        steps: steps_out,
        status: RunStatus::Passed,
        failure: None,
        dom_snapshot,
        screenshot_base64: None,
    }
}

/// Best-effort screenshot for a failed run (spec §7 "if available").
async fn capture_screenshot(client: &dyn Cdp) -> Option<String> {
    match client.screenshot().await {
        Ok(png) => Some(STANDARD.encode(png)),
        Err(err) => {
            warn!(error = %err, "failed to capture screenshot after run failure");
            None
        }
    }
}

async fn run_before_phase(
    client: &dyn Cdp,
    repo: &Arc<dyn TestRepository>,
    hooks: &[Step],
    phase: u8,
    ctx: &mut RunContext,
    bus: &Option<Arc<RunEventBus>>,
    steps_out: &mut Vec<StepOutcome>,
) -> Result<(), FailureDetail> {
    let deadline = Duration::from_millis(DEFAULT_RUN_TIMEOUT_MS);
    for raw_step in hooks.iter().filter(|s| hook_phase(&s.kind) == phase) {
        let outcome = execute_one(client, repo, raw_step, ctx, deadline, true, bus).await;
        let failed = outcome.status == StepStatus::Failed;
        let label = outcome.full_label();
        let message = outcome.error.clone().unwrap_or_default();
        steps_out.push(outcome);
        if failed {
            return Err(FailureDetail { step_label: label, step_def: raw_step.to_json(), message });
        }
    }
    Ok(())
}

/// Errors in after-hooks are swallowed: a run's final status is decided by
/// the main body, not cleanup.
async fn run_after_hooks(
    client: &dyn Cdp,
    repo: &Arc<dyn TestRepository>,
    hooks: &[Step],
    ctx: &mut RunContext,
    bus: &Option<Arc<RunEventBus>>,
    steps_out: &mut Vec<StepOutcome>,
) {
    let deadline = Duration::from_millis(DEFAULT_RUN_TIMEOUT_MS);
    for raw_step in hooks.iter() {
        let outcome = execute_one(client, repo, raw_step, ctx, deadline, true, bus).await;
        steps_out.push(outcome);
    }
}

/// Interpolates, evaluates the `if` guard, dispatches, and records the
/// result for one step — the unit both the main loop and the Loop Executor
/// recurse through. `Loop` and `RunTest` are special-cased here since
/// [`step_primitives::execute_step`] explicitly rejects both.
#[async_recursion]
async fn execute_one(
    client: &dyn Cdp,
    repo: &Arc<dyn TestRepository>,
    raw_step: &Step,
    ctx: &mut RunContext,
    remaining: Duration,
    in_hook: bool,
    bus: &Option<Arc<RunEventBus>>,
) -> StepOutcome {
    let step = interpolate_step(raw_step, &ctx.env, &ctx.vars, &ctx.synced);
    let label = step.label_or_kind();
    let kind_name = step.kind.kind_name().to_string();

    emit(
        bus,
        RunEvent::StepStart {
            run_id: ctx.run_id.clone(),
            step_label: label.clone(),
            kind: kind_name.clone(),
        },
    )
    .await;

    let started_at = Utc::now();

    if let Some(cond) = &step.header.if_expr {
        let truthy = client
            .evaluate(cond)
            .await
            .map(|v| is_truthy(&v))
            .unwrap_or(false);
        if !truthy {
            let outcome = StepOutcome {
                step_label: label,
                kind: kind_name,
                status: StepStatus::Skipped,
                value: None,
                error: None,
                started_at,
                finished_at: Utc::now(),
                loop_context: Vec::new(),
            };
            emit(bus, RunEvent::StepPass { run_id: ctx.run_id.clone(), outcome: outcome.clone() }).await;
            return outcome;
        }
    }

    let outcome = match &step.kind {
        StepKind::Loop(spec) => {
            execute_loop(client, repo, spec, ctx, remaining, in_hook, bus, started_at, label, kind_name).await
        }
        StepKind::RunTest { test_id } => {
            match execute_nested_test(client, repo, test_id, ctx, remaining, bus).await {
                Ok(()) => StepOutcome {
                    step_label: label,
                    kind: kind_name,
                    status: StepStatus::Passed,
                    value: None,
                    error: None,
                    started_at,
                    finished_at: Utc::now(),
                    loop_context: Vec::new(),
                },
                Err(message) => StepOutcome {
                    step_label: label,
                    kind: kind_name,
                    status: StepStatus::Failed,
                    value: None,
                    error: Some(message),
                    started_at,
                    finished_at: Utc::now(),
                    loop_context: Vec::new(),
                },
            }
        }
        _ => {
            let exec_ctx = ExecCtx::new(remaining);
            let result = execute_step(client, &step, &exec_ctx, in_hook).await;
            report_to_outcome(result, ctx, &step, label, kind_name, started_at)
        }
    };

    match outcome.status {
        StepStatus::Failed => {
            emit(bus, RunEvent::StepFail { run_id: ctx.run_id.clone(), outcome: outcome.clone() }).await
        }
        _ => emit(bus, RunEvent::StepPass { run_id: ctx.run_id.clone(), outcome: outcome.clone() }).await,
    }

    outcome
}

fn report_to_outcome(
    result: Result<ActionReport, ActionError>,
    ctx: &mut RunContext,
    step: &Step,
    label: String,
    kind_name: String,
    started_at: DateTime<Utc>,
) -> StepOutcome {
    match result {
        Ok(report) if report.ok => {
            if let Some(name) = as_name_of(&step.kind) {
                ctx.set_var(name, report.value.clone().unwrap_or(Value::Null));
            }
            StepOutcome {
                step_label: label,
                kind: kind_name,
                status: StepStatus::Passed,
                value: report.value,
                error: None,
                started_at,
                finished_at: report.finished_at,
                loop_context: Vec::new(),
            }
        }
        Ok(report) => StepOutcome {
            step_label: label,
            kind: kind_name,
            status: StepStatus::Failed,
            value: None,
            error: report.error,
            started_at,
            finished_at: report.finished_at,
            loop_context: Vec::new(),
        },
        Err(err) => StepOutcome {
            step_label: label,
            kind: kind_name,
            status: StepStatus::Failed,
            value: None,
            error: Some(err.to_string()),
            started_at,
            finished_at: Utc::now(),
            loop_context: Vec::new(),
        },
    }
}

/// JS-truthy enough for `if`/`while` guards and `verify_page`: everything is
/// truthy except `false`, `null`, `0`, and `""` (spec §4.1).
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Writes `window.__cdp_vars[name] = value` into the page so synced loop
/// variables are visible to `over`/`while` expressions evaluated in-page.
async fn mirror_to_page(client: &dyn Cdp, name: &str, value: &Value) -> Result<(), cdp_adapter::AdapterError> {
    let expr = format!(
        "(() => {{ window.__cdp_vars = window.__cdp_vars || {{}}; window.__cdp_vars[{}] = {}; return true; }})()",
        serde_json::to_string(name).unwrap_or_else(|_| "\"\"".to_string()),
        serde_json::to_string(value).unwrap_or_else(|_| "null".to_string()),
    );
    client.evaluate(&expr).await.map(|_| ())
}

struct LoopFailure {
    message: String,
    loop_context: Vec<LoopBreadcrumb>,
}

/// Runs the body of a loop iteration: each step interpolated on entry,
/// stopping at the first failure (spec §4.5).
#[async_recursion]
async fn run_loop_body(
    client: &dyn Cdp,
    repo: &Arc<dyn TestRepository>,
    steps: &[Step],
    ctx: &mut RunContext,
    remaining: Duration,
    in_hook: bool,
    bus: &Option<Arc<RunEventBus>>,
) -> Result<(), LoopFailure> {
    for raw_step in steps {
        let outcome = execute_one(client, repo, raw_step, ctx, remaining, in_hook, bus).await;
        if outcome.status == StepStatus::Failed {
            return Err(LoopFailure {
                message: format!("{}: {}", outcome.step_label, outcome.error.unwrap_or_default()),
                loop_context: outcome.loop_context,
            });
        }
    }
    Ok(())
}

fn failed_loop_outcome(
    label: String,
    kind_name: String,
    started_at: DateTime<Utc>,
    message: String,
) -> StepOutcome {
    StepOutcome {
        step_label: label,
        kind: kind_name,
        status: StepStatus::Failed,
        value: None,
        error: Some(message),
        started_at,
        finished_at: Utc::now(),
        loop_context: Vec::new(),
    }
}

/// The Loop Executor (spec §4.5): `over` iterates a browser-evaluated array,
/// `while` iterates until a condition goes falsy or `max` is hit. Both modes
/// mirror the loop variable(s) into `window.__cdp_vars`, mark them synced for
/// the duration of the iteration, and unmark on every exit path.
#[async_recursion]
async fn execute_loop(
    client: &dyn Cdp,
    repo: &Arc<dyn TestRepository>,
    spec: &LoopSpec,
    ctx: &mut RunContext,
    remaining: Duration,
    in_hook: bool,
    bus: &Option<Arc<RunEventBus>>,
    started_at: DateTime<Utc>,
    label: String,
    kind_name: String,
) -> StepOutcome {
    if let Some(over_expr) = &spec.over {
        // Already interpolated once by `interpolate_step` at dispatch time;
        // `over` only runs once per loop so there is no fresher snapshot of
        // vars to re-apply here.
        let array_value = match client.evaluate(over_expr).await {
            Ok(v) => v,
            Err(err) => return failed_loop_outcome(label, kind_name, started_at, err.to_string()),
        };
        let items = match array_value.as_array() {
            Some(items) => items.clone(),
            None => {
                return failed_loop_outcome(
                    label,
                    kind_name,
                    started_at,
                    format!("loop `over` expression `{over_expr}` did not evaluate to an array"),
                )
            }
        };
        let total = items.len();
        let count = spec.max.map(|m| (m as usize).min(total)).unwrap_or(total);

        let array_ref_name = format!("{}__array", spec.as_name);
        if let Err(err) = mirror_to_page(client, &array_ref_name, &Value::Array(items.clone())).await {
            return failed_loop_outcome(label, kind_name, started_at, err.to_string());
        }

        for i in 0..count {
            ctx.set_var(spec.as_name.clone(), items[i].clone());
            ctx.set_var(spec.index_as.clone(), Value::from(i as u64));

            if let Err(err) = mirror_to_page(client, &spec.as_name, &items[i]).await {
                return failed_loop_outcome(label, kind_name, started_at, err.to_string());
            }
            if let Err(err) = mirror_to_page(client, &spec.index_as, &Value::from(i as u64)).await {
                return failed_loop_outcome(label, kind_name, started_at, err.to_string());
            }
            ctx.synced.mark(spec.as_name.clone());
            ctx.synced.mark(spec.index_as.clone());

            let result = run_loop_body(client, repo, &spec.steps, ctx, remaining, in_hook, bus).await;

            ctx.synced.unmark(&spec.as_name);
            ctx.synced.unmark(&spec.index_as);

            if let Err(mut failure) = result {
                failure.loop_context.insert(
                    0,
                    LoopBreadcrumb { var_name: spec.as_name.clone(), index: i, total: Some(total) },
                );
                return StepOutcome {
                    step_label: label,
                    kind: kind_name,
                    status: StepStatus::Failed,
                    value: None,
                    error: Some(failure.message),
                    started_at,
                    finished_at: Utc::now(),
                    loop_context: failure.loop_context,
                };
            }
        }

        StepOutcome {
            step_label: label,
            kind: kind_name,
            status: StepStatus::Passed,
            value: None,
            error: None,
            started_at,
            finished_at: Utc::now(),
            loop_context: Vec::new(),
        }
    } else if let Some(while_expr) = spec.while_expr.as_deref() {
        let max = spec.max.unwrap_or(0);
        let mut i = 0u64;

        while i < max {
            let interpolated = interpolate(while_expr, &ctx.env, &ctx.vars, &ctx.synced);
            let cond = client.evaluate(&interpolated).await.map(|v| is_truthy(&v)).unwrap_or(false);
            if !cond {
                break;
            }

            ctx.set_var(spec.index_as.clone(), Value::from(i));
            if let Err(err) = mirror_to_page(client, &spec.index_as, &Value::from(i)).await {
                return failed_loop_outcome(label, kind_name, started_at, err.to_string());
            }
            ctx.synced.mark(spec.index_as.clone());

            let result = run_loop_body(client, repo, &spec.steps, ctx, remaining, in_hook, bus).await;

            ctx.synced.unmark(&spec.index_as);

            if let Err(mut failure) = result {
                failure.loop_context.insert(
                    0,
                    LoopBreadcrumb { var_name: spec.index_as.clone(), index: i as usize, total: None },
                );
                return StepOutcome {
                    step_label: label,
                    kind: kind_name,
                    status: StepStatus::Failed,
                    value: None,
                    error: Some(failure.message),
                    started_at,
                    finished_at: Utc::now(),
                    loop_context: failure.loop_context,
                };
            }

            i += 1;
        }

        StepOutcome {
            step_label: label,
            kind: kind_name,
            status: StepStatus::Passed,
            value: None,
            error: None,
            started_at,
            finished_at: Utc::now(),
            loop_context: Vec::new(),
        }
    } else {
        failed_loop_outcome(label, kind_name, started_at, "loop step requires `over` or `while`".to_string())
    }
}

/// `run_test` as a step: resolves `test_id` through the repository, enters a
/// child [`RunContext`] (cycle-checked), navigates to the sub-test's own URL
/// if it has one, and runs its main steps — not its hooks — against the
/// same tab (spec §4.7).
#[async_recursion]
async fn execute_nested_test(
    client: &dyn Cdp,
    repo: &Arc<dyn TestRepository>,
    test_id: &str,
    ctx: &mut RunContext,
    remaining: Duration,
    bus: &Option<Arc<RunEventBus>>,
) -> Result<(), String> {
    let mut child_ctx = ctx.enter_test(test_id).map_err(|err| err.to_string())?;

    let def = repo
        .get_test(test_id)
        .await
        .ok_or_else(|| format!("test `{test_id}` not found in the test repository"))?;

    if let Some(url) = &def.url {
        let url = interpolate(url, &child_ctx.env, &child_ctx.vars, &child_ctx.synced);
        client.navigate(&url, remaining).await.map_err(|err| err.to_string())?;
    }

    for (i, raw_step) in def.steps.iter().enumerate() {
        let outcome = execute_one(client, repo, raw_step, &mut child_ctx, remaining, false, bus).await;
        if outcome.status == StepStatus::Failed {
            return Err(format!(
                "Sub-test \"{test_id}\" failed at step {i} ({}): {}",
                outcome.full_label(),
                outcome.error.unwrap_or_default()
            ));
        }
    }

    Ok(())
}

async fn emit(bus: &Option<Arc<RunEventBus>>, event: RunEvent) {
    if let Some(bus) = bus {
        let _ = bus.publish(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cdp_adapter::{AdapterError, DialogAction};
    use orchestrator_core_types::{CompiledMockRule, ConsoleRecord, EnvMap, NetworkRecord};
    use serde_json::{json, Map};

    #[test]
    fn is_truthy_matches_js_semantics() {
        assert!(!is_truthy(&Value::Bool(false)));
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(0)));
        assert!(is_truthy(&json!(0.5)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("0")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!({})));
    }

    #[test]
    fn as_name_of_only_covers_value_producing_kinds() {
        let eval = Step::try_from(json!({"eval": "1+1", "as": "x"})).unwrap();
        assert_eq!(as_name_of(&eval.kind), Some("x"));

        let click = Step::try_from(json!({"click": "#go"})).unwrap();
        assert_eq!(as_name_of(&click.kind), None);
    }

    /// A [`Cdp`] that panics if called, for tests where the behavior under
    /// test should never need the browser (e.g. cycle detection, which must
    /// fail before any CDP call is made).
    struct UnusedCdp;

    #[async_trait]
    impl Cdp for UnusedCdp {
        async fn connect(&self) -> Result<(), AdapterError> {
            unreachable!("test does not expect a connect call")
        }
        async fn navigate(&self, _url: &str, _deadline: Duration) -> Result<(), AdapterError> {
            unreachable!("test does not expect a navigate call")
        }
        async fn evaluate(&self, _expression: &str) -> Result<Value, AdapterError> {
            unreachable!("test does not expect an evaluate call")
        }
        async fn fill(&self, _selector: &str, _value: &str, _deadline: Duration) -> Result<(), AdapterError> {
            unreachable!()
        }
        async fn click(&self, _selector: &str, _deadline: Duration) -> Result<(), AdapterError> {
            unreachable!()
        }
        async fn hover(&self, _selector: &str, _deadline: Duration) -> Result<(), AdapterError> {
            unreachable!()
        }
        async fn select(&self, _selector: &str, _value: &str, _deadline: Duration) -> Result<(), AdapterError> {
            unreachable!()
        }
        async fn press_key(&self, _key: &str, _modifiers: &[String]) -> Result<(), AdapterError> {
            unreachable!()
        }
        async fn switch_frame(&self, _selector: Option<&str>, _deadline: Duration) -> Result<(), AdapterError> {
            unreachable!()
        }
        async fn handle_dialog(&self, _action: DialogAction, _text: Option<&str>) -> Result<(), AdapterError> {
            unreachable!()
        }
        async fn add_mock_rule(&self, _rule: CompiledMockRule) -> Result<(), AdapterError> {
            unreachable!()
        }
        async fn dom_snapshot(&self) -> Result<String, AdapterError> {
            unreachable!()
        }
        async fn screenshot(&self) -> Result<Vec<u8>, AdapterError> {
            unreachable!()
        }
        fn console_messages(&self) -> Vec<ConsoleRecord> {
            Vec::new()
        }
        fn network_responses(&self) -> Vec<NetworkRecord> {
            Vec::new()
        }
        async fn close(&self) -> Result<(), AdapterError> {
            unreachable!()
        }
    }

    /// Two tests that each `run_test` the other, with no URL and no browser
    /// interaction needed to reach the cycle (spec §8 S4).
    struct MutuallyRecursiveRepo;

    #[async_trait]
    impl TestRepository for MutuallyRecursiveRepo {
        async fn get_test(&self, id: &str) -> Option<TestDefinition> {
            let other = if id == "a" { "b" } else { "a" };
            Some(TestDefinition {
                id: id.to_string(),
                url: None,
                before: Vec::new(),
                steps: vec![Step::try_from(json!({"run_test": other})).unwrap()],
                after: Vec::new(),
                env: Map::new(),
                inputs: Map::new(),
                verify_page: None,
                resume_from: None,
                timeout_ms: None,
            })
        }
    }

    #[tokio::test]
    async fn nested_run_test_cycle_is_rejected() {
        let client = UnusedCdp;
        let repo: Arc<dyn TestRepository> = Arc::new(MutuallyRecursiveRepo);
        let mut ctx =
            RunContext::new(RunId::new(Utc::now()), EnvMap::new(), Map::new()).with_root("a");

        let err = execute_nested_test(&client, &repo, "b", &mut ctx, Duration::from_secs(5), &None)
            .await
            .unwrap_err();

        let lowered = err.to_lowercase();
        assert!(lowered.contains("cycle"), "expected a cycle error, got: {err}");
        assert!(err.contains('a'), "expected the cycling test id in the message, got: {err}");
    }
}
