//! The Interpolator (spec component C1).
//!
//! Substitutes `$env.KEY` and `$vars.KEY` patterns inside string templates.
//! `$env` is resolved first, then `$vars`, so env values may not themselves
//! contain `$vars.` references intended for expansion (spec §4.1).

use std::collections::HashSet;

use once_cell_regex::ENV_OR_VARS_PATTERN;
use serde_json::Value;

use crate::step::{Step, StepKind};

/// Env mapping supplied by a [`crate::test_def::TestDefinition`] or a caller override.
pub type EnvMap = serde_json::Map<String, Value>;

/// Runtime variable store: name -> last value stored by a step's `as`.
pub type VariableStore = serde_json::Map<String, Value>;

/// Names currently mirrored into `window.__cdp_vars` on the page (spec §3 invariant 2).
///
/// Scoped to a single run; the Loop Executor is the only writer, and it must
/// pair every `mark` with an `unmark` on all exit paths (spec §4.1, §9).
#[derive(Default, Debug, Clone)]
pub struct BrowserSyncedVars(HashSet<String>);

impl BrowserSyncedVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, name: impl Into<String>) {
        self.0.insert(name.into());
    }

    pub fn unmark(&mut self, name: &str) {
        self.0.remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }
}

/// Renders a non-string JSON value the way `$env`/`$vars` substitution does
/// for values that are not browser-synced: numbers/booleans by value,
/// null/undefined as the literal words, objects/arrays JSON-serialized.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
        }
    }
}

/// The JS expression used to reference a browser-synced variable, per spec §4.1.
fn synced_reference(name: &str) -> String {
    format!("window.__cdp_vars[{}]", serde_json::to_string(name).unwrap())
}

/// Scans `template` left to right, substituting every `$env.<ident>` match
/// against `env`, then every `$vars.<ident>` match against `vars` (consulting
/// `synced` to decide between an inlined literal and a `window.__cdp_vars`
/// reference). Unknown names are left verbatim.
pub fn interpolate(
    template: &str,
    env: &EnvMap,
    vars: &VariableStore,
    synced: &BrowserSyncedVars,
) -> String {
    let after_env = substitute(template, "env", |name| {
        env.get(name).map(stringify)
    });
    substitute(&after_env, "vars", |name| {
        vars.get(name).map(|value| {
            if synced.contains(name) {
                synced_reference(name)
            } else {
                stringify(value)
            }
        })
    })
}

/// Returns a new step with every user-supplied string field passed through
/// [`interpolate`]. Structural fields (retry, headers, modifiers, numeric
/// durations, booleans, match modes, `as` names, a loop's child `steps`, and
/// a non-string `http_request.body`) are carried through unchanged. A loop's
/// children are deliberately *not* recursively interpolated here — the Loop
/// Executor interpolates them per iteration so loop-variable references see
/// the current iteration's values.
pub fn interpolate_step(
    step: &Step,
    env: &EnvMap,
    vars: &VariableStore,
    synced: &BrowserSyncedVars,
) -> Step {
    let i = |s: &str| interpolate(s, env, vars, synced);
    let io = |s: &Option<String>| s.as_ref().map(|s| i(s));

    let mut header = step.header.clone();
    header.label = io(&header.label);
    header.if_expr = io(&header.if_expr);
    header.comment = io(&header.comment);

    let kind = match &step.kind {
        StepKind::Evaluate { eval, as_name } => StepKind::Evaluate {
            eval: i(eval),
            as_name: as_name.clone(),
        },
        StepKind::Fill { selector, value } => StepKind::Fill {
            selector: i(selector),
            value: i(value),
        },
        StepKind::Click { selector } => StepKind::Click {
            selector: i(selector),
        },
        StepKind::Assert { expr, retry } => StepKind::Assert {
            expr: i(expr),
            retry: retry.clone(),
        },
        StepKind::Wait { ms } => StepKind::Wait { ms: *ms },
        StepKind::WaitFor {
            selector,
            timeout_ms,
        } => StepKind::WaitFor {
            selector: i(selector),
            timeout_ms: *timeout_ms,
        },
        StepKind::ConsoleCheck { levels } => StepKind::ConsoleCheck {
            levels: levels.clone(),
        },
        StepKind::NetworkCheck { enabled } => StepKind::NetworkCheck { enabled: *enabled },
        StepKind::MockNetwork {
            pattern,
            status,
            body,
            delay_ms,
        } => StepKind::MockNetwork {
            pattern: i(pattern),
            status: *status,
            body: interpolate_body(body, &i),
            delay_ms: *delay_ms,
        },
        StepKind::RunTest { test_id } => StepKind::RunTest {
            test_id: i(test_id),
        },
        StepKind::Screenshot { as_name } => StepKind::Screenshot {
            as_name: as_name.clone(),
        },
        StepKind::Select { selector, value } => StepKind::Select {
            selector: i(selector),
            value: i(value),
        },
        StepKind::PressKey { key, modifiers } => StepKind::PressKey {
            key: i(key),
            modifiers: modifiers.clone(),
        },
        StepKind::Hover { selector } => StepKind::Hover {
            selector: i(selector),
        },
        StepKind::SwitchFrame { selector } => StepKind::SwitchFrame {
            selector: io(selector),
        },
        StepKind::HandleDialog { action, text } => StepKind::HandleDialog {
            action: *action,
            text: io(text),
        },
        StepKind::HttpRequest {
            url,
            method,
            body,
            headers,
            as_name,
        } => StepKind::HttpRequest {
            url: i(url),
            method: method.clone(),
            body: interpolate_body(body, &i),
            headers: headers.clone(),
            as_name: as_name.clone(),
        },
        StepKind::Loop(spec) => StepKind::Loop(crate::step::LoopSpec {
            // `over` is evaluated once at loop entry, so interpolating it
            // here (with the vars snapshot current at dispatch time) is
            // equivalent to interpolating it inside the Loop Executor and
            // saves it doing so itself.
            over: io(&spec.over),
            // `while` is re-evaluated every iteration against that
            // iteration's vars (spec §4.5), so it must stay raw here — the
            // Loop Executor interpolates it fresh each time around.
            while_expr: spec.while_expr.clone(),
            // The Loop Executor interpolates these per iteration so
            // loop-variable references see the current iteration's values.
            steps: spec.steps.clone(),
            as_name: spec.as_name.clone(),
            index_as: spec.index_as.clone(),
            max: spec.max,
        }),
        StepKind::ScanInput { selector, value } => StepKind::ScanInput {
            selector: i(selector),
            value: i(value),
        },
        StepKind::FillForm { fields } => StepKind::FillForm {
            fields: fields
                .iter()
                .map(|f| crate::step::FormField {
                    selector: i(&f.selector),
                    value: i(&f.value),
                })
                .collect(),
        },
        StepKind::ScrollTo { selector } => StepKind::ScrollTo {
            selector: i(selector),
        },
        StepKind::ClearInput { selector } => StepKind::ClearInput {
            selector: i(selector),
        },
        StepKind::WaitForText {
            selector,
            text,
            match_mode,
            timeout_ms,
        } => StepKind::WaitForText {
            selector: io(selector),
            text: i(text),
            match_mode: *match_mode,
            timeout_ms: *timeout_ms,
        },
        StepKind::WaitForTextGone {
            selector,
            text,
            match_mode,
            timeout_ms,
        } => StepKind::WaitForTextGone {
            selector: io(selector),
            text: i(text),
            match_mode: *match_mode,
            timeout_ms: *timeout_ms,
        },
        StepKind::AssertText {
            selector,
            text,
            match_mode,
            absent,
            retry,
        } => StepKind::AssertText {
            selector: io(selector),
            text: i(text),
            match_mode: *match_mode,
            absent: *absent,
            retry: retry.clone(),
        },
        StepKind::ClickText {
            text,
            scope,
            match_mode,
        } => StepKind::ClickText {
            text: i(text),
            scope: io(scope),
            match_mode: *match_mode,
        },
        StepKind::ClickNth {
            index,
            text,
            selector,
            match_mode,
        } => StepKind::ClickNth {
            index: *index,
            text: io(text),
            selector: io(selector),
            match_mode: *match_mode,
        },
        StepKind::Type {
            selector,
            text,
            clear_first,
            delay_ms,
        } => StepKind::Type {
            selector: i(selector),
            text: i(text),
            clear_first: *clear_first,
            delay_ms: *delay_ms,
        },
        StepKind::ChooseDropdown {
            trigger_selector,
            text,
            timeout_ms,
        } => StepKind::ChooseDropdown {
            trigger_selector: i(trigger_selector),
            text: i(text),
            timeout_ms: *timeout_ms,
        },
        StepKind::ExpandMenu { group } => StepKind::ExpandMenu { group: i(group) },
        StepKind::Toggle { label, state } => StepKind::Toggle {
            label: i(label),
            state: *state,
        },
        StepKind::CloseModal { strategy } => StepKind::CloseModal {
            strategy: *strategy,
        },
    };

    Step { header, kind }
}

/// `http_request.body`/`mock_network.body`: a string body is itself a
/// template; a non-string (object/array/number/bool/null) body is structural
/// and passed through untouched.
fn interpolate_body(body: &Option<Value>, i: &impl Fn(&str) -> String) -> Option<Value> {
    match body {
        Some(Value::String(s)) => Some(Value::String(i(s))),
        other => other.clone(),
    }
}

fn substitute(template: &str, source: &str, resolve: impl Fn(&str) -> Option<String>) -> String {
    let pattern = ENV_OR_VARS_PATTERN.as_ref();
    let mut out = String::with_capacity(template.len());
    let mut last_end = 0;

    for caps in pattern.captures_iter(template) {
        let whole = caps.get(0).unwrap();
        let matched_source = caps.name("source").unwrap().as_str();
        let ident = caps.name("ident").unwrap().as_str();

        if matched_source != source {
            continue;
        }

        out.push_str(&template[last_end..whole.start()]);
        match resolve(ident) {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(whole.as_str()),
        }
        last_end = whole.end();
    }
    out.push_str(&template[last_end..]);
    out
}

mod once_cell_regex {
    use once_cell::sync::Lazy;
    use regex::Regex;

    /// Matches `$env.<ident>` or `$vars.<ident>` where `<ident>` is a letter
    /// or underscore followed by letters/digits/underscores.
    pub static ENV_OR_VARS_PATTERN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"\$(?P<source>env|vars)\.(?P<ident>[A-Za-z_][A-Za-z0-9_]*)").unwrap()
    });
}
