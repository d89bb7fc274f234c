//! The `StepDef` data model (spec §3): a tagged sum over step kinds,
//! discriminated by field *presence* rather than an explicit tag, plus the
//! header fields every step variant carries.
//!
//! Deserialization inspects the raw JSON object for the discriminator key
//! named in the spec's kind table (checked in table order) and dispatches
//! to the matching variant by hand — no reflection, no serde-derive tagging
//! tricks (spec §9 "Variants with optional common fields").

use std::collections::HashMap;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Fields shared by every step, regardless of kind (spec §3).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepHeader {
    pub label: Option<String>,
    pub if_expr: Option<String>,
    pub comment: Option<String>,
    pub capture_dom: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RetrySpec {
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for RetrySpec {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            timeout_ms: 5000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Contains,
    Exact,
    Regex,
}

impl Default for MatchMode {
    fn default() -> Self {
        MatchMode::Contains
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogAction {
    Accept,
    Dismiss,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseModalStrategy {
    Button,
    Escape,
    Backdrop,
    Auto,
}

impl Default for CloseModalStrategy {
    fn default() -> Self {
        CloseModalStrategy::Auto
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FormField {
    pub selector: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoopSpec {
    pub over: Option<String>,
    pub while_expr: Option<String>,
    pub steps: Vec<Step>,
    pub as_name: String,
    pub index_as: String,
    pub max: Option<u64>,
}

/// One step kind. Field names mirror spec §3's per-kind key columns.
#[derive(Clone, Debug, PartialEq)]
pub enum StepKind {
    Evaluate {
        eval: String,
        as_name: Option<String>,
    },
    Fill {
        selector: String,
        value: String,
    },
    Click {
        selector: String,
    },
    Assert {
        expr: String,
        retry: Option<RetrySpec>,
    },
    Wait {
        ms: u64,
    },
    WaitFor {
        selector: String,
        timeout_ms: Option<u64>,
    },
    ConsoleCheck {
        levels: Vec<String>,
    },
    NetworkCheck {
        enabled: bool,
    },
    MockNetwork {
        pattern: String,
        status: u16,
        body: Option<Value>,
        delay_ms: Option<u64>,
    },
    RunTest {
        test_id: String,
    },
    Screenshot {
        as_name: Option<String>,
    },
    Select {
        selector: String,
        value: String,
    },
    PressKey {
        key: String,
        modifiers: Option<Vec<String>>,
    },
    Hover {
        selector: String,
    },
    SwitchFrame {
        selector: Option<String>,
    },
    HandleDialog {
        action: DialogAction,
        text: Option<String>,
    },
    HttpRequest {
        url: String,
        method: Option<String>,
        body: Option<Value>,
        headers: Option<HashMap<String, String>>,
        as_name: Option<String>,
    },
    Loop(LoopSpec),
    ScanInput {
        selector: String,
        value: String,
    },
    FillForm {
        fields: Vec<FormField>,
    },
    ScrollTo {
        selector: String,
    },
    ClearInput {
        selector: String,
    },
    WaitForText {
        selector: Option<String>,
        text: String,
        match_mode: MatchMode,
        timeout_ms: Option<u64>,
    },
    WaitForTextGone {
        selector: Option<String>,
        text: String,
        match_mode: MatchMode,
        timeout_ms: Option<u64>,
    },
    AssertText {
        selector: Option<String>,
        text: String,
        match_mode: MatchMode,
        absent: bool,
        retry: Option<RetrySpec>,
    },
    ClickText {
        text: String,
        scope: Option<String>,
        match_mode: MatchMode,
    },
    ClickNth {
        index: usize,
        text: Option<String>,
        selector: Option<String>,
        match_mode: MatchMode,
    },
    Type {
        selector: String,
        text: String,
        clear_first: bool,
        delay_ms: Option<u64>,
    },
    ChooseDropdown {
        trigger_selector: String,
        text: String,
        timeout_ms: Option<u64>,
    },
    ExpandMenu {
        group: String,
    },
    Toggle {
        label: String,
        state: Option<bool>,
    },
    CloseModal {
        strategy: Option<CloseModalStrategy>,
    },
}

impl StepKind {
    /// Short machine name, used in diagnostics and `step:*` events.
    pub fn kind_name(&self) -> &'static str {
        match self {
            StepKind::Evaluate { .. } => "evaluate",
            StepKind::Fill { .. } => "fill",
            StepKind::Click { .. } => "click",
            StepKind::Assert { .. } => "assert",
            StepKind::Wait { .. } => "wait",
            StepKind::WaitFor { .. } => "wait_for",
            StepKind::ConsoleCheck { .. } => "console_check",
            StepKind::NetworkCheck { .. } => "network_check",
            StepKind::MockNetwork { .. } => "mock_network",
            StepKind::RunTest { .. } => "run_test",
            StepKind::Screenshot { .. } => "screenshot",
            StepKind::Select { .. } => "select",
            StepKind::PressKey { .. } => "press_key",
            StepKind::Hover { .. } => "hover",
            StepKind::SwitchFrame { .. } => "switch_frame",
            StepKind::HandleDialog { .. } => "handle_dialog",
            StepKind::HttpRequest { .. } => "http_request",
            StepKind::Loop(_) => "loop",
            StepKind::ScanInput { .. } => "scan_input",
            StepKind::FillForm { .. } => "fill_form",
            StepKind::ScrollTo { .. } => "scroll_to",
            StepKind::ClearInput { .. } => "clear_input",
            StepKind::WaitForText { .. } => "wait_for_text",
            StepKind::WaitForTextGone { .. } => "wait_for_text_gone",
            StepKind::AssertText { .. } => "assert_text",
            StepKind::ClickText { .. } => "click_text",
            StepKind::ClickNth { .. } => "click_nth",
            StepKind::Type { .. } => "type",
            StepKind::ChooseDropdown { .. } => "choose_dropdown",
            StepKind::ExpandMenu { .. } => "expand_menu",
            StepKind::Toggle { .. } => "toggle",
            StepKind::CloseModal { .. } => "close_modal",
        }
    }
}

/// The `as` binding a successful step would capture into the variable
/// store, if any. Only value-producing kinds bind one.
pub fn as_name_of(kind: &StepKind) -> Option<&str> {
    match kind {
        StepKind::Evaluate { as_name, .. } => as_name.as_deref(),
        StepKind::Screenshot { as_name } => as_name.as_deref(),
        StepKind::HttpRequest { as_name, .. } => as_name.as_deref(),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub header: StepHeader,
    pub kind: StepKind,
}

impl Step {
    pub fn label_or_kind(&self) -> String {
        self.header
            .label
            .clone()
            .unwrap_or_else(|| self.kind.kind_name().to_string())
    }
}

fn get_str(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn require_str(obj: &Map<String, Value>, key: &str, kind: &str) -> Result<String, String> {
    get_str(obj, key).ok_or_else(|| format!("{kind} step requires `{key}`"))
}

fn get_u64(obj: &Map<String, Value>, key: &str) -> Option<u64> {
    obj.get(key).and_then(Value::as_u64)
}

fn get_retry(obj: &Map<String, Value>) -> Option<RetrySpec> {
    let retry = obj.get("retry")?.as_object()?;
    Some(RetrySpec {
        interval_ms: get_u64(retry, "interval").unwrap_or(100),
        timeout_ms: get_u64(retry, "timeout").unwrap_or(5000),
    })
}

fn get_match_mode(obj: &Map<String, Value>) -> MatchMode {
    match obj.get("match").and_then(Value::as_str) {
        Some("exact") => MatchMode::Exact,
        Some("regex") => MatchMode::Regex,
        _ => MatchMode::Contains,
    }
}

fn parse_header(obj: &Map<String, Value>) -> StepHeader {
    StepHeader {
        label: get_str(obj, "label"),
        if_expr: get_str(obj, "if"),
        comment: get_str(obj, "comment"),
        capture_dom: obj.get("capture_dom").and_then(Value::as_bool).unwrap_or(false),
    }
}

fn parse_kind(obj: &Map<String, Value>) -> Result<StepKind, String> {
    // Checked in the order the spec's kind table lists discriminators.
    if obj.contains_key("eval") {
        return Ok(StepKind::Evaluate {
            eval: require_str(obj, "eval", "evaluate")?,
            as_name: get_str(obj, "as"),
        });
    }
    if obj.contains_key("fill") {
        let fill = obj
            .get("fill")
            .and_then(Value::as_object)
            .ok_or_else(|| "fill step requires `fill.selector` and `fill.value`".to_string())?;
        return Ok(StepKind::Fill {
            selector: require_str(fill, "selector", "fill")?,
            value: require_str(fill, "value", "fill")?,
        });
    }
    if obj.contains_key("click") {
        return Ok(StepKind::Click {
            selector: require_str(obj, "click", "click")?,
        });
    }
    if obj.contains_key("assert") {
        return Ok(StepKind::Assert {
            expr: require_str(obj, "assert", "assert")?,
            retry: get_retry(obj),
        });
    }
    if obj.contains_key("wait") && obj.get("wait").map(|v| v.is_number()).unwrap_or(false) {
        return Ok(StepKind::Wait {
            ms: get_u64(obj, "wait").unwrap_or(0),
        });
    }
    if obj.contains_key("wait_for") {
        return Ok(StepKind::WaitFor {
            selector: require_str(obj, "wait_for", "wait_for")?,
            timeout_ms: get_u64(obj, "timeout"),
        });
    }
    if obj.contains_key("console_check") {
        let levels = obj
            .get("console_check")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        return Ok(StepKind::ConsoleCheck { levels });
    }
    if obj.contains_key("network_check") {
        return Ok(StepKind::NetworkCheck {
            enabled: obj
                .get("network_check")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        });
    }
    if obj.contains_key("mock_network") {
        let mock = obj
            .get("mock_network")
            .and_then(Value::as_object)
            .ok_or_else(|| "mock_network step requires `match` and `status`".to_string())?;
        return Ok(StepKind::MockNetwork {
            pattern: require_str(mock, "match", "mock_network")?,
            status: get_u64(mock, "status").unwrap_or(200) as u16,
            body: mock.get("body").cloned(),
            delay_ms: get_u64(mock, "delay"),
        });
    }
    if obj.contains_key("run_test") {
        return Ok(StepKind::RunTest {
            test_id: require_str(obj, "run_test", "run_test")?,
        });
    }
    if obj.contains_key("screenshot") {
        return Ok(StepKind::Screenshot {
            as_name: get_str(obj, "as"),
        });
    }
    if obj.contains_key("select") {
        let select = obj
            .get("select")
            .and_then(Value::as_object)
            .ok_or_else(|| "select step requires `selector` and `value`".to_string())?;
        return Ok(StepKind::Select {
            selector: require_str(select, "selector", "select")?,
            value: require_str(select, "value", "select")?,
        });
    }
    if obj.contains_key("press_key") {
        let modifiers = obj.get("modifiers").and_then(Value::as_array).map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        });
        return Ok(StepKind::PressKey {
            key: require_str(obj, "press_key", "press_key")?,
            modifiers,
        });
    }
    if obj.contains_key("hover") {
        return Ok(StepKind::Hover {
            selector: require_str(obj, "hover", "hover")?,
        });
    }
    if obj.contains_key("switch_frame") {
        return Ok(StepKind::SwitchFrame {
            selector: get_str(obj, "selector"),
        });
    }
    if obj.contains_key("handle_dialog") {
        let action = match obj.get("handle_dialog").and_then(Value::as_str) {
            Some("accept") => DialogAction::Accept,
            Some("dismiss") => DialogAction::Dismiss,
            _ => return Err("handle_dialog step requires `accept` or `dismiss`".to_string()),
        };
        return Ok(StepKind::HandleDialog {
            action,
            text: get_str(obj, "text"),
        });
    }
    if obj.contains_key("http_request") {
        let req = obj
            .get("http_request")
            .and_then(Value::as_object)
            .ok_or_else(|| "http_request step requires `url`".to_string())?;
        let headers = req.get("headers").and_then(Value::as_object).map(|h| {
            h.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        });
        return Ok(StepKind::HttpRequest {
            url: require_str(req, "url", "http_request")?,
            method: get_str(req, "method"),
            body: req.get("body").cloned(),
            headers,
            as_name: get_str(req, "as"),
        });
    }
    if obj.contains_key("loop") {
        let loop_obj = obj
            .get("loop")
            .and_then(Value::as_object)
            .ok_or_else(|| "loop step requires `over` or `while`".to_string())?;
        let steps = loop_obj
            .get("steps")
            .and_then(Value::as_array)
            .ok_or_else(|| "loop step requires `steps`".to_string())?
            .iter()
            .map(|v| Step::try_from(v.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(StepKind::Loop(LoopSpec {
            over: get_str(loop_obj, "over"),
            while_expr: get_str(loop_obj, "while"),
            steps,
            as_name: get_str(loop_obj, "as").unwrap_or_else(|| "item".to_string()),
            index_as: get_str(loop_obj, "index_as").unwrap_or_else(|| "index".to_string()),
            max: get_u64(loop_obj, "max"),
        }));
    }
    if obj.contains_key("scan_input") {
        let s = obj
            .get("scan_input")
            .and_then(Value::as_object)
            .ok_or_else(|| "scan_input step requires `selector` and `value`".to_string())?;
        return Ok(StepKind::ScanInput {
            selector: require_str(s, "selector", "scan_input")?,
            value: require_str(s, "value", "scan_input")?,
        });
    }
    if obj.contains_key("fill_form") {
        let fields = obj
            .get("fill_form")
            .and_then(Value::as_array)
            .ok_or_else(|| "fill_form step requires an array of fields".to_string())?
            .iter()
            .map(|v| {
                let f = v
                    .as_object()
                    .ok_or_else(|| "fill_form field requires `selector` and `value`".to_string())?;
                Ok(FormField {
                    selector: require_str(f, "selector", "fill_form")?,
                    value: require_str(f, "value", "fill_form")?,
                })
            })
            .collect::<Result<Vec<_>, String>>()?;
        return Ok(StepKind::FillForm { fields });
    }
    if obj.contains_key("scroll_to") {
        return Ok(StepKind::ScrollTo {
            selector: require_str(obj, "scroll_to", "scroll_to")?,
        });
    }
    if obj.contains_key("clear_input") {
        return Ok(StepKind::ClearInput {
            selector: require_str(obj, "clear_input", "clear_input")?,
        });
    }
    if obj.contains_key("wait_for_text") {
        return Ok(StepKind::WaitForText {
            selector: get_str(obj, "selector"),
            text: require_str(obj, "wait_for_text", "wait_for_text")?,
            match_mode: get_match_mode(obj),
            timeout_ms: get_u64(obj, "timeout"),
        });
    }
    if obj.contains_key("wait_for_text_gone") {
        return Ok(StepKind::WaitForTextGone {
            selector: get_str(obj, "selector"),
            text: require_str(obj, "wait_for_text_gone", "wait_for_text_gone")?,
            match_mode: get_match_mode(obj),
            timeout_ms: get_u64(obj, "timeout"),
        });
    }
    if obj.contains_key("assert_text") {
        return Ok(StepKind::AssertText {
            selector: get_str(obj, "selector"),
            text: require_str(obj, "assert_text", "assert_text")?,
            match_mode: get_match_mode(obj),
            absent: obj.get("absent").and_then(Value::as_bool).unwrap_or(false),
            retry: get_retry(obj),
        });
    }
    if obj.contains_key("click_text") {
        return Ok(StepKind::ClickText {
            text: require_str(obj, "click_text", "click_text")?,
            scope: get_str(obj, "scope"),
            match_mode: get_match_mode(obj),
        });
    }
    if obj.contains_key("click_nth") {
        let index = obj
            .get("click_nth")
            .and_then(Value::as_u64)
            .ok_or_else(|| "click_nth step requires an integer index".to_string())? as usize;
        return Ok(StepKind::ClickNth {
            index,
            text: get_str(obj, "text"),
            selector: get_str(obj, "selector"),
            match_mode: get_match_mode(obj),
        });
    }
    if obj.contains_key("type") {
        let t = obj
            .get("type")
            .and_then(Value::as_object)
            .ok_or_else(|| "type step requires `selector` and `text`".to_string())?;
        return Ok(StepKind::Type {
            selector: require_str(t, "selector", "type")?,
            text: require_str(t, "text", "type")?,
            clear_first: t.get("clear_first").and_then(Value::as_bool).unwrap_or(false),
            delay_ms: get_u64(t, "delay"),
        });
    }
    if obj.contains_key("choose_dropdown") {
        let c = obj
            .get("choose_dropdown")
            .and_then(Value::as_object)
            .ok_or_else(|| "choose_dropdown step requires `selector` and `text`".to_string())?;
        return Ok(StepKind::ChooseDropdown {
            trigger_selector: require_str(c, "selector", "choose_dropdown")?,
            text: require_str(c, "text", "choose_dropdown")?,
            timeout_ms: get_u64(c, "timeout"),
        });
    }
    if obj.contains_key("expand_menu") {
        return Ok(StepKind::ExpandMenu {
            group: require_str(obj, "expand_menu", "expand_menu")?,
        });
    }
    if obj.contains_key("toggle") {
        return Ok(StepKind::Toggle {
            label: require_str(obj, "toggle", "toggle")?,
            state: obj.get("state").and_then(Value::as_bool),
        });
    }
    if obj.contains_key("close_modal") {
        let strategy = match obj.get("close_modal").and_then(Value::as_str) {
            Some("button") => Some(CloseModalStrategy::Button),
            Some("escape") => Some(CloseModalStrategy::Escape),
            Some("backdrop") => Some(CloseModalStrategy::Backdrop),
            _ => None,
        };
        return Ok(StepKind::CloseModal { strategy });
    }

    Err("step has no recognized discriminator field".to_string())
}

impl TryFrom<Value> for Step {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let obj = value
            .as_object()
            .ok_or_else(|| "step must be a JSON object".to_string())?;
        Ok(Step {
            header: parse_header(obj),
            kind: parse_kind(obj)?,
        })
    }
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Step::try_from(value).map_err(D::Error::custom)
    }
}

impl Serialize for Step {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl Step {
    /// Reconstructs the original-shaped JSON document for this step, used
    /// both for round-tripping and for embedding "the failing step
    /// definition" in a [`crate::outcome::TestResult`].
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        if let Some(label) = &self.header.label {
            obj.insert("label".into(), Value::String(label.clone()));
        }
        if let Some(if_expr) = &self.header.if_expr {
            obj.insert("if".into(), Value::String(if_expr.clone()));
        }
        if let Some(comment) = &self.header.comment {
            obj.insert("comment".into(), Value::String(comment.clone()));
        }
        if self.header.capture_dom {
            obj.insert("capture_dom".into(), Value::Bool(true));
        }

        match &self.kind {
            StepKind::Evaluate { eval, as_name } => {
                obj.insert("eval".into(), Value::String(eval.clone()));
                if let Some(a) = as_name {
                    obj.insert("as".into(), Value::String(a.clone()));
                }
            }
            StepKind::Fill { selector, value } => {
                obj.insert(
                    "fill".into(),
                    serde_json::json!({"selector": selector, "value": value}),
                );
            }
            StepKind::Click { selector } => {
                obj.insert("click".into(), Value::String(selector.clone()));
            }
            StepKind::Assert { expr, retry } => {
                obj.insert("assert".into(), Value::String(expr.clone()));
                if let Some(r) = retry {
                    obj.insert(
                        "retry".into(),
                        serde_json::json!({"interval": r.interval_ms, "timeout": r.timeout_ms}),
                    );
                }
            }
            StepKind::Wait { ms } => {
                obj.insert("wait".into(), Value::from(*ms));
            }
            StepKind::WaitFor {
                selector,
                timeout_ms,
            } => {
                obj.insert("wait_for".into(), Value::String(selector.clone()));
                if let Some(t) = timeout_ms {
                    obj.insert("timeout".into(), Value::from(*t));
                }
            }
            StepKind::ConsoleCheck { levels } => {
                obj.insert("console_check".into(), serde_json::json!(levels));
            }
            StepKind::NetworkCheck { enabled } => {
                obj.insert("network_check".into(), Value::Bool(*enabled));
            }
            StepKind::MockNetwork {
                pattern,
                status,
                body,
                delay_ms,
            } => {
                let mut m = serde_json::json!({"match": pattern, "status": status});
                if let Some(b) = body {
                    m["body"] = b.clone();
                }
                if let Some(d) = delay_ms {
                    m["delay"] = Value::from(*d);
                }
                obj.insert("mock_network".into(), m);
            }
            StepKind::RunTest { test_id } => {
                obj.insert("run_test".into(), Value::String(test_id.clone()));
            }
            StepKind::Screenshot { as_name } => {
                obj.insert("screenshot".into(), Value::Null);
                if let Some(a) = as_name {
                    obj.insert("as".into(), Value::String(a.clone()));
                }
            }
            StepKind::Select { selector, value } => {
                obj.insert(
                    "select".into(),
                    serde_json::json!({"selector": selector, "value": value}),
                );
            }
            StepKind::PressKey { key, modifiers } => {
                obj.insert("press_key".into(), Value::String(key.clone()));
                if let Some(m) = modifiers {
                    obj.insert("modifiers".into(), serde_json::json!(m));
                }
            }
            StepKind::Hover { selector } => {
                obj.insert("hover".into(), Value::String(selector.clone()));
            }
            StepKind::SwitchFrame { selector } => {
                obj.insert("switch_frame".into(), Value::Bool(true));
                if let Some(s) = selector {
                    obj.insert("selector".into(), Value::String(s.clone()));
                }
            }
            StepKind::HandleDialog { action, text } => {
                let action_str = match action {
                    DialogAction::Accept => "accept",
                    DialogAction::Dismiss => "dismiss",
                };
                obj.insert("handle_dialog".into(), Value::String(action_str.into()));
                if let Some(t) = text {
                    obj.insert("text".into(), Value::String(t.clone()));
                }
            }
            StepKind::HttpRequest {
                url,
                method,
                body,
                headers,
                as_name,
            } => {
                let mut h = serde_json::json!({"url": url});
                if let Some(m) = method {
                    h["method"] = Value::String(m.clone());
                }
                if let Some(b) = body {
                    h["body"] = b.clone();
                }
                if let Some(hd) = headers {
                    h["headers"] = serde_json::json!(hd);
                }
                if let Some(a) = as_name {
                    h["as"] = Value::String(a.clone());
                }
                obj.insert("http_request".into(), h);
            }
            StepKind::Loop(spec) => {
                let mut l = Map::new();
                if let Some(o) = &spec.over {
                    l.insert("over".into(), Value::String(o.clone()));
                }
                if let Some(w) = &spec.while_expr {
                    l.insert("while".into(), Value::String(w.clone()));
                }
                l.insert(
                    "steps".into(),
                    Value::Array(spec.steps.iter().map(Step::to_json).collect()),
                );
                l.insert("as".into(), Value::String(spec.as_name.clone()));
                l.insert("index_as".into(), Value::String(spec.index_as.clone()));
                if let Some(m) = spec.max {
                    l.insert("max".into(), Value::from(m));
                }
                obj.insert("loop".into(), Value::Object(l));
            }
            StepKind::ScanInput { selector, value } => {
                obj.insert(
                    "scan_input".into(),
                    serde_json::json!({"selector": selector, "value": value}),
                );
            }
            StepKind::FillForm { fields } => {
                obj.insert(
                    "fill_form".into(),
                    Value::Array(
                        fields
                            .iter()
                            .map(|f| serde_json::json!({"selector": f.selector, "value": f.value}))
                            .collect(),
                    ),
                );
            }
            StepKind::ScrollTo { selector } => {
                obj.insert("scroll_to".into(), Value::String(selector.clone()));
            }
            StepKind::ClearInput { selector } => {
                obj.insert("clear_input".into(), Value::String(selector.clone()));
            }
            StepKind::WaitForText {
                selector,
                text,
                match_mode,
                timeout_ms,
            } => {
                obj.insert("wait_for_text".into(), Value::String(text.clone()));
                insert_text_helper_fields(&mut obj, selector, match_mode, timeout_ms);
            }
            StepKind::WaitForTextGone {
                selector,
                text,
                match_mode,
                timeout_ms,
            } => {
                obj.insert("wait_for_text_gone".into(), Value::String(text.clone()));
                insert_text_helper_fields(&mut obj, selector, match_mode, timeout_ms);
            }
            StepKind::AssertText {
                selector,
                text,
                match_mode,
                absent,
                retry,
            } => {
                obj.insert("assert_text".into(), Value::String(text.clone()));
                insert_text_helper_fields(&mut obj, selector, match_mode, &None);
                if *absent {
                    obj.insert("absent".into(), Value::Bool(true));
                }
                if let Some(r) = retry {
                    obj.insert(
                        "retry".into(),
                        serde_json::json!({"interval": r.interval_ms, "timeout": r.timeout_ms}),
                    );
                }
            }
            StepKind::ClickText {
                text,
                scope,
                match_mode,
            } => {
                obj.insert("click_text".into(), Value::String(text.clone()));
                if let Some(s) = scope {
                    obj.insert("scope".into(), Value::String(s.clone()));
                }
                obj.insert("match".into(), serde_json::json!(match_mode));
            }
            StepKind::ClickNth {
                index,
                text,
                selector,
                match_mode,
            } => {
                obj.insert("click_nth".into(), Value::from(*index as u64));
                if let Some(t) = text {
                    obj.insert("text".into(), Value::String(t.clone()));
                }
                if let Some(s) = selector {
                    obj.insert("selector".into(), Value::String(s.clone()));
                }
                obj.insert("match".into(), serde_json::json!(match_mode));
            }
            StepKind::Type {
                selector,
                text,
                clear_first,
                delay_ms,
            } => {
                let mut t = serde_json::json!({"selector": selector, "text": text});
                if *clear_first {
                    t["clear_first"] = Value::Bool(true);
                }
                if let Some(d) = delay_ms {
                    t["delay"] = Value::from(*d);
                }
                obj.insert("type".into(), t);
            }
            StepKind::ChooseDropdown {
                trigger_selector,
                text,
                timeout_ms,
            } => {
                let mut c = serde_json::json!({"selector": trigger_selector, "text": text});
                if let Some(t) = timeout_ms {
                    c["timeout"] = Value::from(*t);
                }
                obj.insert("choose_dropdown".into(), c);
            }
            StepKind::ExpandMenu { group } => {
                obj.insert("expand_menu".into(), Value::String(group.clone()));
            }
            StepKind::Toggle { label, state } => {
                obj.insert("toggle".into(), Value::String(label.clone()));
                if let Some(s) = state {
                    obj.insert("state".into(), Value::Bool(*s));
                }
            }
            StepKind::CloseModal { strategy } => {
                let s = strategy.unwrap_or_default();
                obj.insert("close_modal".into(), serde_json::json!(s));
            }
        }

        Value::Object(obj)
    }
}

fn insert_text_helper_fields(
    obj: &mut Map<String, Value>,
    selector: &Option<String>,
    match_mode: &MatchMode,
    timeout_ms: &Option<u64>,
) {
    if let Some(s) = selector {
        obj.insert("selector".into(), Value::String(s.clone()));
    }
    obj.insert("match".into(), serde_json::json!(match_mode));
    if let Some(t) = timeout_ms {
        obj.insert("timeout".into(), Value::from(*t));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn evaluate_step_roundtrip() {
        let raw = json!({"eval": "40+2", "as": "x"});
        let step = Step::try_from(raw).unwrap();
        assert!(matches!(step.kind, StepKind::Evaluate { .. }));
        assert_eq!(step.kind.kind_name(), "evaluate");
        let back = step.to_json();
        assert_eq!(back["eval"], "40+2");
        assert_eq!(back["as"], "x");
    }

    #[test]
    fn loop_step_parses_nested_steps() {
        let raw = json!({
            "loop": {
                "over": "$vars.xs",
                "as": "n",
                "steps": [{"eval": "$vars.n*2", "as": "doubled"}]
            }
        });
        let step = Step::try_from(raw).unwrap();
        match step.kind {
            StepKind::Loop(spec) => {
                assert_eq!(spec.over.as_deref(), Some("$vars.xs"));
                assert_eq!(spec.as_name, "n");
                assert_eq!(spec.index_as, "index");
                assert_eq!(spec.steps.len(), 1);
            }
            _ => panic!("expected loop"),
        }
    }

    #[test]
    fn missing_discriminator_is_an_error() {
        let raw = json!({"label": "nothing here"});
        assert!(Step::try_from(raw).is_err());
    }

    #[test]
    fn click_nth_parses_index() {
        let raw = json!({"click_nth": 2, "text": "Delete"});
        let step = Step::try_from(raw).unwrap();
        match step.kind {
            StepKind::ClickNth { index, .. } => assert_eq!(index, 2),
            _ => panic!("expected click_nth"),
        }
    }
}
