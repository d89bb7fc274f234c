//! The CDP Tab Client: drives one browser tab end to end for the duration
//! of a single run. Built directly on [`crate::transport::ChromiumTransport`]
//! the way the upstream adapter's `CdpAdapter` drives its transport, but
//! narrowed to a single attached page — a run never juggles more than one
//! top-level tab, only frames within it (`switch_frame`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use orchestrator_core_types::{
    CompiledMockRule, ConsoleLevel, ConsoleRecord, NetworkRecord, NullSessionRegistry, SessionEntry,
    SessionRegistry, TargetId,
};
use parking_lot::Mutex as SyncMutex;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::CdpConfig;
use crate::dom_snapshot;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::events::RawEvent;
use crate::ids::PageId;
use crate::mock::{fulfill_params, MockDecision, MockInterceptor};
use crate::transport::{CdpTransport, ChromiumTransport, CommandTarget, TransportEvent};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DialogAction {
    Accept,
    Dismiss,
}

/// The capability surface the rest of the orchestrator drives a tab
/// through. A trait so step-primitives/step-flow tests can swap in a fake.
#[async_trait]
pub trait Cdp: Send + Sync {
    async fn connect(&self) -> Result<(), AdapterError>;
    async fn navigate(&self, url: &str, deadline: Duration) -> Result<(), AdapterError>;
    async fn evaluate(&self, expression: &str) -> Result<Value, AdapterError>;
    async fn fill(&self, selector: &str, value: &str, deadline: Duration) -> Result<(), AdapterError>;
    async fn click(&self, selector: &str, deadline: Duration) -> Result<(), AdapterError>;
    async fn hover(&self, selector: &str, deadline: Duration) -> Result<(), AdapterError>;
    async fn select(&self, selector: &str, value: &str, deadline: Duration) -> Result<(), AdapterError>;
    async fn press_key(&self, key: &str, modifiers: &[String]) -> Result<(), AdapterError>;
    async fn switch_frame(&self, selector: Option<&str>, deadline: Duration) -> Result<(), AdapterError>;
    async fn handle_dialog(&self, action: DialogAction, text: Option<&str>) -> Result<(), AdapterError>;
    async fn add_mock_rule(&self, rule: CompiledMockRule) -> Result<(), AdapterError>;
    async fn dom_snapshot(&self) -> Result<String, AdapterError>;
    async fn screenshot(&self) -> Result<Vec<u8>, AdapterError>;
    fn console_messages(&self) -> Vec<ConsoleRecord>;
    fn network_responses(&self) -> Vec<NetworkRecord>;
    async fn close(&self) -> Result<(), AdapterError>;
}

#[derive(Default)]
struct FrameState {
    /// CDP `frameId` of the frame most recently switched into, `None` = main frame.
    frame_id: Option<String>,
    /// The selector used to switch there, needed to compute the iframe's
    /// on-page offset when resolving click/hover coordinates inside it.
    selector: Option<String>,
}

pub struct CdpClient {
    cfg: CdpConfig,
    transport: Arc<dyn CdpTransport>,
    page: PageId,
    bus: broadcast::Sender<RawEvent>,
    session: Mutex<Option<String>>,
    frame: Mutex<FrameState>,
    /// `frameId -> Runtime execution context id`, filled in from
    /// `Runtime.executionContextCreated` events as frames attach.
    contexts: SyncMutex<HashMap<String, i64>>,
    mock: Arc<MockInterceptor>,
    console_log: SyncMutex<Vec<ConsoleRecord>>,
    network_log: SyncMutex<Vec<NetworkRecord>>,
    pending_dialog: SyncMutex<bool>,
    event_task: Mutex<Option<JoinHandle<()>>>,
    /// Caller-supplied session identifier this run wants to reuse a target
    /// under (spec §4.2). `None` skips straight to the non-session branches.
    session_id: Option<String>,
    registry: Arc<dyn SessionRegistry>,
    /// Whether to mint an isolated tab when no session id resolves a
    /// target, rather than attaching to whatever page already exists.
    create_tab: bool,
    /// The CDP target currently attached to, and whether this client
    /// created it (and so must close it on `close()`).
    target_id: SyncMutex<Option<String>>,
    owns_target: SyncMutex<bool>,
}

impl CdpClient {
    /// A client with no session affinity: always opens and owns a fresh
    /// isolated tab, closing it on `close()`. The common case for one-shot
    /// runs and tests.
    pub fn new(cfg: CdpConfig) -> Self {
        Self::with_session(cfg, None, Arc::new(NullSessionRegistry), true)
    }

    /// Full target-selection control (spec §4.2): `session_id` + `registry`
    /// drive the session-reuse branches, `create_tab` governs the fallback
    /// when no session id is supplied.
    pub fn with_session(
        cfg: CdpConfig,
        session_id: Option<String>,
        registry: Arc<dyn SessionRegistry>,
        create_tab: bool,
    ) -> Self {
        let (bus, _rx) = broadcast::channel(1024);
        Self {
            transport: Arc::new(ChromiumTransport::new(cfg.clone())),
            cfg,
            page: PageId::new(),
            bus,
            session: Mutex::new(None),
            frame: Mutex::new(FrameState::default()),
            contexts: SyncMutex::new(HashMap::new()),
            mock: Arc::new(MockInterceptor::new()),
            console_log: SyncMutex::new(Vec::new()),
            network_log: SyncMutex::new(Vec::new()),
            pending_dialog: SyncMutex::new(false),
            event_task: Mutex::new(None),
            session_id,
            registry,
            create_tab,
            target_id: SyncMutex::new(None),
            owns_target: SyncMutex::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RawEvent> {
        self.bus.subscribe()
    }

    #[cfg(test)]
    fn with_transport(
        transport: Arc<dyn CdpTransport>,
        session_id: Option<String>,
        registry: Arc<dyn SessionRegistry>,
        create_tab: bool,
    ) -> Self {
        let (bus, _rx) = broadcast::channel(1024);
        Self {
            transport,
            cfg: CdpConfig::default(),
            page: PageId::new(),
            bus,
            session: Mutex::new(None),
            frame: Mutex::new(FrameState::default()),
            contexts: SyncMutex::new(HashMap::new()),
            mock: Arc::new(MockInterceptor::new()),
            console_log: SyncMutex::new(Vec::new()),
            network_log: SyncMutex::new(Vec::new()),
            pending_dialog: SyncMutex::new(false),
            event_task: Mutex::new(None),
            session_id,
            registry,
            create_tab,
            target_id: SyncMutex::new(None),
            owns_target: SyncMutex::new(false),
        }
    }

    async fn list_targets(&self) -> Result<Vec<Value>, AdapterError> {
        let response = self.send_browser("Target.getTargets", json!({})).await?;
        Ok(response
            .get("targetInfos")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn target_is_alive(&self, target_id: &str) -> bool {
        self.list_targets()
            .await
            .unwrap_or_default()
            .iter()
            .any(|info| info.get("targetId").and_then(Value::as_str) == Some(target_id))
    }

    /// First existing page-type target, for the no-session default branch.
    async fn first_page_target(&self) -> Result<Option<String>, AdapterError> {
        let targets = self.list_targets().await?;
        Ok(targets
            .iter()
            .find(|info| info.get("type").and_then(Value::as_str) == Some("page"))
            .and_then(|info| info.get("targetId").and_then(Value::as_str))
            .map(str::to_string))
    }

    async fn create_blank_tab(&self) -> Result<String, AdapterError> {
        let response = self
            .send_browser("Target.createTarget", json!({"url": "about:blank"}))
            .await?;
        response
            .get("targetId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal).with_hint("createTarget returned no targetId")
            })
    }

    /// Spec §4.2's four-branch target-selection algorithm: reuse a live
    /// session target, else create one and register it for next time, else
    /// create an isolated tab if the caller asked for one, else attach to
    /// whatever page already exists. Returns the chosen target id and
    /// whether this client now owns it (and so must close it on `close()`).
    async fn select_target(&self) -> Result<(String, bool), AdapterError> {
        if let Some(session_id) = &self.session_id {
            if let Some(existing) = self.registry.get_target_id(session_id).await {
                if self.target_is_alive(&existing.0).await {
                    return Ok((existing.0, false));
                }
            }

            let target_id = self.create_blank_tab().await?;
            self.registry
                .register(
                    session_id,
                    SessionEntry {
                        target_id: TargetId(target_id.clone()),
                    },
                )
                .await;
            return Ok((target_id, false));
        }

        if self.create_tab {
            let target_id = self.create_blank_tab().await?;
            return Ok((target_id, true));
        }

        if let Some(target_id) = self.first_page_target().await? {
            return Ok((target_id, false));
        }

        // Nothing to attach to after all; fall back to opening one.
        let target_id = self.create_blank_tab().await?;
        Ok((target_id, true))
    }

    async fn session_target(&self) -> Result<CommandTarget, AdapterError> {
        let guard = self.session.lock().await;
        guard
            .clone()
            .map(CommandTarget::Session)
            .ok_or_else(|| AdapterError::new(AdapterErrorKind::Internal).with_hint("no attached session"))
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        let target = self.session_target().await?;
        self.transport.send_command(target, method, params).await
    }

    async fn send_browser(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        self.transport
            .send_command(CommandTarget::Browser, method, params)
            .await
    }

    async fn current_context_id(&self) -> Option<i64> {
        let frame = self.frame.lock().await;
        match &frame.frame_id {
            None => None,
            Some(id) => self.contexts.lock().get(id).copied(),
        }
    }

    /// `(offset_x, offset_y)` of the currently switched-into frame relative
    /// to the top page, `(0, 0)` when at the main frame.
    async fn frame_offset(&self) -> Result<(f64, f64), AdapterError> {
        let selector = {
            let frame = self.frame.lock().await;
            frame.selector.clone()
        };
        let Some(selector) = selector else {
            return Ok((0.0, 0.0));
        };
        let selector_literal = serde_json::to_string(&selector)
            .map_err(|e| AdapterError::new(AdapterErrorKind::Internal).with_hint(e.to_string()))?;
        let expr = format!(
            "(() => {{ const el = document.querySelector({selector_literal}); if (!el) return null; const r = el.getBoundingClientRect(); return {{x: r.left, y: r.top}}; }})()"
        );
        let value = self.eval_raw(&expr, None).await?;
        let x = value.get("x").and_then(Value::as_f64).unwrap_or(0.0);
        let y = value.get("y").and_then(Value::as_f64).unwrap_or(0.0);
        Ok((x, y))
    }

    async fn eval_raw(&self, expression: &str, context_id: Option<i64>) -> Result<Value, AdapterError> {
        let mut params = serde_json::Map::new();
        params.insert("expression".into(), Value::String(expression.to_string()));
        params.insert("returnByValue".into(), Value::Bool(true));
        params.insert("awaitPromise".into(), Value::Bool(true));
        if let Some(id) = context_id {
            params.insert("contextId".into(), json!(id));
        }

        let response = self.send("Runtime.evaluate", Value::Object(params)).await?;

        if let Some(details) = response.get("exceptionDetails") {
            let message = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(Value::as_str)
                .or_else(|| details.get("text").and_then(Value::as_str))
                .unwrap_or("unknown evaluation error")
                .to_string();
            return Err(AdapterError::new(AdapterErrorKind::EvaluationFailed)
                .with_hint(message)
                .with_data(details.clone()));
        }

        Ok(response
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn eval_in_frame(&self, expression: &str) -> Result<Value, AdapterError> {
        let context_id = self.current_context_id().await;
        self.eval_raw(expression, context_id).await
    }

    /// Polls until `selector` resolves to a visible element, returning its
    /// center point in top-page coordinates.
    async fn locate(&self, selector: &str, deadline: Duration) -> Result<(f64, f64), AdapterError> {
        let selector_literal = serde_json::to_string(&selector)
            .map_err(|e| AdapterError::new(AdapterErrorKind::Internal).with_hint(e.to_string()))?;
        let expr = format!(
            "(() => {{ const el = document.querySelector({selector_literal}); if (!el) return null; const r = el.getBoundingClientRect(); return {{x: r.left + r.width / 2, y: r.top + r.height / 2}}; }})()"
        );

        let deadline_at = Instant::now() + deadline;
        loop {
            let value = self.eval_in_frame(&expr).await?;
            if let Some(obj) = value.as_object() {
                let x = obj.get("x").and_then(Value::as_f64).unwrap_or(0.0);
                let y = obj.get("y").and_then(Value::as_f64).unwrap_or(0.0);
                let (ox, oy) = self.frame_offset().await?;
                return Ok((x + ox, y + oy));
            }
            if Instant::now() >= deadline_at {
                return Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
                    .with_hint(format!("element not found for selector `{selector}`")));
            }
            sleep(Duration::from_millis(100)).await;
        }
    }

    async fn dispatch_mouse_move_and_click(&self, x: f64, y: f64, click: bool) -> Result<(), AdapterError> {
        self.send(
            "Input.dispatchMouseEvent",
            json!({"type": "mouseMoved", "x": x, "y": y}),
        )
        .await?;

        if !click {
            return Ok(());
        }

        self.send(
            "Input.dispatchMouseEvent",
            json!({"type": "mousePressed", "x": x, "y": y, "button": "left", "buttons": 1, "clickCount": 1}),
        )
        .await?;
        self.send(
            "Input.dispatchMouseEvent",
            json!({"type": "mouseReleased", "x": x, "y": y, "button": "left", "buttons": 1, "clickCount": 1}),
        )
        .await?;
        Ok(())
    }

    fn spawn_event_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                match this.transport.next_event().await {
                    Some(event) => this.handle_event(event).await,
                    None => {
                        debug!(target: "cdp-client", "transport event stream ended");
                        break;
                    }
                }
            }
        })
    }

    async fn handle_event(&self, event: TransportEvent) {
        match event.method.as_str() {
            "Runtime.executionContextCreated" => self.on_context_created(event.params),
            "Runtime.consoleAPICalled" => self.on_console(event.params),
            "Page.frameNavigated" => self.on_frame_navigated(event.params),
            "Network.responseReceived" => self.on_network_response(event.params, false),
            "Page.javascriptDialogOpening" => self.on_dialog_opening(event.params),
            "Fetch.requestPaused" => self.on_request_paused(event.params).await,
            _ => {}
        }
    }

    fn on_context_created(&self, params: Value) {
        let Some(frame_id) = params
            .get("context")
            .and_then(|c| c.get("auxData"))
            .and_then(|a| a.get("frameId"))
            .and_then(Value::as_str)
        else {
            return;
        };
        let Some(context_id) = params
            .get("context")
            .and_then(|c| c.get("id"))
            .and_then(Value::as_i64)
        else {
            return;
        };
        self.contexts.lock().insert(frame_id.to_string(), context_id);
    }

    fn on_console(&self, params: Value) {
        let level = params
            .get("type")
            .and_then(Value::as_str)
            .map(ConsoleLevel::from_cdp_type)
            .unwrap_or(ConsoleLevel::Log);
        let text = params
            .get("args")
            .and_then(Value::as_array)
            .map(|args| {
                args.iter()
                    .filter_map(|a| {
                        a.get("value")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .or_else(|| a.get("description").and_then(Value::as_str).map(str::to_string))
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();
        let record = ConsoleRecord {
            level,
            text,
            timestamp: Utc::now(),
        };
        self.console_log.lock().push(record.clone());
        let _ = self.bus.send(RawEvent::Console {
            page: self.page,
            level: format!("{:?}", record.level),
            text: record.text,
            ts: 0,
        });
    }

    fn on_frame_navigated(&self, params: Value) {
        let Some(url) = params
            .get("frame")
            .and_then(|f| f.get("url"))
            .and_then(Value::as_str)
        else {
            return;
        };
        let _ = self.bus.send(RawEvent::PageNavigated {
            page: self.page,
            url: url.to_string(),
            ts: 0,
        });
    }

    fn on_network_response(&self, params: Value, mocked: bool) {
        let url = params
            .get("response")
            .and_then(|r| r.get("url"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let method = params
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_string();
        let status = params
            .get("response")
            .and_then(|r| r.get("status"))
            .and_then(Value::as_u64)
            .map(|s| s as u16);
        let record = NetworkRecord {
            url,
            method,
            status,
            mocked,
            timestamp: Utc::now(),
        };
        self.network_log.lock().push(record);
    }

    fn on_dialog_opening(&self, params: Value) {
        *self.pending_dialog.lock() = true;
        let message = params
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let dialog_type = params
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("alert")
            .to_string();
        let _ = self.bus.send(RawEvent::JavascriptDialogOpening {
            page: self.page,
            message,
            dialog_type,
        });
    }

    async fn on_request_paused(&self, params: Value) {
        let Some(request_id) = params.get("requestId").and_then(Value::as_str) else {
            return;
        };
        let url = params
            .get("request")
            .and_then(|r| r.get("url"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let method = params
            .get("request")
            .and_then(|r| r.get("method"))
            .and_then(Value::as_str)
            .unwrap_or("GET");

        match self.mock.decide(url, method) {
            MockDecision::PassThrough => {
                let _ = self
                    .send_browser(
                        "Fetch.continueRequest",
                        json!({"requestId": request_id}),
                    )
                    .await;
            }
            MockDecision::Fulfill {
                status,
                body,
                headers,
                delay_ms,
            } => {
                if let Some(ms) = delay_ms {
                    sleep(Duration::from_millis(ms)).await;
                }
                let record = NetworkRecord {
                    url: url.to_string(),
                    method: method.to_string(),
                    status: Some(status),
                    mocked: true,
                    timestamp: Utc::now(),
                };
                self.network_log.lock().push(record);
                let _ = self
                    .send_browser(
                        "Fetch.fulfillRequest",
                        fulfill_params(request_id, status, &body, &headers),
                    )
                    .await;
            }
        }
    }
}

#[async_trait]
impl Cdp for CdpClient {
    async fn connect(&self) -> Result<(), AdapterError> {
        self.transport.start().await?;

        let (target_id, owns_target) = self.select_target().await?;

        let attach = self
            .send_browser(
                "Target.attachToTarget",
                json!({"targetId": target_id, "flatten": true}),
            )
            .await?;
        let session_id = attach
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal).with_hint("attachToTarget returned no sessionId")
            })?
            .to_string();
        *self.session.lock().await = Some(session_id);
        *self.target_id.lock() = Some(target_id);
        *self.owns_target.lock() = owns_target;

        for (method, params) in [
            ("Page.enable", json!({})),
            ("Runtime.enable", json!({})),
            ("Network.enable", json!({})),
            (
                "Fetch.enable",
                json!({"patterns": [{"urlPattern": "*"}]}),
            ),
        ] {
            self.send(method, params).await?;
        }

        Ok(())
    }

    async fn navigate(&self, url: &str, deadline: Duration) -> Result<(), AdapterError> {
        self.send("Page.navigate", json!({"url": url})).await?;
        *self.frame.lock().await = FrameState::default();

        let deadline_at = Instant::now() + deadline;
        loop {
            let state = self
                .eval_raw("document.readyState", None)
                .await?
                .as_str()
                .unwrap_or_default()
                .to_string();
            if state == "complete" || state == "interactive" {
                return Ok(());
            }
            if Instant::now() >= deadline_at {
                return Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                    .with_hint(format!("page did not finish loading `{url}`"))
                    .retriable(true));
            }
            sleep(Duration::from_millis(100)).await;
        }
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, AdapterError> {
        self.eval_in_frame(expression).await
    }

    async fn fill(&self, selector: &str, value: &str, deadline: Duration) -> Result<(), AdapterError> {
        let (x, y) = self.locate(selector, deadline).await?;
        self.dispatch_mouse_move_and_click(x, y, true).await?;

        let selector_literal = serde_json::to_string(&selector)
            .map_err(|e| AdapterError::new(AdapterErrorKind::Internal).with_hint(e.to_string()))?;
        let value_literal = serde_json::to_string(&value)
            .map_err(|e| AdapterError::new(AdapterErrorKind::Internal).with_hint(e.to_string()))?;
        let expr = format!(
            "(() => {{ const el = document.querySelector({selector_literal}); if (!el) return false; el.focus(); el.value = {value_literal}; el.dispatchEvent(new Event('input', {{bubbles: true}})); el.dispatchEvent(new Event('change', {{bubbles: true}})); return true; }})()"
        );
        let ok = self.eval_in_frame(&expr).await?.as_bool().unwrap_or(false);
        if !ok {
            return Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
                .with_hint(format!("fill target not found for selector `{selector}`")));
        }
        Ok(())
    }

    async fn click(&self, selector: &str, deadline: Duration) -> Result<(), AdapterError> {
        let (x, y) = self.locate(selector, deadline).await?;
        self.dispatch_mouse_move_and_click(x, y, true).await
    }

    async fn hover(&self, selector: &str, deadline: Duration) -> Result<(), AdapterError> {
        let (x, y) = self.locate(selector, deadline).await?;
        self.dispatch_mouse_move_and_click(x, y, false).await
    }

    async fn select(&self, selector: &str, value: &str, deadline: Duration) -> Result<(), AdapterError> {
        self.locate(selector, deadline).await?;
        let selector_literal = serde_json::to_string(&selector)
            .map_err(|e| AdapterError::new(AdapterErrorKind::Internal).with_hint(e.to_string()))?;
        let value_literal = serde_json::to_string(&value)
            .map_err(|e| AdapterError::new(AdapterErrorKind::Internal).with_hint(e.to_string()))?;
        let expr = format!(
            r#"(() => {{
    const el = document.querySelector({selector_literal});
    if (!el) return 'not-found';
    const options = Array.from(el.options || []);
    let option = options.find(o => o.value === {value_literal});
    if (!option) option = options.find(o => o.text === {value_literal});
    if (!option) return 'option-missing';
    el.value = option.value;
    el.dispatchEvent(new Event('input', {{bubbles: true}}));
    el.dispatchEvent(new Event('change', {{bubbles: true}}));
    return 'selected';
}})()"#
        );
        match self.eval_in_frame(&expr).await?.as_str() {
            Some("selected") => Ok(()),
            Some("option-missing") => Err(AdapterError::new(AdapterErrorKind::OptionNotFound)
                .with_hint(format!("no option `{value}` in `{selector}`"))),
            _ => Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
                .with_hint(format!("select target not found for selector `{selector}`"))),
        }
    }

    async fn press_key(&self, key: &str, modifiers: &[String]) -> Result<(), AdapterError> {
        let modifier_bits = modifiers.iter().fold(0i64, |acc, m| {
            acc | match m.to_ascii_lowercase().as_str() {
                "alt" => 1,
                "ctrl" | "control" => 2,
                "meta" | "cmd" | "command" => 4,
                "shift" => 8,
                _ => 0,
            }
        });

        for event_type in ["keyDown", "keyUp"] {
            self.send(
                "Input.dispatchKeyEvent",
                json!({
                    "type": event_type,
                    "key": key,
                    "modifiers": modifier_bits,
                }),
            )
            .await?;
        }
        Ok(())
    }

    async fn switch_frame(&self, selector: Option<&str>, deadline: Duration) -> Result<(), AdapterError> {
        let Some(selector) = selector else {
            *self.frame.lock().await = FrameState::default();
            return Ok(());
        };

        self.locate(selector, deadline).await?;

        let selector_literal = serde_json::to_string(&selector)
            .map_err(|e| AdapterError::new(AdapterErrorKind::Internal).with_hint(e.to_string()))?;
        let root = self.send("DOM.getDocument", json!({"depth": 0})).await?;
        let root_node_id = root
            .get("root")
            .and_then(|r| r.get("nodeId"))
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal).with_hint("DOM.getDocument returned no root")
            })?;

        let query = self
            .send(
                "DOM.querySelector",
                json!({"nodeId": root_node_id, "selector": serde_json::from_str::<Value>(&selector_literal).unwrap_or(Value::String(selector.to_string()))}),
            )
            .await?;
        let node_id = query.get("nodeId").and_then(Value::as_i64).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::TargetNotFound)
                .with_hint(format!("iframe not found for selector `{selector}`"))
        })?;

        let described = self
            .send("DOM.describeNode", json!({"nodeId": node_id, "depth": 0}))
            .await?;
        let frame_id = described
            .get("node")
            .and_then(|n| n.get("frameId"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::TargetNotFound)
                    .with_hint(format!("selector `{selector}` is not an iframe element"))
            })?
            .to_string();

        // The execution context for a freshly attached frame may not have
        // been reported yet; give it a short grace period.
        let context_deadline = Instant::now() + Duration::from_secs(2);
        while self.contexts.lock().get(&frame_id).is_none() {
            if Instant::now() >= context_deadline {
                break;
            }
            sleep(Duration::from_millis(50)).await;
        }

        *self.frame.lock().await = FrameState {
            frame_id: Some(frame_id),
            selector: Some(selector.to_string()),
        };
        Ok(())
    }

    async fn handle_dialog(&self, action: DialogAction, text: Option<&str>) -> Result<(), AdapterError> {
        let mut params = serde_json::Map::new();
        params.insert("accept".into(), Value::Bool(matches!(action, DialogAction::Accept)));
        if let Some(t) = text {
            params.insert("promptText".into(), Value::String(t.to_string()));
        }
        self.send("Page.handleJavaScriptDialog", Value::Object(params))
            .await?;
        *self.pending_dialog.lock() = false;
        Ok(())
    }

    async fn add_mock_rule(&self, rule: CompiledMockRule) -> Result<(), AdapterError> {
        self.mock.add_rule(rule);
        Ok(())
    }

    async fn dom_snapshot(&self) -> Result<String, AdapterError> {
        let response = self.send("DOM.getDocument", json!({"depth": -1, "pierce": true})).await?;
        let root = response.get("root").cloned().unwrap_or(Value::Null);
        Ok(dom_snapshot::render(&root))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AdapterError> {
        let response = self
            .send("Page.captureScreenshot", json!({"format": "png"}))
            .await?;
        let data = response
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::new(AdapterErrorKind::Internal).with_hint("missing screenshot data"))?;
        STANDARD
            .decode(data)
            .map_err(|e| AdapterError::new(AdapterErrorKind::Internal).with_hint(e.to_string()))
    }

    fn console_messages(&self) -> Vec<ConsoleRecord> {
        self.console_log.lock().clone()
    }

    fn network_responses(&self) -> Vec<NetworkRecord> {
        self.network_log.lock().clone()
    }

    async fn close(&self) -> Result<(), AdapterError> {
        let mut task = self.event_task.lock().await;
        if let Some(handle) = task.take() {
            handle.abort();
        }
        if let Some(session) = self.session.lock().await.take() {
            let _ = self
                .send_browser("Target.detachFromTarget", json!({"sessionId": session}))
                .await;
        }

        let owned = std::mem::take(&mut *self.owns_target.lock());
        if owned {
            if let Some(target_id) = self.target_id.lock().take() {
                let _ = self
                    .send_browser("Target.closeTarget", json!({"targetId": target_id}))
                    .await;
            }
        }
        Ok(())
    }
}

/// Starts the client: connects, then spawns the background event pump.
/// Split out from `connect()` because the pump needs an `Arc<CdpClient>`.
pub async fn start(client: Arc<CdpClient>) -> Result<(), AdapterError> {
    client.connect().await?;
    let handle = client.spawn_event_loop();
    *client.event_task.lock().await = Some(handle);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn frame_state_defaults_to_main_frame() {
        let state = FrameState::default();
        assert!(state.frame_id.is_none());
        assert!(state.selector.is_none());
    }

    /// Fakes just enough of the `Target.*` surface to exercise
    /// target-selection without a real browser.
    struct FakeTransport {
        targets: SyncMutex<Vec<Value>>,
        next_id: AtomicU32,
        created: SyncMutex<Vec<String>>,
        closed: SyncMutex<Vec<String>>,
    }

    impl FakeTransport {
        fn new(existing: Vec<Value>) -> Self {
            Self {
                targets: SyncMutex::new(existing),
                next_id: AtomicU32::new(0),
                created: SyncMutex::new(Vec::new()),
                closed: SyncMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CdpTransport for FakeTransport {
        async fn start(&self) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn next_event(&self) -> Option<TransportEvent> {
            None
        }

        async fn send_command(
            &self,
            _target: CommandTarget,
            method: &str,
            params: Value,
        ) -> Result<Value, AdapterError> {
            match method {
                "Target.getTargets" => Ok(json!({"targetInfos": self.targets.lock().clone()})),
                "Target.createTarget" => {
                    let id = format!("created-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
                    self.created.lock().push(id.clone());
                    self.targets.lock().push(json!({"targetId": id, "type": "page"}));
                    Ok(json!({"targetId": id}))
                }
                "Target.attachToTarget" => {
                    let target_id = params.get("targetId").and_then(Value::as_str).unwrap_or_default();
                    Ok(json!({"sessionId": format!("session-for-{target_id}")}))
                }
                "Target.closeTarget" => {
                    if let Some(id) = params.get("targetId").and_then(Value::as_str) {
                        self.closed.lock().push(id.to_string());
                    }
                    Ok(json!({}))
                }
                _ => Ok(json!({})),
            }
        }
    }

    #[derive(Default)]
    struct FakeRegistry {
        map: SyncMutex<StdHashMap<String, TargetId>>,
    }

    #[async_trait]
    impl SessionRegistry for FakeRegistry {
        async fn get_target_id(&self, session_id: &str) -> Option<TargetId> {
            self.map.lock().get(session_id).cloned()
        }

        async fn register(&self, session_id: &str, entry: SessionEntry) {
            self.map.lock().insert(session_id.to_string(), entry.target_id);
        }

        async fn unregister(&self, session_id: &str) {
            self.map.lock().remove(session_id);
        }

        async fn list(&self) -> Vec<String> {
            self.map.lock().keys().cloned().collect()
        }
    }

    #[tokio::test]
    async fn no_session_with_create_tab_opens_and_owns_an_isolated_tab() {
        let transport = Arc::new(FakeTransport::new(vec![json!({"targetId": "pre-existing", "type": "page"})]));
        let client = CdpClient::with_transport(transport.clone(), None, Arc::new(NullSessionRegistry), true);

        client.connect().await.expect("connect");

        assert_eq!(transport.created.lock().len(), 1);
        assert!(client.target_id.lock().as_deref() != Some("pre-existing"));
        assert!(*client.owns_target.lock());

        client.close().await.expect("close");
        assert_eq!(transport.closed.lock().len(), 1);
    }

    #[tokio::test]
    async fn no_session_without_create_tab_attaches_to_first_existing_page_target() {
        let transport = Arc::new(FakeTransport::new(vec![
            json!({"targetId": "worker-1", "type": "service_worker"}),
            json!({"targetId": "page-1", "type": "page"}),
        ]));
        let client = CdpClient::with_transport(transport.clone(), None, Arc::new(NullSessionRegistry), false);

        client.connect().await.expect("connect");

        assert!(transport.created.lock().is_empty());
        assert_eq!(client.target_id.lock().as_deref(), Some("page-1"));
        assert!(!*client.owns_target.lock());

        client.close().await.expect("close");
        assert!(transport.closed.lock().is_empty());
    }

    #[tokio::test]
    async fn session_id_with_a_live_registered_target_reuses_it() {
        let transport = Arc::new(FakeTransport::new(vec![json!({"targetId": "live-1", "type": "page"})]));
        let registry = Arc::new(FakeRegistry::default());
        registry
            .register("s1", SessionEntry { target_id: TargetId("live-1".to_string()) })
            .await;

        let client = CdpClient::with_transport(transport.clone(), Some("s1".to_string()), registry, true);
        client.connect().await.expect("connect");

        assert!(transport.created.lock().is_empty());
        assert_eq!(client.target_id.lock().as_deref(), Some("live-1"));
        assert!(!*client.owns_target.lock());
    }

    #[tokio::test]
    async fn session_id_with_a_stale_target_creates_and_re_registers() {
        let transport = Arc::new(FakeTransport::new(Vec::new()));
        let registry = Arc::new(FakeRegistry::default());
        registry
            .register("s1", SessionEntry { target_id: TargetId("stale-1".to_string()) })
            .await;

        let client = CdpClient::with_transport(transport.clone(), Some("s1".to_string()), registry.clone(), true);
        client.connect().await.expect("connect");

        assert_eq!(transport.created.lock().len(), 1);
        let new_target = client.target_id.lock().clone().unwrap();
        assert_ne!(new_target, "stale-1");
        assert!(!*client.owns_target.lock());
        assert_eq!(registry.get_target_id("s1").await, Some(TargetId(new_target)));
    }
}
