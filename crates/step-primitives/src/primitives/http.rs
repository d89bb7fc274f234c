//! http_request primitive: a server-side request, not routed through the
//! browser tab at all.

use std::collections::HashMap;

use chrono::Utc;
use reqwest::Method;
use serde_json::Value;
use tracing::info;

use crate::{errors::ActionError, types::ActionReport, types::ExecCtx};

/// Defaults to `Content-Type: application/json`, overridable via `headers`.
/// Non-string bodies are JSON-serialized. Non-2xx is a failure reporting
/// `HTTP <status>: <statusText>`. On 2xx, the body is parsed as JSON when
/// the response content-type indicates it, otherwise returned as text.
pub async fn execute_http_request(
    ctx: &ExecCtx,
    url: &str,
    method: Option<&str>,
    body: Option<&Value>,
    headers: Option<&HashMap<String, String>>,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let method = method
        .map(|m| Method::from_bytes(m.as_bytes()).unwrap_or(Method::GET))
        .unwrap_or(Method::GET);
    info!(action_id = %ctx.action_id, url, %method, "http_request");

    let client = reqwest::Client::new();
    let mut builder = client
        .request(method, url)
        .header("Content-Type", "application/json")
        .timeout(ctx.remaining());

    if let Some(headers) = headers {
        for (key, value) in headers {
            builder = builder.header(key, value);
        }
    }

    if let Some(body) = body {
        builder = match body {
            Value::String(s) => builder.body(s.clone()),
            other => builder.json(other),
        };
    }

    let response = builder
        .send()
        .await
        .map_err(|err| ActionError::Http(format!("{url}: {err}")))?;

    let status = response.status();
    if !status.is_success() {
        let err = ActionError::Http(format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        ));
        return Ok(ActionReport::failure(started_at, &err));
    }

    let is_json = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("json"))
        .unwrap_or(false);

    let value = if is_json {
        response
            .json::<Value>()
            .await
            .map_err(|err| ActionError::Http(format!("{url}: invalid JSON response: {err}")))?
    } else {
        let text = response
            .text()
            .await
            .map_err(|err| ActionError::Http(format!("{url}: {err}")))?;
        Value::String(text)
    };

    Ok(ActionReport::success(started_at, Some(value)))
}
