//! Mock Interceptor: matches live requests against `mock_network` rules
//! over the CDP Fetch domain.
//!
//! Rules are evaluated in declaration order, first match wins. Every other
//! request — including `OPTIONS` preflights that no rule explicitly
//! targets — passes straight through to the real network so mocking a
//! handful of endpoints never breaks a page's CORS dance.

use orchestrator_core_types::CompiledMockRule;
use parking_lot::Mutex;
use serde_json::{json, Value};

/// What the Fetch domain handler should do with a paused request.
pub enum MockDecision {
    /// Answer from here: `Fetch.fulfillRequest`.
    Fulfill {
        status: u16,
        body: Vec<u8>,
        headers: Vec<(String, String)>,
        delay_ms: Option<u64>,
    },
    /// Let the request proceed: `Fetch.continueRequest`.
    PassThrough,
}

#[derive(Default)]
pub struct MockInterceptor {
    rules: Mutex<Vec<CompiledMockRule>>,
}

impl MockInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&self, rule: CompiledMockRule) {
        self.rules.lock().push(rule);
    }

    pub fn is_empty(&self) -> bool {
        self.rules.lock().is_empty()
    }

    /// Looks up the first rule matching `url`. A matched rule's own
    /// `OPTIONS` preflight always gets a clean CORS-only 204 reply rather
    /// than the rule's configured status/body, so a mocked endpoint's
    /// preflight dance never collides with its real response. Unmatched
    /// requests fall back to an auto-handled preflight, then to passing the
    /// request through untouched.
    pub fn decide(&self, url: &str, method: &str) -> MockDecision {
        let rules = self.rules.lock();
        if let Some(rule) = rules.iter().find(|rule| rule.matches(url)) {
            if method.eq_ignore_ascii_case("OPTIONS") {
                return MockDecision::Fulfill {
                    status: 204,
                    body: Vec::new(),
                    headers: preflight_headers(),
                    delay_ms: None,
                };
            }

            let body = match &rule.body {
                Some(value) => render_body(value),
                None => Vec::new(),
            };
            let mut headers = preflight_headers();
            headers.push(("content-type".to_string(), "application/json".to_string()));
            return MockDecision::Fulfill {
                status: rule.status,
                body,
                headers,
                delay_ms: rule.delay_ms,
            };
        }
        drop(rules);

        if method.eq_ignore_ascii_case("OPTIONS") {
            return MockDecision::Fulfill {
                status: 204,
                body: Vec::new(),
                headers: preflight_headers(),
                delay_ms: None,
            };
        }

        MockDecision::PassThrough
    }
}

fn render_body(value: &Value) -> Vec<u8> {
    match value {
        Value::String(s) => s.clone().into_bytes(),
        other => serde_json::to_vec(other).unwrap_or_default(),
    }
}

fn preflight_headers() -> Vec<(String, String)> {
    vec![
        ("access-control-allow-origin".to_string(), "*".to_string()),
        (
            "access-control-allow-methods".to_string(),
            "GET, POST, PUT, PATCH, DELETE, OPTIONS".to_string(),
        ),
        (
            "access-control-allow-headers".to_string(),
            "*".to_string(),
        ),
        (
            "access-control-max-age".to_string(),
            "86400".to_string(),
        ),
    ]
}

/// Builds the `Fetch.fulfillRequest` params for a decided mock response.
pub fn fulfill_params(request_id: &str, status: u16, body: &[u8], headers: &[(String, String)]) -> Value {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    let response_headers: Vec<Value> = headers
        .iter()
        .map(|(name, value)| json!({"name": name, "value": value}))
        .collect();

    json!({
        "requestId": request_id,
        "responseCode": status,
        "responseHeaders": response_headers,
        "body": STANDARD.encode(body),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_without_rule_gets_preflight_response() {
        let interceptor = MockInterceptor::new();
        match interceptor.decide("https://api.example.com/users", "OPTIONS") {
            MockDecision::Fulfill { status, .. } => assert_eq!(status, 204),
            _ => panic!("expected auto preflight fulfill"),
        }
    }

    #[test]
    fn unmocked_request_passes_through() {
        let interceptor = MockInterceptor::new();
        assert!(matches!(
            interceptor.decide("https://api.example.com/users", "GET"),
            MockDecision::PassThrough
        ));
    }

    #[test]
    fn matching_rule_wins_over_passthrough() {
        let interceptor = MockInterceptor::new();
        interceptor.add_rule(
            CompiledMockRule::compile("https://api.example.com/*", 200, Some(json!({"ok": true})), None)
                .unwrap(),
        );
        match interceptor.decide("https://api.example.com/users", "GET") {
            MockDecision::Fulfill { status, body, .. } => {
                assert_eq!(status, 200);
                assert_eq!(body, br#"{"ok":true}"#);
            }
            _ => panic!("expected fulfill"),
        }
    }

    #[test]
    fn matched_rule_always_reports_json_and_cors_headers() {
        let interceptor = MockInterceptor::new();
        interceptor.add_rule(
            CompiledMockRule::compile("https://api.example.com/*", 200, Some(json!("plain text")), None)
                .unwrap(),
        );
        match interceptor.decide("https://api.example.com/ping", "GET") {
            MockDecision::Fulfill { headers, .. } => {
                assert!(headers.iter().any(|(k, v)| k == "content-type" && v == "application/json"));
                assert!(headers.iter().any(|(k, _)| k == "access-control-allow-origin"));
            }
            _ => panic!("expected fulfill"),
        }
    }

    #[test]
    fn options_preflight_on_a_matched_rule_gets_a_clean_204_not_the_rule_body() {
        let interceptor = MockInterceptor::new();
        interceptor.add_rule(
            CompiledMockRule::compile("https://api.example.com/*", 500, Some(json!({"err": true})), None)
                .unwrap(),
        );
        match interceptor.decide("https://api.example.com/ping", "OPTIONS") {
            MockDecision::Fulfill { status, body, .. } => {
                assert_eq!(status, 204);
                assert!(body.is_empty());
            }
            _ => panic!("expected fulfill"),
        }
    }

    #[test]
    fn first_declared_rule_wins_on_overlap() {
        let interceptor = MockInterceptor::new();
        interceptor.add_rule(CompiledMockRule::compile("*", 200, None, None).unwrap());
        interceptor.add_rule(CompiledMockRule::compile("/specific", 404, None, None).unwrap());
        match interceptor.decide("/specific", "GET") {
            MockDecision::Fulfill { status, .. } => assert_eq!(status, 200),
            _ => panic!("expected fulfill"),
        }
    }
}
