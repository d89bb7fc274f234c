//! Compiled mock-network rules (spec §3 `MockRule`, §4 mock matching).
//!
//! Rules are declared as shell-style globs (`*` any run of characters, `?`
//! any single character) and compiled once into an anchored regex so the
//! CDP Tab Client can test every intercepted request in O(1) per rule
//! without re-parsing the pattern on every request.

use regex::Regex;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum MockRuleError {
    #[error("invalid mock_network pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// One `mock_network` step compiled into a ready-to-match rule.
///
/// Rules are matched in declaration order, first match wins (spec §4
/// "Mock Interceptor"); later rules covering the same URL never apply
/// once an earlier one matches.
#[derive(Clone, Debug)]
pub struct CompiledMockRule {
    pub pattern: String,
    pub status: u16,
    pub body: Option<Value>,
    pub delay_ms: Option<u64>,
    matcher: Regex,
}

impl CompiledMockRule {
    pub fn compile(
        pattern: impl Into<String>,
        status: u16,
        body: Option<Value>,
        delay_ms: Option<u64>,
    ) -> Result<Self, MockRuleError> {
        let pattern = pattern.into();
        let matcher = glob_to_regex(&pattern).map_err(|reason| MockRuleError::InvalidPattern {
            pattern: pattern.clone(),
            reason,
        })?;
        Ok(Self {
            pattern,
            status,
            body,
            delay_ms,
            matcher,
        })
    }

    pub fn matches(&self, url: &str) -> bool {
        self.matcher.is_match(url)
    }
}

/// Translates a `*`/`?` glob into an anchored regex. Every other
/// character is escaped, so `.`, `/`, `?query=1` etc. match literally.
fn glob_to_regex(pattern: &str) -> Result<Regex, String> {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            _ => out.push_str(&regex::escape(&ch.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_any_suffix() {
        let rule = CompiledMockRule::compile("https://api.example.com/*", 200, None, None).unwrap();
        assert!(rule.matches("https://api.example.com/users/1"));
        assert!(!rule.matches("https://other.example.com/users/1"));
    }

    #[test]
    fn question_mark_matches_single_char() {
        let rule = CompiledMockRule::compile("/item/?", 200, None, None).unwrap();
        assert!(rule.matches("/item/5"));
        assert!(!rule.matches("/item/55"));
    }

    #[test]
    fn literal_dot_does_not_become_wildcard() {
        let rule = CompiledMockRule::compile("*.json", 200, None, None).unwrap();
        assert!(rule.matches("data.json"));
        assert!(!rule.matches("dataxjson"));
    }

    #[test]
    fn first_match_wins_is_a_caller_concern() {
        // CompiledMockRule only answers whether a single rule matches; rule
        // list order is enforced by whoever holds the Vec<CompiledMockRule>.
        let a = CompiledMockRule::compile("*", 200, None, None).unwrap();
        let b = CompiledMockRule::compile("/specific", 404, None, None).unwrap();
        assert!(a.matches("/specific"));
        assert!(b.matches("/specific"));
    }
}
