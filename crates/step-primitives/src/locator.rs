//! Helpers shared by primitives that splice user-supplied strings into
//! JS expressions evaluated in the page. Every value reaches the page
//! through `serde_json::to_string`, never raw string concatenation, so a
//! selector or text value containing a quote or backslash can't break out
//! of the literal.

use orchestrator_core_types::MatchMode;

pub fn js_literal(value: &str) -> String {
    serde_json::to_string(value).expect("string always serializes")
}

/// JS expression fragment comparing `haystackExpr` against `needle`
/// per the given [`MatchMode`]. `haystackExpr` must already be a JS
/// expression yielding a string (e.g. `el.textContent`).
pub fn match_expr(haystack_expr: &str, needle: &str, mode: MatchMode) -> String {
    let needle_literal = js_literal(needle);
    match mode {
        MatchMode::Exact => format!("(({haystack_expr}).trim() === {needle_literal}.trim())"),
        MatchMode::Contains => {
            format!("(({haystack_expr}).toLowerCase().includes({needle_literal}.toLowerCase()))")
        }
        MatchMode::Regex => {
            format!("(new RegExp({needle_literal}).test({haystack_expr}))")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_literal_escapes_quotes() {
        assert_eq!(js_literal(r#"a"b"#), r#""a\"b""#);
    }

    #[test]
    fn match_expr_builds_contains_check() {
        let expr = match_expr("el.textContent", "Sign in", MatchMode::Contains);
        assert!(expr.contains("includes"));
        assert!(expr.contains("Sign in"));
    }
}
