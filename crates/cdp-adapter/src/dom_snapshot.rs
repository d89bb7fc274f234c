//! Renders the CDP `DOM.getDocument` node tree back into an HTML string.
//!
//! `DOM.getDocument` (with `depth: -1, pierce: true`) returns attributes as
//! a flat `[name, value, name, value, ...]` array rather than a map, and
//! gives no direct way to ask Chrome for "the page as HTML text" — so this
//! module owns that serialization itself rather than trusting a CDP
//! command to produce it.

use serde_json::Value;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

pub fn render(root: &Value) -> String {
    let mut out = String::new();
    render_node(root, &mut out);
    out
}

fn render_node(node: &Value, out: &mut String) {
    let node_type = node.get("nodeType").and_then(Value::as_i64).unwrap_or(0);
    match node_type {
        // Document / DocumentFragment: render children only.
        9 | 11 => render_children(node, out),
        // Element
        1 => render_element(node, out),
        // Text
        3 => {
            let text = node.get("nodeValue").and_then(Value::as_str).unwrap_or("");
            out.push_str(&escape_text(text));
        }
        // Comment
        8 => {
            let text = node.get("nodeValue").and_then(Value::as_str).unwrap_or("");
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        // Doctype and everything else: skip.
        _ => {}
    }
}

fn render_children(node: &Value, out: &mut String) {
    if let Some(children) = node.get("children").and_then(Value::as_array) {
        for child in children {
            render_node(child, out);
        }
    }
}

fn render_element(node: &Value, out: &mut String) {
    let tag = node
        .get("nodeName")
        .and_then(Value::as_str)
        .unwrap_or("div")
        .to_ascii_lowercase();

    out.push('<');
    out.push_str(&tag);

    if let Some(attrs) = node.get("attributes").and_then(Value::as_array) {
        let mut pairs = attrs.iter().filter_map(Value::as_str);
        while let (Some(name), Some(value)) = (pairs.next(), pairs.next()) {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }
    }

    if VOID_ELEMENTS.contains(&tag.as_str()) {
        out.push_str(" />");
        return;
    }
    out.push('>');

    // Template elements expose their body as `contentDocument`/`templateContent`
    // rather than `children`; fall back to whichever is present.
    if let Some(content) = node.get("templateContent") {
        render_node(content, out);
    } else {
        render_children(node, out);
    }

    out.push_str("</");
    out.push_str(&tag);
    out.push('>');
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_nested_elements_with_attributes() {
        let doc = json!({
            "nodeType": 9,
            "children": [{
                "nodeType": 1,
                "nodeName": "DIV",
                "attributes": ["class", "a & b"],
                "children": [{
                    "nodeType": 3,
                    "nodeValue": "<hello>"
                }]
            }]
        });
        let html = render(&doc);
        assert_eq!(html, r#"<div class="a &amp; b">&lt;hello&gt;</div>"#);
    }

    #[test]
    fn void_elements_self_close() {
        let doc = json!({
            "nodeType": 1,
            "nodeName": "IMG",
            "attributes": ["src", "x.png"]
        });
        assert_eq!(render(&doc), r#"<img src="x.png" />"#);
    }

    #[test]
    fn comment_nodes_are_preserved() {
        let doc = json!({"nodeType": 8, "nodeValue": " note "});
        assert_eq!(render(&doc), "<!-- note -->");
    }
}
