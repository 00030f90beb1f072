//! Pulling JSON objects out of free-form model output.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid fenced-json regex")
});

static GREEDY_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid object regex"));

/// Interpret a model reply as structured data.
///
/// A fenced ```json block wins, then the outermost `{...}` span. When no
/// object is found, or it does not parse, the raw reply is returned as
/// `{"text": <reply>}` so callers can fall back to text handling.
pub fn parse_structured_response(text: &str) -> Value {
    let trimmed = text.trim();
    let candidate = FENCED_JSON
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .or_else(|| GREEDY_OBJECT.find(trimmed))
        .map(|m| m.as_str());

    if let Some(json) = candidate {
        match serde_json::from_str::<Value>(json) {
            Ok(value) => return value,
            Err(e) => warn!("Failed to parse JSON from response: {e}"),
        }
    }

    let mut wrapped = Map::new();
    wrapped.insert("text".into(), Value::String(text.to_string()));
    Value::Object(wrapped)
}

/// Find the JSON object text inside a reply, trying progressively looser
/// strategies: fenced blocks, balanced-brace scanning, then the greedy span.
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(m) = FENCED_JSON.captures(text).and_then(|c| c.get(1)) {
        return Some(m.as_str());
    }
    if let Some(obj) = balanced_object(text) {
        return Some(obj);
    }
    GREEDY_OBJECT.find(text).map(|m| m.as_str())
}

/// Return the first brace-balanced `{...}` span, ignoring braces that appear
/// inside JSON string literals.
pub fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Whether the value is the `{"text": ...}` fallback produced by
/// [`parse_structured_response`].
pub fn as_fallback_text(value: &Value) -> Option<&str> {
    value.get("text").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_fenced_json_block() {
        let text = "Here you go:\n```json\n{\"notes\": \"fine\"}\n```\nThanks";
        assert_eq!(parse_structured_response(text), json!({"notes": "fine"}));
    }

    #[test]
    fn parses_bare_object_with_surrounding_prose() {
        let text = "Result: {\"a\": {\"b\": 1}} end";
        assert_eq!(parse_structured_response(text), json!({"a": {"b": 1}}));
    }

    #[test]
    fn wraps_plain_text() {
        let text = "no structure here";
        assert_eq!(parse_structured_response(text), json!({"text": "no structure here"}));
    }

    #[test]
    fn wraps_invalid_json() {
        let text = "{not: valid}";
        let value = parse_structured_response(text);
        assert_eq!(as_fallback_text(&value), Some("{not: valid}"));
    }

    #[test]
    fn balanced_object_skips_braces_in_strings() {
        let text = r#"prefix {"msg": "a } b", "n": {"x": 1}} trailing {"other": 2}"#;
        assert_eq!(
            balanced_object(text),
            Some(r#"{"msg": "a } b", "n": {"x": 1}}"#)
        );
    }

    #[test]
    fn balanced_object_handles_escaped_quotes() {
        let text = r#"{"msg": "say \"}\" loudly"}"#;
        assert_eq!(balanced_object(text), Some(text));
    }

    #[test]
    fn balanced_object_unterminated() {
        assert_eq!(balanced_object("{\"a\": 1"), None);
        assert_eq!(balanced_object("no braces"), None);
    }

    #[test]
    fn extract_json_prefers_fenced_block() {
        let text = "{\"first\": 1}\n```json\n{\"second\": 2}\n```";
        assert_eq!(extract_json(text), Some("{\"second\": 2}"));
    }

    #[test]
    fn extract_json_uses_balanced_span_before_greedy() {
        let text = "{\"a\": 1} and then {\"b\": 2}";
        assert_eq!(extract_json(text), Some("{\"a\": 1}"));
    }
}
