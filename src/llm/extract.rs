//! Lenient JSON extraction from model output.
//!
//! Models wrap JSON in Markdown fences or surround it with prose. The
//! helpers here take the first fenced block when present, then the first
//! balanced `{…}` or `[…]` span inside it.

use serde_json::{Map, Value};

/// Outcome of reading a JSON object out of free-form model text.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelJson {
    Parsed(Map<String, Value>),
    Malformed(String),
}

pub fn parse_object(text: &str) -> ModelJson {
    let parsed = extract_span(text, '{', '}')
        .and_then(|span| serde_json::from_str::<Value>(span).ok())
        .and_then(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        });

    match parsed {
        Some(map) => ModelJson::Parsed(map),
        None => ModelJson::Malformed(text.to_string()),
    }
}

/// Parse the first JSON array in `text`; `None` on any failure.
pub fn parse_array(text: &str) -> Option<Vec<Value>> {
    let span = extract_span(text, '[', ']')?;
    match serde_json::from_str::<Value>(span).ok()? {
        Value::Array(items) => Some(items),
        _ => None,
    }
}

pub fn extract_span(text: &str, open: char, close: char) -> Option<&str> {
    let body = fenced_block(text).unwrap_or(text);
    balanced_span(body, open, close)
}

/// Contents of the first ```` ``` ```` fenced block, without the info string.
pub fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    let inner = body[..end].trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner)
    }
}

fn balanced_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
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

        if ch == '"' {
            in_string = true;
        } else if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
            if depth == 0 {
                let end = start + offset + ch.len_utf8();
                return Some(&text[start..end]);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_json_object() {
        let text = "Here you go:\n```json\n{\"summary\": \"ok\"}\n```\nThanks";
        match parse_object(text) {
            ModelJson::Parsed(map) => assert_eq!(map["summary"], "ok"),
            other => panic!("expected parsed, got {:?}", other),
        }
    }

    #[test]
    fn test_bare_object_with_prose() {
        let text = "Result: {\"a\": {\"b\": \"}\"}} trailing";
        assert_eq!(extract_span(text, '{', '}'), Some("{\"a\": {\"b\": \"}\"}}"));
    }

    #[test]
    fn test_malformed_keeps_raw_text() {
        let text = "I could not produce JSON {oops";
        assert_eq!(parse_object(text), ModelJson::Malformed(text.to_string()));
    }

    #[test]
    fn test_array_in_fence() {
        let text = "```\n[{\"kind\": \"concept\"}]\n```";
        let items = parse_array(text).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_object_is_not_array() {
        assert!(parse_array("{\"items\": 1}").is_none());
    }

    #[test]
    fn test_escaped_quote_in_string() {
        let text = r#"{"q": "say \"}\" loudly"}"#;
        assert_eq!(extract_span(text, '{', '}'), Some(text));
    }
}
