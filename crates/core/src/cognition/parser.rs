//! Structured-response parser: pull a JSON object out of free-form model text.
//!
//! Models wrap JSON in prose, code fences, or emit raw newlines inside string
//! literals. `parse` never fails: when no object can be recovered the raw text
//! becomes the `text` field of a fallback result.

use serde_json::{Map, Value};

/// Emotion tag used when the output had no object at all.
const NO_OBJECT_EMOTION: &str = "normal";
/// Emotion tag used when an object was present but could not be decoded.
const DECODE_ERROR_EMOTION: &str = "error";
const FALLBACK_ACTION: &str = "none";

/// Decoded fields of one model response.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredResult {
    fields: Map<String, Value>,
    /// True when the fields were synthesized from raw text.
    pub fallback: bool,
}

impl StructuredResult {
    fn wrap_raw(text: &str, emotion: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("text".into(), Value::String(text.to_owned()));
        fields.insert("emotion".into(), Value::String(emotion.into()));
        fields.insert("action".into(), Value::String(FALLBACK_ACTION.into()));
        Self { fields, fallback: true }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String field, trimmed; `None` when absent, non-string or blank.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Boolean field; also accepts `"true"` / `"false"` strings.
    pub fn bool_field(&self, key: &str) -> Option<bool> {
        match self.fields.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Some(true),
                "false" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// The `text` field, or an empty string when the model omitted it.
    pub fn text(&self) -> &str {
        self.fields.get("text").and_then(Value::as_str).unwrap_or("")
    }
}

/// Parse model output into a [`StructuredResult`]. Never fails.
pub fn parse(raw: &str) -> StructuredResult {
    let Some(span) = outer_object_span(raw) else {
        return StructuredResult::wrap_raw(raw.trim(), NO_OBJECT_EMOTION);
    };

    match decode_lenient(span) {
        Some(fields) => StructuredResult { fields, fallback: false },
        None => {
            tracing::warn!(
                raw_preview = %preview(raw, 160),
                "structured response decode failed, wrapping raw text"
            );
            StructuredResult::wrap_raw(raw, DECODE_ERROR_EMOTION)
        }
    }
}

/// Greedy span from the first `{` to the last `}`.
fn outer_object_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn decode_lenient(span: &str) -> Option<Map<String, Value>> {
    let decoded = serde_json::from_str::<Value>(span)
        .or_else(|_| serde_json::from_str::<Value>(&escape_control_chars(span)))
        .ok()?;
    match decoded {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Escape raw control characters inside string literals and drop stray ones
/// outside them, so that strict JSON decoding accepts the text.
fn escape_control_chars(src: &str) -> String {
    let mut out = String::with_capacity(src.len() + 16);
    let mut in_string = false;
    let mut escaped = false;

    for c in src.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
                c => out.push(c),
            }
        } else {
            match c {
                '"' => {
                    in_string = true;
                    out.push(c);
                }
                '\n' | '\r' | '\t' => out.push(c),
                c if c.is_control() => {}
                c => out.push(c),
            }
        }
    }
    out
}

fn preview(s: &str, max: usize) -> String {
    let mut out: String = s.chars().take(max).collect();
    if s.chars().count() > max {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_from_prose() {
        let r = parse("Sure! Here you go:\n{\"text\": \"hi\", \"emotion\": \"smile\"} hope that helps");
        assert!(!r.fallback);
        assert_eq!(r.text(), "hi");
        assert_eq!(r.str_field("emotion"), Some("smile"));
        assert!(r.get("action").is_none());
    }

    #[test]
    fn extracts_from_code_fence() {
        let r = parse("```json\n{\"intent\": \"greeting\", \"p\": 0.3}\n```");
        assert!(!r.fallback);
        assert_eq!(r.str_field("intent"), Some("greeting"));
        assert_eq!(r.text(), "");
    }

    #[test]
    fn tolerates_raw_newlines_in_strings() {
        let r = parse("{\"text\": \"line one\nline two\", \"emotion\": \"happy\"}");
        assert!(!r.fallback);
        assert_eq!(r.text(), "line one\nline two");
    }

    #[test]
    fn drops_stray_control_chars_outside_strings() {
        let r = parse("{\u{0007}\"text\": \"ok\"}");
        assert!(!r.fallback);
        assert_eq!(r.text(), "ok");
    }

    #[test]
    fn plain_prose_falls_back_to_text() {
        let r = parse("  just talking here  ");
        assert!(r.fallback);
        assert_eq!(r.text(), "just talking here");
        assert_eq!(r.str_field("emotion"), Some("normal"));
        assert_eq!(r.str_field("action"), Some("none"));
    }

    #[test]
    fn malformed_object_falls_back_with_error_tag() {
        let raw = "{\"text\": \"unterminated, \"emotion\": }";
        let r = parse(raw);
        assert!(r.fallback);
        assert_eq!(r.text(), raw);
        assert_eq!(r.str_field("emotion"), Some("error"));
    }

    #[test]
    fn empty_and_reversed_braces_never_fail() {
        for raw in ["", "}{", "{", "}", "{{{{", "null", "[1,2,3]"] {
            let r = parse(raw);
            assert!(r.fallback, "expected fallback for {raw:?}");
            assert!(r.get("text").is_some_and(|v| v.is_string()));
        }
    }

    #[test]
    fn bool_field_accepts_strings() {
        let r = parse(r#"{"tool_required": "true", "valid": false, "x": 3}"#);
        assert_eq!(r.bool_field("tool_required"), Some(true));
        assert_eq!(r.bool_field("valid"), Some(false));
        assert_eq!(r.bool_field("x"), None);
        assert_eq!(r.bool_field("missing"), None);
    }

    #[test]
    fn escaped_quotes_survive_sanitizing() {
        let r = parse("{\"text\": \"she said \\\"hi\\\"\nthen left\"}");
        assert!(!r.fallback);
        assert_eq!(r.text(), "she said \"hi\"\nthen left");
    }
}
