//! Structured payload extraction from raw model responses.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Location of the first completion's message text in a batch output record.
pub const CONTENT_POINTER: &str = "/response/body/choices/0/message/content";

// A fenced block with an optional language tag; the interior is group 1.
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+\-]*[ \t]*\r?\n?(.*?)```").unwrap()
});

/// The raw text content of a batch output record, if present.
pub fn response_content(record: &Value) -> Option<&str> {
    record.pointer(CONTENT_POINTER).and_then(Value::as_str)
}

/// Strip a surrounding code fence, if any, and return the payload text.
pub fn strip_fence(content: &str) -> &str {
    match FENCE_RE.captures(content).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => content.trim(),
    }
}

/// Parse the model's content into a JSON object.
///
/// A fenced block takes precedence; otherwise the whole content is parsed.
/// When the fenced text is not a valid payload the whole content is tried
/// as well, since a bare object may carry fenced code inside its strings.
/// Anything that is not a JSON object is rejected with a short reason.
pub fn extract_payload(content: &str) -> Result<Map<String, Value>, String> {
    let fenced = strip_fence(content);
    let whole = content.trim();
    match parse_object(fenced) {
        Err(reason) if fenced != whole => parse_object(whole).map_err(|_| reason),
        result => result,
    }
}

fn parse_object(text: &str) -> Result<Map<String, Value>, String> {
    if text.is_empty() {
        return Err("empty content".to_string());
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, found {}", kind_name(&other))),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}

/// Extract the payload of a whole batch output record.
pub fn extract_record_payload(record: &Value) -> Result<Map<String, Value>, String> {
    let content = response_content(record).ok_or_else(|| "missing message content".to_string())?;
    extract_payload(content)
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BARE: &str = r#"{"question": "What?", "answer": "比较", "reasoning_trace": {"steps": [1, 2]}}"#;

    #[test]
    fn test_fenced_and_bare_payloads_match() {
        let bare = extract_payload(BARE).unwrap();
        let tagged = extract_payload(&format!("```json\n{BARE}\n```")).unwrap();
        let untagged = extract_payload(&format!("```\n{BARE}\n```")).unwrap();
        let chatty = extract_payload(&format!("Here you go:\n```json\n{BARE}\n```\nDone.")).unwrap();
        assert_eq!(bare, tagged);
        assert_eq!(bare, untagged);
        assert_eq!(bare, chatty);
    }

    #[test]
    fn test_bare_payload_with_fenced_code_in_a_string() {
        let content = json!({
            "question": "How is it called?",
            "answer": "Like this:\n```python\nrun(app)\n```\nand nothing else."
        })
        .to_string();
        let payload = extract_payload(&content).unwrap();
        assert_eq!(payload["question"], "How is it called?");
        assert!(payload["answer"].as_str().unwrap().contains("run(app)"));
    }

    #[test]
    fn test_malformed_and_non_object_payloads_fail() {
        assert!(extract_payload("```json\n{\"a\": \n```").is_err());
        assert!(extract_payload("not json at all").is_err());
        assert!(extract_payload("[1, 2, 3]").unwrap_err().contains("array"));
        assert!(extract_payload("   ").is_err());
    }

    #[test]
    fn test_record_content_lookup() {
        let record = json!({
            "custom_id": "scenario1_r_00000_func",
            "response": {"body": {"choices": [{"message": {"content": BARE}}]}}
        });
        assert_eq!(response_content(&record), Some(BARE));
        assert!(extract_record_payload(&record).is_ok());

        let empty = json!({"custom_id": "x", "response": {"body": {"choices": []}}});
        assert_eq!(extract_record_payload(&empty).unwrap_err(), "missing message content");
    }
}
