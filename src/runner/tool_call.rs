/**
 * Inline Tool-Call Interception
 *
 * DESIGN DECISION: Recognise `<tool_call name="NAME">payload</tool_call>` inside plain text
 * output with a `[A-Za-z0-9_-]+` name pattern (hyphens allowed)
 * WHY: older inline-emitted tools must be surfaced as events; a regex using `[A-Za-z0-9_-]+`
 * matches both `create_artifact` and `create-artifact`, where one restricted to `\w+` would
 * match only the former
 *
 * REASONING CHAIN:
 * 1. Malformed JSON payloads must not crash the stream - they are logged and the raw content
 *    retained
 * 2. The regex runs over already-accumulated text, not char-by-char, so `(?s)` lets `.` span
 *    newlines inside a multi-line payload
 */

use regex::Regex;

/// One intercepted inline tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct InterceptedToolCall {
    pub name: String,
    /// Parsed JSON payload, or `None` when the payload was not valid JSON (the raw text is
    /// still available via `raw_payload`).
    pub payload: Option<serde_json::Value>,
    pub raw_payload: String,
}

fn tool_call_regex() -> Regex {
    Regex::new(r#"(?s)<tool_call name="([A-Za-z0-9_-]+)">(.*?)</tool_call>"#).unwrap()
}

/// Scan `text` for every inline tool-call block. Malformed JSON payloads are retained as raw
/// text rather than dropped or treated as an error.
pub fn intercept_tool_calls(text: &str) -> Vec<InterceptedToolCall> {
    tool_call_regex()
        .captures_iter(text)
        .map(|cap| {
            let name = cap[1].to_string();
            let raw_payload = cap[2].to_string();
            let payload = serde_json::from_str(&raw_payload).ok();
            if payload.is_none() && !raw_payload.trim().is_empty() {
                eprintln!("runner: tool call '{name}' has non-JSON payload, retaining raw text");
            }
            InterceptedToolCall { name, payload, raw_payload }
        })
        .collect()
}
