//! Decoding of tool-result payloads produced by legacy tool runtimes.
//!
//! Some producers double encode their JSON, others render their output object
//! with a language default such as `CallToolOutput(result='{...}')`. This is a
//! compatibility shim: [`crate::ToolOutput`] is the envelope the harness itself
//! produces.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref OUTPUT_WRAPPER: Regex =
        Regex::new(r"(?s)^\s*[A-Za-z_][A-Za-z0-9_]*Output\(result='(.*)'\)\s*$").unwrap();
}

/// Parses a raw tool result into structured data. Non-text values are returned
/// as-is, text is decoded when it holds JSON.
///
/// Idempotent: `parse_tool_result(parse_tool_result(x)) == parse_tool_result(x)`.
pub fn parse_tool_result(raw: Value) -> Value {
    match raw {
        Value::String(text) => parse_text(text),
        other => other,
    }
}

/// Applies decoding steps until the text no longer changes, so the result is
/// a fixed point of the parser. Every step that yields text strictly shrinks
/// it, which bounds the recursion.
fn parse_text(text: String) -> Value {
    match decode_step(&text) {
        Some(Value::String(next)) if next != text => parse_text(next),
        Some(Value::String(_)) | None => Value::String(text),
        Some(value) => value,
    }
}

fn decode_step(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    if let Some(captures) = OUTPUT_WRAPPER.captures(trimmed) {
        let payload = captures.get(1).map_or("", |m| m.as_str());
        return Some(decode_wrapped_payload(payload));
    }

    if trimmed.starts_with('"') {
        // A JSON string whose content is itself JSON: peel one layer
        return match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::String(inner)) if serde_json::from_str::<Value>(&inner).is_ok() => {
                Some(Value::String(inner))
            }
            _ => None,
        };
    }

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return serde_json::from_str::<Value>(trimmed).ok();
    }

    None
}

fn decode_wrapped_payload(payload: &str) -> Value {
    if let Ok(value) = serde_json::from_str::<Value>(payload) {
        return value;
    }
    let unescaped = unescape(payload);
    serde_json::from_str::<Value>(&unescaped).unwrap_or(Value::String(unescaped))
}

/// Resolves `\n`, `\t`, `\r`, `\"`, `\'` and `\\`. Unknown escapes are kept
/// verbatim.
fn unescape(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            output.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => output.push('\n'),
            Some('t') => output.push('\t'),
            Some('r') => output.push('\r'),
            Some('"') => output.push('"'),
            Some('\'') => output.push('\''),
            Some('\\') => output.push('\\'),
            Some(other) => {
                output.push('\\');
                output.push(other);
            }
            None => output.push('\\'),
        }
    }
    output
}
