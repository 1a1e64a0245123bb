use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::parse_tool_result;

/// What a tool hands back to the loop: plain text or a structured value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Text(String),
    Json(Value),
}

impl ToolOutput {
    pub fn text(value: impl Into<String>) -> Self {
        ToolOutput::Text(value.into())
    }

    /// Normalizes a raw payload that may be double encoded or wrapped in the
    /// legacy `XOutput(result='...')` rendering.
    pub fn from_raw(raw: Value) -> Self {
        match parse_tool_result(raw) {
            Value::String(text) => ToolOutput::Text(text),
            value => ToolOutput::Json(value),
        }
    }

    /// Single text payload injected into the conversation as a tool message.
    /// Text passes through unchanged.
    pub fn into_payload(self) -> String {
        match self {
            ToolOutput::Text(text) => text,
            ToolOutput::Json(value) => value.to_string(),
        }
    }
}
