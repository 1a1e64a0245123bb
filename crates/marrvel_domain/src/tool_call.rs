use std::collections::HashSet;
use std::fmt::Display;

use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ToolName;

/// Unique identifier for one use of a tool
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Hash, Serialize)]
#[serde(transparent)]
pub struct ToolCallId(String);

impl ToolCallId {
    pub fn new(value: impl ToString) -> Self {
        ToolCallId(value.to_string())
    }

    /// A fresh id for models that do not supply one. Random, so an id is
    /// never handed out twice.
    pub fn generate() -> Self {
        ToolCallId(format!("call_{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ToolCallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tool call requested by the model.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Setters)]
#[setters(strip_option, into)]
pub struct ToolCallFull {
    pub name: ToolName,
    /// NOTE: Not all models return a call id
    pub call_id: Option<ToolCallId>,
    pub arguments: Value,
}

impl ToolCallFull {
    pub fn new(name: impl Into<ToolName>) -> Self {
        Self { name: name.into(), call_id: None, arguments: Value::Object(Default::default()) }
    }

    /// Gives the call an id not present in `seen` and records it there. A
    /// missing id, or one the model already used in this conversation, is
    /// replaced by a generated one.
    pub fn normalize(mut self, seen: &mut HashSet<ToolCallId>) -> Self {
        let id = match self.call_id.take() {
            Some(id) if !seen.contains(&id) => id,
            _ => ToolCallId::generate(),
        };
        seen.insert(id.clone());
        self.call_id = Some(id);
        self
    }

    /// The OpenAI-style `{id, type, function: {name, arguments}}` shape used in
    /// requests and transcripts. `arguments` is a JSON encoded string.
    pub fn to_function_call(&self) -> Value {
        serde_json::json!({
            "id": self.call_id.as_ref().map(ToolCallId::as_str),
            "type": "function",
            "function": {
                "name": self.name.as_str(),
                "arguments": self.arguments.to_string(),
            }
        })
    }
}

/// One entry of the tool-call history kept for reporting. Recorded for every
/// attempted call, whether or not it succeeded.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub name: ToolName,
    pub args: Value,
}

impl From<&ToolCallFull> for ToolCallRecord {
    fn from(call: &ToolCallFull) -> Self {
        Self { name: call.name.clone(), args: call.arguments.clone() }
    }
}
