use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ToolName;

/// Provider-neutral description of a tool, as listed by the MCP server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Setters)]
#[setters(into, strip_option)]
pub struct ToolDefinition {
    pub name: ToolName,
    pub description: String,
    /// JSON schema of the arguments object
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new<N: ToString>(name: N) -> Self {
        ToolDefinition {
            name: ToolName::new(name),
            description: String::new(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
        }
    }
}
