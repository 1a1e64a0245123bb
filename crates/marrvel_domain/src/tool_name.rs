use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Name of a tool exposed by the MCP server, e.g. `get_gene_by_symbol`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolName {
    name: String,
}

impl ToolName {
    pub fn new(value: impl ToString) -> Self {
        ToolName { name: value.to_string() }
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl From<String> for ToolName {
    fn from(value: String) -> Self {
        ToolName::new(value)
    }
}

impl From<&str> for ToolName {
    fn from(value: &str) -> Self {
        ToolName::new(value)
    }
}

impl Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_tool_name_serializes_as_plain_string() {
        let fixture = ToolName::new("get_gene_by_symbol");
        let actual = serde_json::to_value(&fixture).unwrap();
        let expected = serde_json::json!("get_gene_by_symbol");
        assert_eq!(actual, expected);
    }
}
