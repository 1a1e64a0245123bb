use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{Context, ToolCallFull, ToolDefinition, Usage};

#[derive(
    Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl ToString) -> Self {
        Self(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModelId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One chat completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub context: Context,
    /// Tools the model may call; empty for direct (vanilla) answers
    pub tools: Vec<ToolDefinition>,
    /// Ask the backend for provider-side web search
    pub web_search: bool,
}

impl ChatRequest {
    pub fn new(context: Context) -> Self {
        Self { context, tools: Vec::new(), web_search: false }
    }

    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn web_search(mut self, enabled: bool) -> Self {
        self.web_search = enabled;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCallFull>,
    /// Usage as reported by the backend. Not every backend reports it.
    pub usage: Option<Usage>,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), ..Default::default() }
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallFull>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// The reported usage when it is present and nonzero.
    pub fn reported_usage(&self) -> Option<Usage> {
        self.usage.filter(|usage| !usage.is_zero())
    }
}
