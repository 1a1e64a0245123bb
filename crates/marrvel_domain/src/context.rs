use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, ToolCallFull, ToolCallId};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
    /// Tool calls requested by an assistant message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallFull>,
    /// The call a tool message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<ToolCallId>,
}

impl ContextMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCallFull>) -> Self {
        Self { tool_calls, ..Self::new(Role::Assistant, content) }
    }

    pub fn tool(call_id: ToolCallId, content: impl Into<String>) -> Self {
        Self { tool_call_id: Some(call_id), ..Self::new(Role::Tool, content) }
    }
}

/// Caller-facing rendering of one message, with tool calls in the OpenAI
/// function-calling shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl From<&ContextMessage> for TranscriptEntry {
    fn from(message: &ContextMessage) -> Self {
        let tool_calls = (!message.tool_calls.is_empty()).then(|| {
            message
                .tool_calls
                .iter()
                .map(ToolCallFull::to_function_call)
                .collect()
        });
        Self {
            role: message.role,
            content: message.content.clone(),
            tool_calls,
            tool_call_id: message.tool_call_id.as_ref().map(|id| id.to_string()),
        }
    }
}

/// The conversation of one test. Tool results can only be appended together
/// with the assistant message that requested them, so every requested call id
/// is answered exactly once before the next model call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    messages: Vec<ContextMessage>,
}

impl Context {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self { messages: vec![ContextMessage::system(system), ContextMessage::user(user)] }
    }

    pub fn messages(&self) -> &[ContextMessage] {
        &self.messages
    }

    pub fn add_message(&mut self, message: ContextMessage) {
        self.messages.push(message);
    }

    /// Appends an assistant message and the tool messages answering its calls.
    ///
    /// # Errors
    /// Fails when a call has no id, an answer references an unknown id, or a
    /// call is answered zero or several times.
    pub fn append_tool_round(
        &mut self,
        assistant: ContextMessage,
        results: Vec<ContextMessage>,
    ) -> Result<(), Error> {
        let mut pending = HashSet::new();
        for call in &assistant.tool_calls {
            let id = call
                .call_id
                .as_ref()
                .ok_or_else(|| Error::MissingToolCallId(call.name.clone()))?;
            pending.insert(id.clone());
        }

        for result in &results {
            let id = result
                .tool_call_id
                .as_ref()
                .ok_or_else(|| Error::UnknownToolCallId("<none>".to_string()))?;
            if !pending.remove(id) {
                return Err(Error::UnknownToolCallId(id.to_string()));
            }
        }

        if let Some(id) = pending.into_iter().next() {
            return Err(Error::UnansweredToolCall(id.to_string()));
        }

        self.messages.push(assistant);
        self.messages.extend(results);
        Ok(())
    }

    pub fn last_content(&self) -> &str {
        self.messages.last().map_or("", |message| message.content.as_str())
    }

    /// All text a model sees, used to estimate tokens when a backend does not
    /// report usage.
    pub fn visible_text(&self) -> String {
        let mut text = String::new();
        for message in &self.messages {
            text.push_str(&message.content);
            text.push('\n');
            for call in &message.tool_calls {
                text.push_str(call.name.as_str());
                text.push_str(&call.arguments.to_string());
                text.push('\n');
            }
        }
        text
    }

    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.messages.iter().map(TranscriptEntry::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn fixture_call(id: &str) -> ToolCallFull {
        ToolCallFull::new("get_gene_by_symbol")
            .call_id(ToolCallId::new(id))
            .arguments(json!({"symbol": "TP53"}))
    }

    #[test]
    fn test_append_tool_round_accepts_complete_answers() {
        let mut fixture = Context::new("system", "question");
        let assistant = ContextMessage::assistant("", vec![fixture_call("a"), fixture_call("b")]);
        let results = vec![
            ContextMessage::tool(ToolCallId::new("b"), "2"),
            ContextMessage::tool(ToolCallId::new("a"), "1"),
        ];

        fixture.append_tool_round(assistant, results).unwrap();

        assert_eq!(fixture.messages().len(), 5);
        assert_eq!(fixture.last_content(), "1");
    }

    #[test]
    fn test_append_tool_round_rejects_unanswered_call() {
        let mut fixture = Context::new("system", "question");
        let assistant = ContextMessage::assistant("", vec![fixture_call("a"), fixture_call("b")]);
        let results = vec![ContextMessage::tool(ToolCallId::new("a"), "1")];

        let actual = fixture.append_tool_round(assistant, results);

        assert!(matches!(actual, Err(Error::UnansweredToolCall(id)) if id == "b"));
        assert_eq!(fixture.messages().len(), 2);
    }

    #[test]
    fn test_append_tool_round_rejects_duplicate_answer() {
        let mut fixture = Context::new("system", "question");
        let assistant = ContextMessage::assistant("", vec![fixture_call("a")]);
        let results = vec![
            ContextMessage::tool(ToolCallId::new("a"), "1"),
            ContextMessage::tool(ToolCallId::new("a"), "again"),
        ];

        let actual = fixture.append_tool_round(assistant, results);

        assert!(matches!(actual, Err(Error::UnknownToolCallId(id)) if id == "a"));
    }

    #[test]
    fn test_transcript_renders_tool_calls() {
        let mut fixture = Context::new("system", "question");
        fixture
            .append_tool_round(
                ContextMessage::assistant("", vec![fixture_call("a")]),
                vec![ContextMessage::tool(ToolCallId::new("a"), "{\"ok\":true}")],
            )
            .unwrap();

        let actual = serde_json::to_value(fixture.transcript()).unwrap();
        let expected = json!([
            {"role": "system", "content": "system"},
            {"role": "user", "content": "question"},
            {"role": "assistant", "content": "", "tool_calls": [{
                "id": "a",
                "type": "function",
                "function": {"name": "get_gene_by_symbol", "arguments": "{\"symbol\":\"TP53\"}"}
            }]},
            {"role": "tool", "content": "{\"ok\":true}", "tool_call_id": "a"}
        ]);

        assert_eq!(actual, expected);
    }
}
