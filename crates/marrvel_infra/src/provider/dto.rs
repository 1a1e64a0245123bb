//! Wire types of the OpenAI chat completions API, limited to the fields the
//! harness sends and reads.

use marrvel_domain::{
    ChatRequest, ChatResponse, ContextMessage, ModelId, Role, ToolCallFull, ToolCallId,
    ToolDefinition, Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Serialize)]
pub struct Request {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search_options: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Tool {
    pub r#type: &'static str,
    pub function: FunctionDefinition,
}

#[derive(Debug, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl From<&ContextMessage> for Message {
    fn from(message: &ContextMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(ToolCallFull::to_function_call)
                .collect(),
            tool_call_id: message.tool_call_id.as_ref().map(ToolCallId::to_string),
        }
    }
}

impl From<&ToolDefinition> for Tool {
    fn from(definition: &ToolDefinition) -> Self {
        Self {
            r#type: "function",
            function: FunctionDefinition {
                name: definition.name.to_string(),
                description: definition.description.clone(),
                parameters: definition.input_schema.clone(),
            },
        }
    }
}

impl Request {
    pub fn new(model: &ModelId, request: &ChatRequest) -> Self {
        Self {
            model: model.to_string(),
            messages: request.context.messages().iter().map(Message::from).collect(),
            tools: request.tools.iter().map(Tool::from).collect(),
            web_search_options: request.web_search.then(|| Value::Object(Default::default())),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub usage: Option<ResponseUsage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ResponseToolCall>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseToolCall {
    pub id: Option<String>,
    pub function: FunctionCall,
}

#[derive(Debug, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON encoded, and not always valid
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
pub struct ResponseUsage {
    #[serde(default)]
    pub prompt_tokens: usize,
    #[serde(default)]
    pub completion_tokens: usize,
}

impl From<ResponseToolCall> for ToolCallFull {
    fn from(call: ResponseToolCall) -> Self {
        let arguments = if call.function.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&call.function.arguments).unwrap_or_else(|error| {
                warn!(
                    tool = %call.function.name,
                    error = %error,
                    "Tool call arguments are not valid JSON"
                );
                Value::Object(Default::default())
            })
        };

        let mut tool_call = ToolCallFull::new(call.function.name).arguments(arguments);
        tool_call.call_id = call.id.filter(|id| !id.is_empty()).map(ToolCallId::new);
        tool_call
    }
}

impl From<Response> for ChatResponse {
    fn from(response: Response) -> Self {
        let usage = response
            .usage
            .map(|usage| Usage::new(usage.prompt_tokens, usage.completion_tokens));
        let message = response.choices.into_iter().next().map(|choice| choice.message);
        let (content, tool_calls) = match message {
            Some(message) => (
                message.content.unwrap_or_default(),
                message.tool_calls.into_iter().map(ToolCallFull::from).collect(),
            ),
            None => (String::new(), Vec::new()),
        };
        ChatResponse { content, tool_calls, usage }
    }
}
