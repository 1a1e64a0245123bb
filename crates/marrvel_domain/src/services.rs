use serde_json::Value;

use crate::{
    CacheKey, ChatRequest, ChatResponse, ModelId, RunId, TestResult, ToolDefinition, ToolName,
    ToolOutput,
};

/// A chat-completion backend bound to one model.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    fn model_id(&self) -> &ModelId;

    /// Backends with slow, shared rate limits (e.g. Bedrock) get a random
    /// delay before their first attempt.
    fn is_high_latency(&self) -> bool {
        false
    }

    /// Whether a failed call would fail the same way if repeated, e.g. a
    /// rejected request. Transport failures and server errors are not.
    fn is_permanent(&self, _error: &anyhow::Error) -> bool {
        true
    }

    async fn chat(&self, request: &ChatRequest) -> anyhow::Result<ChatResponse>;
}

/// Lists and invokes the tools of an MCP server.
#[async_trait::async_trait]
pub trait McpClient: Send + Sync {
    async fn list(&self) -> anyhow::Result<Vec<ToolDefinition>>;
    async fn call(&self, name: &ToolName, arguments: Value) -> anyhow::Result<ToolOutput>;
}

/// A single callable tool, dispatched by name.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> &ToolDefinition;
    async fn invoke(&self, arguments: Value) -> anyhow::Result<ToolOutput>;
}

/// Persistent store of final test results.
#[async_trait::async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> anyhow::Result<Option<TestResult>>;

    /// Returns whether the result was persisted; results whose status is not
    /// cacheable are refused.
    async fn put(&self, key: &CacheKey, result: &TestResult) -> anyhow::Result<bool>;

    /// Removes one run, or every run when `run_id` is `None`.
    async fn clear(&self, run_id: Option<&RunId>) -> anyhow::Result<()>;
}
