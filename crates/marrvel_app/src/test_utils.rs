use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use marrvel_domain::{
    CacheKey, ChatModel, ChatRequest, ChatResponse, McpClient, ModelId, ResultCache, RunId,
    TestResult, ToolDefinition, ToolName, ToolOutput, Tokenizer,
};
use serde_json::Value;

/// Chat model that replays queued responses and records every request.
pub struct MockChatModel {
    id: ModelId,
    responses: Mutex<VecDeque<anyhow::Result<ChatResponse>>>,
    requests: Mutex<Vec<ChatRequest>>,
    delay: Option<Duration>,
    permanent_failures: bool,
}

impl MockChatModel {
    pub fn new(id: &str) -> Self {
        Self {
            id: ModelId::new(id),
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: None,
            permanent_failures: true,
        }
    }

    pub fn respond(self, response: ChatResponse) -> Self {
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn fail(self, error: anyhow::Error) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Sleeps before answering each request.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reports every failure as one that may clear up on a later run.
    pub fn transient(mut self) -> Self {
        self.permanent_failures = false;
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ChatModel for MockChatModel {
    fn model_id(&self) -> &ModelId {
        &self.id
    }

    fn is_permanent(&self, _error: &anyhow::Error) -> bool {
        self.permanent_failures
    }

    async fn chat(&self, request: &ChatRequest) -> anyhow::Result<ChatResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("no queued response")))
    }
}

/// MCP server stand-in with canned results per tool.
pub struct MockMcpClient {
    tools: Vec<ToolDefinition>,
    responses: HashMap<ToolName, Result<Value, String>>,
    calls: Mutex<Vec<(ToolName, Value)>>,
}

impl MockMcpClient {
    pub fn new(tools: Vec<ToolDefinition>) -> Self {
        Self { tools, responses: HashMap::new(), calls: Mutex::new(Vec::new()) }
    }

    pub fn response(mut self, tool: &str, value: Value) -> Self {
        self.responses.insert(ToolName::new(tool), Ok(value));
        self
    }

    pub fn error(mut self, tool: &str, message: &str) -> Self {
        self.responses.insert(ToolName::new(tool), Err(message.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<(ToolName, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl McpClient for MockMcpClient {
    async fn list(&self) -> anyhow::Result<Vec<ToolDefinition>> {
        Ok(self.tools.clone())
    }

    async fn call(&self, name: &ToolName, arguments: Value) -> anyhow::Result<ToolOutput> {
        self.calls.lock().unwrap().push((name.clone(), arguments));
        match self.responses.get(name) {
            Some(Ok(value)) => Ok(ToolOutput::from_raw(value.clone())),
            Some(Err(message)) => Err(anyhow::anyhow!("{message}")),
            None => Ok(ToolOutput::text("")),
        }
    }
}

/// In-memory result cache with the same write policy as the file store.
#[derive(Default)]
pub struct MockResultCache {
    entries: Mutex<HashMap<(RunId, String), TestResult>>,
}

impl MockResultCache {
    pub fn with_entry(self, key: &CacheKey, result: TestResult) -> Self {
        self.entries
            .lock()
            .unwrap()
            .insert((key.run_id.clone(), key.entry_key()), result);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ResultCache for MockResultCache {
    async fn get(&self, key: &CacheKey) -> anyhow::Result<Option<TestResult>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(&(key.run_id.clone(), key.entry_key()))
            .cloned())
    }

    async fn put(&self, key: &CacheKey, result: &TestResult) -> anyhow::Result<bool> {
        if !result.status.is_cacheable() {
            return Ok(false);
        }
        self.entries
            .lock()
            .unwrap()
            .insert((key.run_id.clone(), key.entry_key()), result.clone());
        Ok(true)
    }

    async fn clear(&self, run_id: Option<&RunId>) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().unwrap();
        match run_id {
            Some(run_id) => entries.retain(|(run, _), _| run != run_id),
            None => entries.clear(),
        }
        Ok(())
    }
}

/// One token per whitespace separated word; counts how often it is asked.
#[derive(Default)]
pub struct CountingTokenizer {
    calls: AtomicUsize,
}

impl CountingTokenizer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Tokenizer for CountingTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        self.calls.fetch_add(1, Ordering::SeqCst);
        text.split_whitespace().count()
    }
}
