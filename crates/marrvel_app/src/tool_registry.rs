use std::collections::BTreeMap;
use std::sync::Arc;

use marrvel_domain::{McpClient, Tool, ToolCallFull, ToolDefinition, ToolName, ToolOutput};
use serde_json::Value;
use tracing::debug;

use crate::Error;

/// A tool served by the MCP server.
pub struct McpTool {
    definition: ToolDefinition,
    client: Arc<dyn McpClient>,
}

impl McpTool {
    pub fn new(definition: ToolDefinition, client: Arc<dyn McpClient>) -> Self {
        Self { definition, client }
    }
}

#[async_trait::async_trait]
impl Tool for McpTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn invoke(&self, arguments: Value) -> anyhow::Result<ToolOutput> {
        self.client.call(&self.definition.name, arguments).await
    }
}

/// Tools available to the agentic loop, looked up by name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<ToolName, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every tool the MCP server lists.
    pub async fn from_mcp(client: Arc<dyn McpClient>) -> anyhow::Result<Self> {
        let mut registry = Self::new();
        for definition in client.list().await? {
            registry.register(Arc::new(McpTool::new(definition, client.clone())));
        }
        debug!(tools = registry.len(), "Tool registry ready");
        Ok(registry)
    }

    /// Adds a tool, replacing any tool of the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.definition().name.clone(), tool);
    }

    pub fn get(&self, name: &ToolName) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub async fn call(&self, call: &ToolCallFull) -> anyhow::Result<ToolOutput> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| Error::ToolNotFound(call.name.clone()))?;
        tool.invoke(call.arguments.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::test_utils::MockMcpClient;

    #[tokio::test]
    async fn test_from_mcp_dispatches_by_name() {
        let client = Arc::new(
            MockMcpClient::new(vec![
                ToolDefinition::new("get_gene_by_symbol"),
                ToolDefinition::new("get_omim_by_gene_symbol"),
            ])
            .response("get_gene_by_symbol", json!({"symbol": "TP53", "entrezId": 7157})),
        );
        let fixture = ToolRegistry::from_mcp(client.clone()).await.unwrap();

        let call = ToolCallFull::new("get_gene_by_symbol").arguments(json!({"symbol": "TP53"}));
        let actual = fixture.call(&call).await.unwrap();

        let expected = ToolOutput::Json(json!({"symbol": "TP53", "entrezId": 7157}));
        assert_eq!(fixture.len(), 2);
        assert_eq!(actual, expected);
        assert_eq!(
            client.calls(),
            vec![(ToolName::new("get_gene_by_symbol"), json!({"symbol": "TP53"}))]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let fixture = ToolRegistry::new();

        let actual = fixture
            .call(&ToolCallFull::new("does_not_exist"))
            .await
            .unwrap_err();

        assert_eq!(actual.to_string(), "Tool does_not_exist not found");
    }
}
