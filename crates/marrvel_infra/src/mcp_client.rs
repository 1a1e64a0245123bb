use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use backon::{ExponentialBuilder, Retryable};
use marrvel_config::McpServerConfig;
use marrvel_domain::{McpClient, ToolDefinition, ToolName, ToolOutput};
use rmcp::model::{CallToolRequestParam, CallToolResult};
use rmcp::service::{Peer, RunningService};
use rmcp::transport::{StreamableHttpClientTransport, TokioChildProcess};
use rmcp::{RoleClient, ServiceError, ServiceExt};
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Client of the MARRVEL MCP server. Connects on first use and reconnects
/// when the transport fails.
pub struct MarrvelMcpClient {
    config: McpServerConfig,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
}

impl MarrvelMcpClient {
    pub fn new(config: McpServerConfig) -> Self {
        Self { config, service: Mutex::new(None) }
    }

    async fn connect(&self) -> anyhow::Result<RunningService<RoleClient, ()>> {
        if let Some(url) = &self.config.url {
            info!(url = %url, "Connecting to MCP server");
            let transport = StreamableHttpClientTransport::from_uri(url.as_str());
            return Ok(().serve(transport).await?);
        }

        let command = self
            .config
            .command
            .as_ref()
            .context("MCP server has neither a command nor a url")?;
        info!(command = %command, args = ?self.config.args, "Starting MCP server");
        let mut cmd = Command::new(command);
        cmd.args(&self.config.args).envs(&self.config.env);
        let transport = TokioChildProcess::new(cmd)
            .with_context(|| format!("Failed to spawn MCP server '{command}'"))?;
        Ok(().serve(transport).await?)
    }

    /// A handle to the running service, connecting first when there is none
    /// or when `reconnect` is set.
    async fn peer(&self, reconnect: bool) -> anyhow::Result<Peer<RoleClient>> {
        let mut service = self.service.lock().await;
        if service.is_none() || reconnect {
            *service = Some(self.connect().await?);
        }
        let service = service.as_ref().context("MCP client is not running")?;
        Ok(service.peer().clone())
    }

    async fn attempt_with_retry<T, F, Fut>(&self, f: F) -> anyhow::Result<T>
    where
        F: Fn(Peer<RoleClient>) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let reconnect = Arc::new(AtomicBool::new(false));

        (|| async {
            let peer = self.peer(reconnect.load(Ordering::Relaxed)).await?;
            f(peer).await
        })
        .retry(ExponentialBuilder::default().with_max_times(3).with_jitter())
        .when(|error: &anyhow::Error| {
            let retry = is_transport_error(error);
            reconnect.store(retry, Ordering::Relaxed);
            retry
        })
        .notify(|error: &anyhow::Error, delay| {
            debug!(
                error = %error,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting to MCP server"
            );
        })
        .await
    }
}

/// Protocol level errors come from the server and are final; anything else
/// means the connection is gone.
fn is_transport_error(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<ServiceError>()
        .is_some_and(|error| !matches!(error, ServiceError::McpError(_)))
}

/// Flattens the content of a tool result into one payload. Text parts are
/// joined and normalized; other parts are kept as JSON.
fn into_tool_output(result: CallToolResult) -> anyhow::Result<ToolOutput> {
    let mut texts = Vec::new();
    let mut others = Vec::new();
    for content in &result.content {
        match content.as_text() {
            Some(text) => texts.push(text.text.clone()),
            None => others.push(serde_json::to_value(content)?),
        }
    }

    if result.is_error.unwrap_or_default() {
        anyhow::bail!("{}", texts.join("\n"));
    }

    if !others.is_empty() {
        others.extend(texts.into_iter().map(Value::String));
        return Ok(ToolOutput::Json(Value::Array(others)));
    }
    if texts.is_empty()
        && let Some(structured) = result.structured_content
    {
        return Ok(ToolOutput::from_raw(structured));
    }
    Ok(ToolOutput::from_raw(Value::String(texts.join("\n"))))
}

#[async_trait::async_trait]
impl McpClient for MarrvelMcpClient {
    async fn list(&self) -> anyhow::Result<Vec<ToolDefinition>> {
        let tools = self
            .attempt_with_retry(|peer| async move { Ok(peer.list_all_tools().await?) })
            .await?;
        Ok(tools
            .into_iter()
            .map(|tool| {
                ToolDefinition::new(tool.name)
                    .description(tool.description.unwrap_or_default().to_string())
                    .input_schema(Value::Object(tool.input_schema.as_ref().clone()))
            })
            .collect())
    }

    async fn call(&self, name: &ToolName, arguments: Value) -> anyhow::Result<ToolOutput> {
        let result = self
            .attempt_with_retry(|peer| {
                let params = CallToolRequestParam {
                    name: Cow::Owned(name.to_string()),
                    arguments: arguments.as_object().cloned(),
                };
                async move { Ok(peer.call_tool(params).await?) }
            })
            .await?;
        into_tool_output(result)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rmcp::model::Content;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_text_content_is_normalized() {
        let fixture = CallToolResult::success(vec![Content::text(
            r#"{"symbol": "TP53", "entrezId": 7157}"#,
        )]);

        let actual = into_tool_output(fixture).unwrap();

        let expected = ToolOutput::Json(json!({"symbol": "TP53", "entrezId": 7157}));
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_plain_text_content() {
        let fixture = CallToolResult::success(vec![
            Content::text("no variants"),
            Content::text("found"),
        ]);

        let actual = into_tool_output(fixture).unwrap();

        assert_eq!(actual, ToolOutput::text("no variants\nfound"));
    }

    #[test]
    fn test_error_result_fails() {
        let fixture = CallToolResult::error(vec![Content::text("gene not found")]);

        let actual = into_tool_output(fixture).unwrap_err();

        assert_eq!(actual.to_string(), "gene not found");
    }

    #[test]
    fn test_protocol_errors_are_not_retried() {
        let fixture = anyhow::Error::from(ServiceError::McpError(
            rmcp::model::ErrorData::invalid_params("bad args", None),
        ));
        assert!(!is_transport_error(&fixture));
        assert!(!is_transport_error(&anyhow::anyhow!("boom")));
    }
}
