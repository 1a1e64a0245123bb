mod dto;
mod error;

use std::time::Duration;

use anyhow::Context;
pub use error::Error;
use marrvel_config::ProviderConfig;
use marrvel_domain::{ChatModel, ChatRequest, ChatResponse, ModelId};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

/// Chat backend speaking the OpenAI chat completions protocol, bound to one
/// model. Works with OpenAI itself and the many gateways that mimic it.
pub struct OpenAiCompatProvider {
    client: Client,
    url: Url,
    api_key: Option<String>,
    model: ModelId,
}

impl OpenAiCompatProvider {
    pub fn new(config: &ProviderConfig, model: ModelId) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Self::with_client(client, config, model)
    }

    /// Shares one connection pool between the providers of a batch.
    pub fn with_client(
        client: Client,
        config: &ProviderConfig,
        model: ModelId,
    ) -> anyhow::Result<Self> {
        let url = config
            .base_url
            .join("chat/completions")
            .context("Invalid provider base url")?;
        Ok(Self { client, url, api_key: config.api_key.clone(), model })
    }

    fn headers(&self) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .context("API key is not a valid header value")?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

#[async_trait::async_trait]
impl ChatModel for OpenAiCompatProvider {
    fn model_id(&self) -> &ModelId {
        &self.model
    }

    fn is_high_latency(&self) -> bool {
        self.model.as_str().contains("bedrock")
            || self.url.host_str().is_some_and(|host| host.contains("bedrock"))
    }

    fn is_permanent(&self, error: &anyhow::Error) -> bool {
        if let Some(error) = error.downcast_ref::<Error>() {
            return error.is_permanent();
        }
        !error.chain().any(|cause| cause.is::<reqwest::Error>())
    }

    async fn chat(&self, request: &ChatRequest) -> anyhow::Result<ChatResponse> {
        let body = dto::Request::new(&self.model, request);
        debug!(
            model = %self.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            web_search = request.web_search,
            "Sending chat request"
        );

        let response = self
            .client
            .post(self.url.clone())
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.url))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Throttled { body }.into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream { status, body }.into());
        }

        let response: dto::Response = response
            .json()
            .await
            .context("Failed to decode chat completion")?;
        if response.choices.is_empty() {
            return Err(Error::EmptyResponse.into());
        }
        Ok(response.into())
    }
}
