use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, RetryConfig};

/// Name of the optional config file looked up in the working directory.
const LOCAL_CONFIG_NAME: &str = "marrvel-eval";

/// Environment prefix, e.g. `MARRVEL_EVAL__LIMITS__TOKEN_LIMIT=50000`.
const ENV_PREFIX: &str = "MARRVEL_EVAL";

/// Fallback variable for the provider API key.
const API_KEY_FALLBACK: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, Setters, PartialEq)]
#[setters(into, strip_option)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI compatible chat completions API
    pub base_url: Url,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

/// How to reach the MARRVEL MCP server: a child process speaking stdio, or a
/// streamable HTTP endpoint when `url` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Setters, PartialEq)]
#[setters(into, strip_option)]
pub struct McpServerConfig {
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub url: Option<Url>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Setters, PartialEq)]
#[setters(into)]
pub struct LimitsConfig {
    /// Model rounds allowed before the agentic loop gives up
    pub max_iterations: usize,
    /// Hard cap on the tokens of a single tool result or grading prompt
    pub token_limit: usize,
    /// Wall-clock budget for one test, answer and grading included
    pub timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { max_iterations: 10, token_limit: 100_000, timeout_secs: 600 }
    }
}

impl LimitsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Setters, PartialEq)]
#[setters(into, strip_option)]
pub struct EvalConfig {
    pub provider: ProviderConfig,
    /// Model that grades answers. Never one of the models under test.
    pub evaluator_model: String,
    /// Models under test
    pub models: Vec<String>,
    pub mcp: McpServerConfig,
    pub limits: LimitsConfig,
    /// Number of test runners allowed in flight at once
    pub concurrency: usize,
    #[setters(skip)]
    pub cache_dir: Option<PathBuf>,
    pub retry: RetryConfig,
}

impl EvalConfig {
    /// Loads the configuration from, in increasing order of precedence:
    /// 1. Embedded defaults (`eval.json` in the crate root)
    /// 2. `marrvel-eval.{toml,json,yaml}` in the working directory, or the
    ///    explicit `path` when given (which must then exist)
    /// 3. `MARRVEL_EVAL__*` environment variables, `__` separating nested keys
    ///
    /// A `.env` file is read first so its variables take part in step 3.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        const DEFAULT_CONFIG: &str = include_str!("../eval.json");

        if let Ok(dotenv) = dotenvy::dotenv() {
            tracing::debug!(path = %dotenv.display(), "Loaded .env");
        }

        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(LOCAL_CONFIG_NAME).required(false),
        };

        let config = config::Config::builder()
            .add_source(config::File::from_str(
                DEFAULT_CONFIG,
                config::FileFormat::Json,
            ))
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("models")
                    .try_parsing(true),
            )
            .build()?;

        let mut eval: EvalConfig = config.try_deserialize()?;
        if eval.provider.api_key.is_none() {
            eval.provider.api_key = std::env::var(API_KEY_FALLBACK).ok();
        }
        Ok(eval)
    }

    /// Checks the settings a batch cannot start without.
    pub fn validate(&self) -> Result<(), Error> {
        if self
            .provider
            .api_key
            .as_deref()
            .is_none_or(|key| key.trim().is_empty())
        {
            return Err(Error::MissingApiKey);
        }
        if self.models.is_empty() {
            return Err(Error::NoModels);
        }
        if self.models.contains(&self.evaluator_model) {
            return Err(Error::EvaluatorUnderTest(self.evaluator_model.clone()));
        }
        if self.mcp.command.is_none() && self.mcp.url.is_none() {
            return Err(Error::MissingMcpServer);
        }
        if self.concurrency == 0 {
            return Err(Error::InvalidConcurrency);
        }
        Ok(())
    }

    /// Root of the result cache; one sub-directory per run.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("marrvel-eval")
        })
    }

    pub fn log_dir(&self) -> PathBuf {
        self.cache_dir().join("logs")
    }
}
