#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Missing API key: set MARRVEL_EVAL__PROVIDER__API_KEY or OPENAI_API_KEY")]
    MissingApiKey,

    #[error("No models configured for evaluation")]
    NoModels,

    #[error("Evaluator model '{0}' is also a model under test")]
    EvaluatorUnderTest(String),

    #[error("The MCP server needs either a command or a url")]
    MissingMcpServer,

    #[error("Concurrency must be at least 1")]
    InvalidConcurrency,
}
