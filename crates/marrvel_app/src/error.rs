use marrvel_domain::{ModelId, ToolName};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Tool {0} not found")]
    ToolNotFound(ToolName),

    /// A model call that failed for good: not retryable, or out of retries.
    #[error("Model {model} failed: {error:#}")]
    ModelCall { model: ModelId, error: anyhow::Error },

    #[error("Semaphore closed before test could start")]
    SemaphoreClosed,
}
