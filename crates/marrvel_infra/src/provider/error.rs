use reqwest::StatusCode;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// HTTP 429. The wording is what the retry wrapper keys on.
    #[error("Throttled: too many requests: {body}")]
    Throttled { body: String },

    #[error("Upstream error {status}: {body}")]
    Upstream { status: StatusCode, body: String },

    #[error("Response has no choices")]
    EmptyResponse,
}

impl Error {
    /// Client errors are deterministic; 5xx and empty replies may clear up.
    pub fn is_permanent(&self) -> bool {
        match self {
            Error::Upstream { status, .. } => status.is_client_error(),
            Error::Throttled { .. } | Error::EmptyResponse => false,
        }
    }
}
