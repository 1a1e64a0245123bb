use crate::ToolName;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Tool call '{0}' has no call id")]
    MissingToolCallId(ToolName),

    #[error("Tool result references unknown call id {0}")]
    UnknownToolCallId(String),

    #[error("Tool call {0} was not answered before the next model call")]
    UnansweredToolCall(String),

    #[error("Invalid classification '{0}'")]
    InvalidClassification(String),

    #[error("Invalid run id '{0}'")]
    InvalidRunId(String),

    #[error("Index must be >= 1")]
    IndexTooSmall,

    #[error("Index {0} out of range")]
    IndexOutOfRange(usize),

    #[error("Invalid range {0}-{1}")]
    InvalidRange(usize, usize),

    #[error("Invalid index '{0}'")]
    InvalidIndex(String),
}

pub type Result<A> = std::result::Result<A, Error>;
