mod cache;
mod mcp_client;
mod provider;

pub use cache::*;
pub use mcp_client::*;
pub use provider::{Error as ProviderError, OpenAiCompatProvider};
