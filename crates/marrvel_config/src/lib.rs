mod error;
mod eval_config;
mod retry_config;

pub use error::*;
pub use eval_config::*;
pub use retry_config::*;
