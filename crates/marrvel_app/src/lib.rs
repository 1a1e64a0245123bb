mod agent_loop;
mod batch;
mod error;
mod grader;
pub mod retry;
mod runner;
mod tool_registry;

#[cfg(test)]
mod test_utils;

pub use agent_loop::*;
pub use batch::*;
pub use error::*;
pub use grader::*;
pub use runner::*;
pub use tool_registry::*;
