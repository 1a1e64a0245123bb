mod cache;
mod context;
mod error;
mod model;
mod services;
mod subset;
mod test_case;
mod test_result;
mod token_counter;
mod tool_call;
mod tool_definition;
mod tool_name;
mod tool_output;
mod tool_result;
mod usage;

pub use cache::*;
pub use context::*;
pub use error::*;
pub use model::*;
pub use services::*;
pub use subset::*;
pub use test_case::*;
pub use test_result::*;
pub use token_counter::*;
pub use tool_call::*;
pub use tool_definition::*;
pub use tool_name::*;
pub use tool_output::*;
pub use tool_result::*;
pub use usage::*;
