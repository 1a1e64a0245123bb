mod app;
mod cli;
mod logging;
mod report;

pub use app::run;
pub use cli::*;
