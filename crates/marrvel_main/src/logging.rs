use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_FILTER: &str = "marrvel=info";

/// Human readable logs on stderr plus a daily-rotated JSON log under
/// `log_dir`. Keep the returned guard alive until exit so the file is flushed.
pub fn init_tracing(log_dir: &Path) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let appender = tracing_appender::rolling::daily(log_dir, "marrvel-eval.log");
    let (file, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().json().with_ansi(false).with_writer(file))
        .try_init()?;

    Ok(guard)
}
