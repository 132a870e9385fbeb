use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

const DEFAULT_DIRECTIVE: &str = "basic_cleaning=info";

/// Initializes the logging system with both console and file output.
///
/// The returned guard flushes the file writer when dropped, so callers keep it
/// alive until the process exits.
pub fn init_logging(config: &LoggingConfig) -> std::io::Result<WorkerGuard> {
    fs::create_dir_all(&config.dir)?;

    // Non-blocking file appender with daily rotation
    let file_appender = tracing_appender::rolling::daily(&config.dir, &config.file_name);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    // JSON for the file, human readable for the console
    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_writer(std::io::stdout);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    Ok(guard)
}
