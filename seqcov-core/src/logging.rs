//! Tracing setup shared by the evaluation and training binaries.
//!
//! Human-readable stderr output filtered by verbosity, plus an optional JSON
//! file layer written next to the run's outputs.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::error::ConfigError;

/// Target for declared-versus-found count mismatches; shown even with `-q`.
pub const MISMATCH_TARGET: &str = "seqcov::mismatch";

/// Map `-v`/`-q` flags to a filter directive.
pub fn level_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error,seqcov::mismatch=warn",
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber.
///
/// The returned guard must be held for the life of the process so the
/// non-blocking file writer flushes on exit.
pub fn init_logging(
    verbose: u8,
    quiet: bool,
    log_dir: Option<&Path>,
    file_prefix: &str,
    settings: &LoggingConfig,
) -> Result<Option<WorkerGuard>, ConfigError> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(level_filter(verbose, quiet)));

    let (json_layer, guard) = match log_dir {
        Some(dir) if settings.file_log => {
            std::fs::create_dir_all(dir).map_err(|e| ConfigError::Logging(e.to_string()))?;
            let file_appender = tracing_appender::rolling::daily(dir, file_prefix);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(&settings.file_level));
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    Ok(guard)
}
