//! Console and rolling-file logging.

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Prefix of the daily log files (`image_exporter.<date>`).
pub const LOG_FILE_PREFIX: &str = "image_exporter";

/// Guard that must be held to keep the async file writer running
pub struct LogGuard {
    _guard: WorkerGuard,
}

/// Default filter directive for the chosen verbosity.
pub fn default_level(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the level.
///
/// Returns a guard that must be held for the lifetime of the application
/// so buffered file output is flushed.
pub fn init_logging(logs_dir: &Path, debug: bool) -> Result<LogGuard, Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(debug)));

    std::fs::create_dir_all(logs_dir)
        .map_err(|e| format!("Failed to create log directory {}: {}", logs_dir.display(), e))?;
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .build(logs_dir)?;
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = fmt::layer().with_writer(io::stderr).with_target(false);
    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(LogGuard { _guard: guard })
}
