//! Logging setup.
//!
//! Installs a `tracing` subscriber with:
//!
//! - an [`EnvFilter`] built from `RUST_LOG`, falling back to the configured
//!   level
//! - a console layer (warnings and errors go to stderr)
//! - optionally a daily-rolling file layer behind a non-blocking writer
//!
//! Keep the returned [`LogGuard`] alive for the whole run; dropping it
//! flushes and stops the file writer.

use std::path::PathBuf;

use thiserror::Error;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder as RollingBuilder, Rotation};
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default log filter.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Log file name prefix.
const LOG_FILE_PREFIX: &str = "clearmosaic";

/// Rotated log files kept on disk.
const MAX_LOG_FILES: usize = 7;

/// Errors installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {message}")]
    Filter { filter: String, message: String },

    #[error("Failed to create log directory {path}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to create log file appender: {0}")]
    Appender(String),

    #[error("Logger already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Where and how much to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or
    /// `clearmosaic=debug`.
    pub level: String,

    /// Directory for rolling log files. `None` logs to the console only.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            directory: None,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }
}

/// Keeps the file writer alive.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Builds the filter, preferring `RUST_LOG`.
fn env_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| LoggingError::Filter {
            filter: level.to_string(),
            message: e.to_string(),
        })
}

/// Installs the global subscriber.
pub fn init(config: &LoggingConfig) -> Result<LogGuard, LoggingError> {
    let filter = env_filter(&config.level)?;

    let console_writer = std::io::stderr
        .with_max_level(Level::WARN)
        .or_else(std::io::stdout);
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_timer(LocalTime::rfc_3339())
        .with_writer(console_writer);

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory).map_err(|source| LoggingError::Directory {
                path: directory.clone(),
                source,
            })?;

            let appender = RollingBuilder::new()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix("log")
                .max_log_files(MAX_LOG_FILES)
                .build(directory)
                .map_err(|e| LoggingError::Appender(e.to_string()))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_timer(LocalTime::rfc_3339())
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(LogGuard { _file: guard })
}
