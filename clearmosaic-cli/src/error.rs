//! CLI error type.

use std::fmt;

use clearmosaic::logging::LoggingError;
use clearmosaic::{ConfigError, MosaicError, SegmentationError};

/// Errors reported by the command-line interface.
#[derive(Debug)]
pub enum CliError {
    /// Configuration file or argument problem.
    Config(String),
    /// Logging could not be set up.
    Logging(LoggingError),
    /// The cloud model could not be loaded.
    Classifier(String),
    /// HTTP client or registrar setup failed.
    Provider(String),
    /// The mosaic run failed.
    Mosaic(MosaicError),
    /// The run report could not be written.
    Report(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Classifier(msg) => write!(f, "Failed to load cloud model: {}", msg),
            CliError::Provider(msg) => write!(f, "Failed to set up tile provider: {}", msg),
            CliError::Mosaic(e) => write!(f, "{}", e),
            CliError::Report(msg) => write!(f, "Failed to write report: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<MosaicError> for CliError {
    fn from(e: MosaicError) -> Self {
        CliError::Mosaic(e)
    }
}

impl From<SegmentationError> for CliError {
    fn from(e: SegmentationError) -> Self {
        CliError::Classifier(e.to_string())
    }
}
