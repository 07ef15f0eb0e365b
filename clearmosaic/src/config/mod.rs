//! Configuration.
//!
//! - [`EngineConfig`]: immutable thresholds and limits handed to the engine
//! - [`ConfigFile`]: optional `config.ini` in the platform configuration
//!   directory, layered under command-line arguments

mod engine;
mod file;

pub use engine::{
    default_parallel_downloads, EngineConfig, DEFAULT_CLASSIFY_ATTEMPTS,
    DEFAULT_CLOUD_FRACTION_LIMIT, DEFAULT_CORRELATION_LIMIT, DEFAULT_DAY_RESERVE,
    DEFAULT_DAY_STEP, DEFAULT_DILATION_APERTURE, DEFAULT_MAX_SIMILAR_TILES, DEFAULT_TILE_SIZE,
};
pub use file::{config_file_path, ConfigFile, DEFAULT_MAX_CLOUD_COVER};

use std::path::PathBuf;

use thiserror::Error;

/// Errors loading or validating configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Invalid value '{value}' for {section}.{key}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
