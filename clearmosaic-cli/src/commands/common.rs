//! Arguments and helpers shared across CLI commands.

use std::path::Path;

use clap::Args;
use clearmosaic::{BoundingBox, ConfigFile, EngineConfig};

use crate::error::CliError;

/// Geographic extent and zoom level of a mosaic.
#[derive(Debug, Args)]
pub struct ExtentArgs {
    /// Western edge in degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lon_min: f64,

    /// Eastern edge in degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lon_max: f64,

    /// Southern edge in degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lat_min: f64,

    /// Northern edge in degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lat_max: f64,

    /// Zoom level (0-22)
    #[arg(long, short)]
    pub zoom: u8,

    /// Tile size in pixels [default: from config, 512]
    #[arg(long)]
    pub tile_size: Option<u32>,
}

impl ExtentArgs {
    pub fn bbox(&self) -> Result<BoundingBox, CliError> {
        BoundingBox::new(self.lon_min, self.lon_max, self.lat_min, self.lat_max)
            .map_err(|e| CliError::Config(e.to_string()))
    }

    /// Tile size from the command line, falling back to the engine config.
    pub fn tile_size(&self, engine: &EngineConfig) -> u32 {
        self.tile_size.unwrap_or(engine.tile_size)
    }
}

/// Loads the configuration file.
///
/// An explicit path must exist; the default location is optional.
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    match path {
        Some(path) if !path.exists() => Err(CliError::Config(format!(
            "Configuration file not found: {}",
            path.display()
        ))),
        Some(path) => Ok(ConfigFile::load(path)?),
        None => Ok(ConfigFile::load_default()?),
    }
}
