//! INI configuration file.
//!
//! ```ini
//! [mosaic]
//! product = RGB
//! tile_size = 512
//!
//! [search]
//! cloud_fraction_limit = 0.01
//! dilation_aperture = 10
//! dilation_kernel = legacy
//! day_step = 6
//! day_reserve = 12
//! max_similar_tiles = 5
//! correlation_limit = 0.9
//! classify_attempts = 3
//!
//! [download]
//! parallel_downloads = 32
//! timeout = 30
//! max_cloud_cover = 20
//! register_url = https://planetarycomputer.microsoft.com/api/data/v1/mosaic/register
//!
//! [output]
//! directory = ~/mosaics
//! save_masks = false
//!
//! [classifier]
//! model = ~/models/clouds.onnx
//! input_name = x.1
//!
//! [logging]
//! level = info
//! directory = ~/.local/share/clearmosaic/logs
//!
//! [templates]
//! RGB = https://tiles.example.com/{key}/{z}/{x}/{y}.png
//! ```
//!
//! Every key is optional. Unknown sections and keys are ignored.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use tracing::debug;

use super::{ConfigError, EngineConfig};
use crate::logging::LoggingConfig;
use crate::provider::{UrlTemplates, PLANETARY_COMPUTER_REGISTER_URL};
use crate::raster::DataProduct;

/// Directory name under the platform configuration directory.
const CONFIG_DIR_NAME: &str = "clearmosaic";

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.ini";

/// Default scene cloud-cover ceiling for the primary mosaic, in percent.
pub const DEFAULT_MAX_CLOUD_COVER: u8 = 20;

/// Default ONNX input tensor name.
const DEFAULT_MODEL_INPUT: &str = "x.1";

/// Returns `<config dir>/clearmosaic/config.ini`, if the platform has a
/// configuration directory.
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Expands a leading `~` to the home directory.
fn expand_tilde(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

/// Settings loaded from `config.ini`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub engine: EngineConfig,
    /// Product used when none is given on the command line.
    pub product: DataProduct,
    /// Scene cloud-cover ceiling of the primary mosaic, in percent.
    pub max_cloud_cover: u8,
    pub register_url: String,
    /// Directory for outputs given without a path.
    pub output_directory: Option<PathBuf>,
    pub save_masks: bool,
    pub model_path: Option<PathBuf>,
    pub model_input_name: String,
    pub logging: LoggingConfig,
    pub templates: UrlTemplates,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            product: DataProduct::Rgb,
            max_cloud_cover: DEFAULT_MAX_CLOUD_COVER,
            register_url: PLANETARY_COMPUTER_REGISTER_URL.to_string(),
            output_directory: None,
            save_masks: false,
            model_path: None,
            model_input_name: DEFAULT_MODEL_INPUT.to_string(),
            logging: LoggingConfig::default(),
            templates: UrlTemplates::new(),
        }
    }
}

impl ConfigFile {
    /// Loads the file at the default location, or defaults when it does not
    /// exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        match config_file_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                debug!("No configuration file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Loads `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "Configuration file not found, using defaults");
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        debug!(path = %path.display(), "Loaded configuration file");
        Self::from_ini(&ini)
    }

    /// Parses configuration text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Read {
            path: PathBuf::from("<string>"),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("mosaic")) {
            let s = Section::new("mosaic", section);
            if let Some(product) = s.parse("product")? {
                config.product = product;
            }
            if let Some(tile_size) = s.parse("tile_size")? {
                config.engine.tile_size = tile_size;
            }
        }

        if let Some(section) = ini.section(Some("search")) {
            let s = Section::new("search", section);
            let engine = &mut config.engine;
            if let Some(v) = s.parse("cloud_fraction_limit")? {
                engine.cloud_fraction_limit = v;
            }
            if let Some(v) = s.parse("dilation_aperture")? {
                engine.dilation_aperture = v;
            }
            if let Some(v) = s.parse("dilation_kernel")? {
                engine.dilation_kernel = v;
            }
            if let Some(v) = s.parse("day_step")? {
                engine.day_step = v;
            }
            if let Some(v) = s.parse("day_reserve")? {
                engine.day_reserve = v;
            }
            if let Some(v) = s.parse("max_similar_tiles")? {
                engine.max_similar_tiles = v;
            }
            if let Some(v) = s.parse("correlation_limit")? {
                engine.correlation_limit = v;
            }
            if let Some(v) = s.parse("classify_attempts")? {
                engine.classify_attempts = v;
            }
        }

        if let Some(section) = ini.section(Some("download")) {
            let s = Section::new("download", section);
            if let Some(v) = s.parse("parallel_downloads")? {
                config.engine.parallel_downloads = v;
            }
            if let Some(secs) = s.parse::<u64>("timeout")? {
                config.engine.request_timeout = Duration::from_secs(secs);
            }
            if let Some(v) = s.parse::<u8>("max_cloud_cover")? {
                config.max_cloud_cover = v.min(100);
            }
            if let Some(url) = s.get("register_url") {
                config.register_url = url.to_string();
            }
        }

        if let Some(section) = ini.section(Some("output")) {
            let s = Section::new("output", section);
            config.output_directory = s.get("directory").map(expand_tilde);
            if let Some(v) = s.parse_bool("save_masks")? {
                config.save_masks = v;
            }
        }

        if let Some(section) = ini.section(Some("classifier")) {
            let s = Section::new("classifier", section);
            config.model_path = s.get("model").map(expand_tilde);
            if let Some(name) = s.get("input_name") {
                config.model_input_name = name.to_string();
            }
        }

        if let Some(section) = ini.section(Some("logging")) {
            let s = Section::new("logging", section);
            if let Some(level) = s.get("level") {
                config.logging.level = level.to_string();
            }
            config.logging.directory = s.get("directory").map(expand_tilde);
        }

        if let Some(section) = ini.section(Some("templates")) {
            let mut templates = UrlTemplates::new();
            for (key, template) in section.iter() {
                let product =
                    DataProduct::from_str(key).map_err(|_| ConfigError::InvalidValue {
                        section: "templates".to_string(),
                        key: key.to_string(),
                        value: template.to_string(),
                    })?;
                templates = templates.with_template(product, template);
            }
            config.templates = templates;
        }

        config.engine.validate()?;
        Ok(config)
    }
}

/// A section with typed lookups. Empty values count as unset.
struct Section<'a> {
    name: &'static str,
    properties: &'a Properties,
}

impl<'a> Section<'a> {
    fn new(name: &'static str, properties: &'a Properties) -> Self {
        Self { name, properties }
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.properties
            .get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn invalid(&self, key: &str, value: &str) -> ConfigError {
        ConfigError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.get(key) {
            Some(raw) => raw.parse().map(Some).map_err(|_| self.invalid(key, raw)),
            None => Ok(None),
        }
    }

    fn parse_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.get(key) {
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" | "on" => Ok(Some(true)),
                "false" | "no" | "0" | "off" => Ok(Some(false)),
                _ => Err(self.invalid(key, raw)),
            },
            None => Ok(None),
        }
    }
}
