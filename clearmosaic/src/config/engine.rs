//! Engine thresholds and limits.

use std::time::Duration;

use super::ConfigError;
use crate::cloud::DilationKernel;

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Default cloud fraction above which a tile is searched for replacements.
pub const DEFAULT_CLOUD_FRACTION_LIMIT: f64 = 0.01;

/// Default dilation aperture in pixels.
pub const DEFAULT_DILATION_APERTURE: u32 = 10;

/// Default width of a backward search window in days.
pub const DEFAULT_DAY_STEP: u32 = 6;

/// Default number of days searched before the requested start date.
pub const DEFAULT_DAY_RESERVE: u32 = 12;

/// Default number of near-identical candidate masks tolerated.
pub const DEFAULT_MAX_SIMILAR_TILES: u32 = 5;

/// Default share of equal mask pixels that counts as "similar".
pub const DEFAULT_CORRELATION_LIMIT: f64 = 0.9;

/// Default attempts at fetching a tile's reflectance companion.
pub const DEFAULT_CLASSIFY_ATTEMPTS: u32 = 3;

/// Upper bound for the default worker count.
const MAX_DEFAULT_PARALLEL_DOWNLOADS: usize = 32;

/// Default number of concurrent tile workers: four per CPU, capped at 32.
pub fn default_parallel_downloads() -> usize {
    (rayon::current_num_threads() * 4).clamp(1, MAX_DEFAULT_PARALLEL_DOWNLOADS)
}

/// Immutable configuration of a mosaic run.
///
/// ```
/// use clearmosaic::config::EngineConfig;
///
/// let config = EngineConfig::default()
///     .with_parallel_downloads(8)
///     .with_day_step(10);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Tile edge length in pixels.
    pub tile_size: u32,

    /// Tiles with a dilated cloud fraction above this are searched, and the
    /// search stops once the running fraction drops below it.
    pub cloud_fraction_limit: f64,

    /// Dilation aperture applied to every class mask.
    pub dilation_aperture: u32,

    /// Dilation window shape.
    pub dilation_kernel: DilationKernel,

    /// Width of each backward search window in days.
    pub day_step: u32,

    /// Days searched before the requested start date.
    pub day_reserve: u32,

    /// Similar candidate masks tolerated before a search gives up.
    pub max_similar_tiles: u32,

    /// Share of equal mask pixels above which a candidate counts as similar.
    pub correlation_limit: f64,

    /// Concurrent tile workers.
    pub parallel_downloads: usize,

    /// Timeout of every HTTP request.
    pub request_timeout: Duration,

    /// Attempts at fetching a tile's reflectance companion before the tile
    /// is left unclassified.
    pub classify_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            cloud_fraction_limit: DEFAULT_CLOUD_FRACTION_LIMIT,
            dilation_aperture: DEFAULT_DILATION_APERTURE,
            dilation_kernel: DilationKernel::default(),
            day_step: DEFAULT_DAY_STEP,
            day_reserve: DEFAULT_DAY_RESERVE,
            max_similar_tiles: DEFAULT_MAX_SIMILAR_TILES,
            correlation_limit: DEFAULT_CORRELATION_LIMIT,
            parallel_downloads: default_parallel_downloads(),
            request_timeout: crate::provider::DEFAULT_TIMEOUT,
            classify_attempts: DEFAULT_CLASSIFY_ATTEMPTS,
        }
    }
}

impl EngineConfig {
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_cloud_fraction_limit(mut self, limit: f64) -> Self {
        self.cloud_fraction_limit = limit;
        self
    }

    pub fn with_dilation(mut self, aperture: u32, kernel: DilationKernel) -> Self {
        self.dilation_aperture = aperture;
        self.dilation_kernel = kernel;
        self
    }

    pub fn with_day_step(mut self, days: u32) -> Self {
        self.day_step = days;
        self
    }

    pub fn with_day_reserve(mut self, days: u32) -> Self {
        self.day_reserve = days;
        self
    }

    pub fn with_max_similar_tiles(mut self, count: u32) -> Self {
        self.max_similar_tiles = count;
        self
    }

    pub fn with_correlation_limit(mut self, limit: f64) -> Self {
        self.correlation_limit = limit;
        self
    }

    pub fn with_parallel_downloads(mut self, workers: usize) -> Self {
        self.parallel_downloads = workers;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_classify_attempts(mut self, attempts: u32) -> Self {
        self.classify_attempts = attempts;
        self
    }

    /// Checks that every limit is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("tile_size", self.tile_size as u64),
            ("day_step", self.day_step as u64),
            ("max_similar_tiles", self.max_similar_tiles as u64),
            ("parallel_downloads", self.parallel_downloads as u64),
            ("classify_attempts", self.classify_attempts as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }

        for (name, value) in [
            ("cloud_fraction_limit", self.cloud_fraction_limit),
            ("correlation_limit", self.correlation_limit),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid("request_timeout must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.tile_size, 512);
        assert_eq!(config.cloud_fraction_limit, 0.01);
        assert_eq!(config.dilation_aperture, 10);
        assert_eq!(config.dilation_kernel, DilationKernel::Legacy);
        assert_eq!(config.day_step, 6);
        assert_eq!(config.day_reserve, 12);
        assert_eq!(config.max_similar_tiles, 5);
        assert_eq!(config.correlation_limit, 0.9);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.parallel_downloads >= 1 && config.parallel_downloads <= 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::default()
            .with_tile_size(256)
            .with_dilation(3, DilationKernel::Symmetric)
            .with_day_reserve(0)
            .with_classify_attempts(1);

        assert_eq!(config.tile_size, 256);
        assert_eq!(config.dilation_aperture, 3);
        assert_eq!(config.dilation_kernel, DilationKernel::Symmetric);
        assert_eq!(config.day_reserve, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_step() {
        let config = EngineConfig::default().with_day_step(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = EngineConfig::default().with_parallel_downloads(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_fraction() {
        assert!(EngineConfig::default()
            .with_cloud_fraction_limit(1.5)
            .validate()
            .is_err());
        assert!(EngineConfig::default()
            .with_correlation_limit(-0.1)
            .validate()
            .is_err());
    }
}
