//! Crate-level error type.

use thiserror::Error;

use crate::canvas::CanvasError;
use crate::cloud::SegmentationError;
use crate::config::ConfigError;
use crate::coord::CoordError;
use crate::provider::ProviderError;

/// A failure that aborts a mosaic run.
///
/// Tile fetch failures and failed replacement iterations never surface
/// here; they are logged and counted in the run reports instead.
#[derive(Debug, Error)]
pub enum MosaicError {
    #[error("Invalid extent: {0}")]
    Coord(#[from] CoordError),

    #[error("Mosaic registration failed: {0}")]
    Registration(#[from] ProviderError),

    #[error("Cloud classification failed: {0}")]
    Segmentation(#[from] SegmentationError),

    #[error("Output raster failed: {0}")]
    Canvas(#[from] CanvasError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to create worker pool: {0}")]
    WorkerPool(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        let err: MosaicError = SegmentationError::Classifier("boom".into()).into();
        assert!(matches!(err, MosaicError::Segmentation(_)));
        assert!(err.to_string().contains("boom"));

        let err: MosaicError = ProviderError::Registration("no key".into()).into();
        assert!(matches!(err, MosaicError::Registration(_)));

        let err: MosaicError = CoordError::InvalidZoom(40).into();
        assert!(matches!(err, MosaicError::Coord(_)));
    }
}
