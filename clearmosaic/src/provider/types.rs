//! Provider error type.

use thiserror::Error;

use crate::raster::RasterError;

/// Errors from tile sources and mosaic registration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// Transport failure or non-success HTTP status.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The server has no tile at the requested address.
    #[error("Tile not found: {0}")]
    TileNotFound(String),

    /// The server answered with an empty body.
    #[error("Empty tile: {0}")]
    EmptyTile(String),

    /// The tile body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Mosaic registration was rejected or returned no key.
    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Unsupported zoom level: {0}")]
    UnsupportedZoom(u8),
}

impl From<RasterError> for ProviderError {
    fn from(e: RasterError) -> Self {
        ProviderError::Decode(e.to_string())
    }
}
