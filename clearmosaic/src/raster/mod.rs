//! Raster primitives shared by assembly, classification and output.
//!
//! - [`TileBuffer`]: band-sequential `i32` samples of a tile or a tile row
//! - [`PixelType`]: sample type of the output raster
//! - [`DataProduct`]: product catalogue (bands, type, collection, templates)
//! - [`decode_tile`]: PNG/TIFF tile decoding

mod buffer;
mod decode;
mod product;

pub use buffer::{PixelType, TileBuffer};
pub use decode::{decode_png, decode_tiff, decode_tile};
pub use product::{DataProduct, TileEncoding};

#[cfg(test)]
pub use decode::tests::{png_rgba, tiff_rgba16};

use thiserror::Error;

/// Errors produced while building, copying or decoding pixel buffers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RasterError {
    #[error("Expected {expected} samples, got {actual}")]
    SampleCount { expected: usize, actual: usize },

    #[error("Expected {expected} bands, got {actual}")]
    BandMismatch { expected: u32, actual: u32 },

    #[error("Block {width}x{height} at ({x}, {y}) exceeds the target raster")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    #[error("Unknown data product: {0}")]
    UnknownProduct(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}
