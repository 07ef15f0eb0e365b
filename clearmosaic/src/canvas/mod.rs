//! Output rasters.
//!
//! A [`RasterTarget`] is a georeferenced raster that tiles and masks are
//! written into block by block. Targets serialise their own writes, so a
//! shared `Arc<dyn RasterTarget>` can be handed to every worker.
//!
//! ```text
//!   assembly ──write_block(row)──┐
//!   repair   ──write_block(tile)─┼──► RasterTarget ──finish──► GeoTIFF
//!   replace  ──read/write(tile)──┘
//! ```
//!
//! Two implementations exist:
//!
//! - [`MemoryCanvas`]: whole raster in memory, used by tests and small
//!   extents
//! - [`DiskCanvas`]: raw scratch file re-opened per block, converted to
//!   GeoTIFF on [`DiskCanvas::finish`]

mod disk;
mod memory;

pub use disk::DiskCanvas;
pub use memory::MemoryCanvas;

use thiserror::Error;

use crate::coord::GeoReference;
use crate::raster::{PixelType, RasterError, TileBuffer};

/// Errors from output raster operations. Always fatal to a run.
#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF encoding error: {0}")]
    Tiff(String),

    #[error("Raster error: {0}")]
    Raster(#[from] RasterError),

    #[error("Invalid layout: {0}")]
    InvalidLayout(String),
}

impl From<tiff::TiffError> for CanvasError {
    fn from(e: tiff::TiffError) -> Self {
        CanvasError::Tiff(e.to_string())
    }
}

/// Shape, sample type and georeference of a raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterLayout {
    pub width: u32,
    pub height: u32,
    pub bands: u32,
    pub pixel_type: PixelType,
    pub georeference: GeoReference,
}

impl RasterLayout {
    pub fn new(
        width: u32,
        height: u32,
        bands: u32,
        pixel_type: PixelType,
        georeference: GeoReference,
    ) -> Self {
        Self {
            width,
            height,
            bands,
            pixel_type,
            georeference,
        }
    }

    /// Same extent and georeference with a different band layout.
    pub fn with_bands(self, bands: u32, pixel_type: PixelType) -> Self {
        Self {
            bands,
            pixel_type,
            ..self
        }
    }

    pub(crate) fn validate(&self) -> Result<(), CanvasError> {
        if self.width == 0 || self.height == 0 || self.bands == 0 {
            return Err(CanvasError::InvalidLayout(format!(
                "{}x{} with {} bands",
                self.width, self.height, self.bands
            )));
        }
        Ok(())
    }

    /// Rejects blocks that do not fit inside the raster.
    pub(crate) fn check_block(
        &self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        bands: u32,
    ) -> Result<(), CanvasError> {
        if bands != self.bands {
            return Err(RasterError::BandMismatch {
                expected: self.bands,
                actual: bands,
            }
            .into());
        }
        if x as u64 + width as u64 > self.width as u64
            || y as u64 + height as u64 > self.height as u64
        {
            return Err(RasterError::OutOfBounds {
                x,
                y,
                width,
                height,
            }
            .into());
        }
        Ok(())
    }
}

/// A georeferenced raster written block by block.
///
/// Implementations hold their own lock; every call is atomic with respect
/// to other calls on the same target.
pub trait RasterTarget: Send + Sync {
    /// Shape and georeference of the raster.
    fn layout(&self) -> RasterLayout;

    /// Writes `block` with its top-left corner at pixel `(x, y)`.
    fn write_block(&self, x: u32, y: u32, block: &TileBuffer) -> Result<(), CanvasError>;

    /// Reads the `width × height` block whose top-left corner is `(x, y)`.
    fn read_block(&self, x: u32, y: u32, width: u32, height: u32)
        -> Result<TileBuffer, CanvasError>;

    /// Makes previous writes durable.
    fn flush(&self) -> Result<(), CanvasError>;
}
