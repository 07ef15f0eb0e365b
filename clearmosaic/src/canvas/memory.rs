//! In-memory raster target.

use std::path::Path;

use parking_lot::Mutex;

use super::{CanvasError, RasterLayout, RasterTarget};
use crate::geotiff;
use crate::raster::TileBuffer;

/// Raster held entirely in memory.
pub struct MemoryCanvas {
    layout: RasterLayout,
    pixels: Mutex<TileBuffer>,
}

impl MemoryCanvas {
    /// Creates a zero-filled canvas.
    pub fn new(layout: RasterLayout) -> Result<Self, CanvasError> {
        layout.validate()?;
        Ok(Self {
            layout,
            pixels: Mutex::new(TileBuffer::new(layout.width, layout.height, layout.bands)),
        })
    }

    /// Copy of the current pixels.
    pub fn snapshot(&self) -> TileBuffer {
        self.pixels.lock().clone()
    }

    pub fn into_buffer(self) -> TileBuffer {
        self.pixels.into_inner()
    }

    /// Writes the canvas as a GeoTIFF with `rows_per_strip` rows per strip.
    pub fn write_geotiff(&self, path: &Path, rows_per_strip: u32) -> Result<(), CanvasError> {
        let pixels = self.pixels.lock();
        let width = self.layout.width as usize;
        let bands = self.layout.bands;

        geotiff::write_geotiff(path, &self.layout, rows_per_strip, |row, rows| {
            let mut strip = Vec::with_capacity(width * rows as usize * bands as usize);
            for r in row..row + rows {
                for c in 0..self.layout.width {
                    for b in 0..bands {
                        strip.push(pixels.get(b, c, r));
                    }
                }
            }
            Ok(strip)
        })
    }
}

impl RasterTarget for MemoryCanvas {
    fn layout(&self) -> RasterLayout {
        self.layout
    }

    fn write_block(&self, x: u32, y: u32, block: &TileBuffer) -> Result<(), CanvasError> {
        self.layout
            .check_block(x, y, block.width(), block.height(), block.bands())?;
        let pixel_type = self.layout.pixel_type;

        let mut pixels = self.pixels.lock();
        for band in 0..block.bands() {
            for row in 0..block.height() {
                for col in 0..block.width() {
                    let value = pixel_type.clamp(block.get(band, col, row));
                    pixels.set(band, x + col, y + row, value);
                }
            }
        }
        Ok(())
    }

    fn read_block(
        &self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<TileBuffer, CanvasError> {
        self.layout
            .check_block(x, y, width, height, self.layout.bands)?;
        Ok(self.pixels.lock().window(x, y, width, height)?)
    }

    fn flush(&self) -> Result<(), CanvasError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::GeoReference;
    use crate::raster::PixelType;

    fn layout(width: u32, height: u32, bands: u32) -> RasterLayout {
        RasterLayout::new(
            width,
            height,
            bands,
            PixelType::Byte,
            GeoReference {
                origin_x: 0.0,
                origin_y: 0.0,
                resolution: 1.0,
                epsg: 3857,
            },
        )
    }

    #[test]
    fn test_write_then_read_block() {
        let canvas = MemoryCanvas::new(layout(4, 4, 2)).unwrap();
        let block = TileBuffer::filled(2, 2, 2, 9);

        canvas.write_block(2, 2, &block).unwrap();

        assert_eq!(canvas.read_block(2, 2, 2, 2).unwrap(), block);
        assert!(canvas.read_block(0, 0, 2, 2).unwrap().is_all_zero());
    }

    #[test]
    fn test_write_clamps_to_pixel_type() {
        let canvas = MemoryCanvas::new(layout(1, 1, 1)).unwrap();
        canvas
            .write_block(0, 0, &TileBuffer::filled(1, 1, 1, 1000))
            .unwrap();
        assert_eq!(canvas.snapshot().get(0, 0, 0), 255);
    }

    #[test]
    fn test_write_rejects_out_of_bounds() {
        let canvas = MemoryCanvas::new(layout(4, 4, 1)).unwrap();
        let result = canvas.write_block(3, 0, &TileBuffer::new(2, 2, 1));
        assert!(matches!(result, Err(CanvasError::Raster(_))));
    }

    #[test]
    fn test_new_rejects_empty_layout() {
        assert!(matches!(
            MemoryCanvas::new(layout(0, 4, 1)),
            Err(CanvasError::InvalidLayout(_))
        ));
    }
}
