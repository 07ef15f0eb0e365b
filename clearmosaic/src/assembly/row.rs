//! Row buffer shared by the workers of one grid row.

use parking_lot::Mutex;

use crate::raster::{RasterError, TileBuffer};

/// Accumulates the tiles of one grid row.
///
/// Workers fetch concurrently and only take the lock for the copy.
pub struct RowAccumulator {
    tile_size: u32,
    buffer: Mutex<TileBuffer>,
}

impl RowAccumulator {
    /// Zero-filled buffer for `columns` tiles of `tile_size` pixels.
    pub fn new(columns: u32, tile_size: u32, bands: u32) -> Self {
        Self {
            tile_size,
            buffer: Mutex::new(TileBuffer::new(columns * tile_size, tile_size, bands)),
        }
    }

    /// Copies `tile` into column `column` of the row.
    pub fn insert(&self, column: u32, tile: &TileBuffer) -> Result<(), RasterError> {
        let offset = column * self.tile_size;
        self.buffer.lock().copy_from(tile, offset, 0)
    }

    pub fn into_buffer(self) -> TileBuffer {
        self.buffer.into_inner()
    }
}
