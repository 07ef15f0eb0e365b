//! Concurrent mosaic assembly.
//!
//! Fills a [`RasterTarget`] with every tile of a [`TileGrid`]:
//!
//! ```text
//! for each row y (in order):
//!     par_iter x ─► fetch(x, y) ─► RowAccumulator::insert   (failures queued)
//!     canvas.write_block(row) + flush
//! for each queued failure (sequential):
//!     fetch once more ─► canvas.write_block(tile)           (or report)
//! ```
//!
//! A tile fails when the fetch errors, the body is empty, or the decoded
//! tile is all zeros. Failed tiles that also fail the repair fetch stay
//! zero-filled and are listed in [`AssemblyReport::unrepaired`].

mod row;

pub use row::RowAccumulator;

use std::fmt;

use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::canvas::{CanvasError, RasterTarget};
use crate::coord::TileGrid;
use crate::provider::{MosaicKey, TileRequest, TileSource};
use crate::raster::{DataProduct, TileBuffer};

/// A tile that could not be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub x: u32,
    pub y: u32,
    pub reason: String,
}

impl FetchFailure {
    pub fn new(x: u32, y: u32, reason: impl Into<String>) -> Self {
        Self {
            x,
            y,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tile ({}, {}): {}", self.x, self.y, self.reason)
    }
}

/// Counts of an assembly run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssemblyReport {
    /// Tiles in the grid.
    pub tiles: u64,
    /// Tiles placed by the row pass.
    pub fetched: u64,
    /// Tiles placed by the repair pass.
    pub repaired: u64,
    /// Tiles left zero-filled.
    pub unrepaired: Vec<(u32, u32)>,
}

impl AssemblyReport {
    pub fn is_complete(&self) -> bool {
        self.unrepaired.is_empty()
    }
}

/// Fetches every tile of a grid from one mosaic into a canvas.
pub struct MosaicAssembler<'a> {
    grid: &'a TileGrid,
    key: &'a MosaicKey,
    product: DataProduct,
    source: &'a dyn TileSource,
}

impl<'a> MosaicAssembler<'a> {
    pub fn new(
        grid: &'a TileGrid,
        key: &'a MosaicKey,
        product: DataProduct,
        source: &'a dyn TileSource,
    ) -> Self {
        Self {
            grid,
            key,
            product,
            source,
        }
    }

    /// Runs the row pass and the repair pass.
    ///
    /// Only canvas failures are returned as errors.
    pub fn run(
        &self,
        pool: &ThreadPool,
        canvas: &dyn RasterTarget,
    ) -> Result<AssemblyReport, CanvasError> {
        let mut report = AssemblyReport {
            tiles: self.grid.tile_count(),
            ..Default::default()
        };
        let bands = canvas.layout().bands;
        let tile_size = self.grid.tile_size();
        let mut failures = Vec::new();

        info!(
            columns = self.grid.columns(),
            rows = self.grid.rows(),
            product = %self.product,
            "Assembling mosaic"
        );

        for y in self.grid.y_range() {
            let row = RowAccumulator::new(self.grid.columns(), tile_size, bands);
            let row_failures = Mutex::new(Vec::new());

            pool.install(|| {
                self.grid.x_range().into_par_iter().for_each(|x| {
                    let placed = self
                        .fetch(x, y)
                        .and_then(|tile| {
                            row.insert(x - self.grid.x_min(), &tile)
                                .map_err(|e| FetchFailure::new(x, y, e.to_string()))
                        });
                    if let Err(failure) = placed {
                        debug!(tile_x = x, tile_y = y, reason = %failure.reason, "Tile failed");
                        row_failures.lock().push(failure);
                    }
                });
            });

            let row_failures = row_failures.into_inner();
            report.fetched += self.grid.columns() as u64 - row_failures.len() as u64;
            failures.extend(row_failures);

            let (_, py) = self.grid.pixel_offset(self.grid.x_min(), y);
            canvas.write_block(0, py, &row.into_buffer())?;
            canvas.flush()?;
            info!(
                row = y,
                fetched = report.fetched,
                failed = failures.len(),
                "Row assembled"
            );
        }

        if !failures.is_empty() {
            info!(count = failures.len(), "Retrying failed tiles");
        }
        failures.sort_by_key(|f| (f.y, f.x));
        for failure in failures {
            match self.fetch(failure.x, failure.y) {
                Ok(tile) => {
                    let (px, py) = self.grid.pixel_offset(failure.x, failure.y);
                    match canvas.write_block(px, py, &tile) {
                        Ok(()) => {
                            canvas.flush()?;
                            report.repaired += 1;
                            debug!(tile_x = failure.x, tile_y = failure.y, "Tile repaired");
                        }
                        Err(CanvasError::Raster(e)) => {
                            warn!(tile_x = failure.x, tile_y = failure.y, error = %e, "Repaired tile does not fit");
                            report.unrepaired.push((failure.x, failure.y));
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(retry) => {
                    warn!(tile_x = retry.x, tile_y = retry.y, reason = %retry.reason, "Tile could not be downloaded");
                    report.unrepaired.push((failure.x, failure.y));
                }
            }
        }

        if !report.is_complete() {
            warn!(
                count = report.unrepaired.len(),
                "Some tiles failed twice and were left empty"
            );
        }
        Ok(report)
    }

    /// Fetches one tile, treating empty and all-zero tiles as failures.
    fn fetch(&self, x: u32, y: u32) -> Result<TileBuffer, FetchFailure> {
        let request = TileRequest::new(self.key.clone(), self.product, self.grid.zoom(), x, y);
        let tile = self
            .source
            .fetch(&request)
            .map_err(|e| FetchFailure::new(x, y, e.to_string()))?;

        let size = self.grid.tile_size();
        if tile.width() != size || tile.height() != size {
            return Err(FetchFailure::new(
                x,
                y,
                format!("tile is {}x{}, expected {}x{}", tile.width(), tile.height(), size, size),
            ));
        }
        if tile.is_all_zero() {
            return Err(FetchFailure::new(x, y, "tile holds no data"));
        }
        Ok(tile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{MemoryCanvas, RasterLayout};
    use crate::provider::{DateWindow, MockTileSource, ProviderError};
    use crate::raster::PixelType;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key() -> MosaicKey {
        let day = NaiveDate::from_ymd_opt(2023, 8, 1).unwrap();
        MosaicKey::new("k", DateWindow::new(day, day))
    }

    fn canvas_for(grid: &TileGrid, bands: u32) -> MemoryCanvas {
        MemoryCanvas::new(RasterLayout::new(
            grid.canvas_width(),
            grid.canvas_height(),
            bands,
            PixelType::Int16,
            grid.georeference(),
        ))
        .unwrap()
    }

    fn pool() -> ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap()
    }

    #[test]
    fn test_two_by_two_grid_places_tiles() {
        let grid = TileGrid::new(1, 0, 1, 0, 1, 2).unwrap();
        let source = MockTileSource::new(|r: &TileRequest| {
            Ok(TileBuffer::filled(2, 2, 1, (10 * r.x + r.y) as i32))
        });
        let canvas = canvas_for(&grid, 1);

        let report = MosaicAssembler::new(&grid, &key(), DataProduct::B08, &source)
            .run(&pool(), &canvas)
            .unwrap();

        let pixels = canvas.snapshot();
        let tile_value = |x: u32, y: u32| pixels.get(0, x * 2, y * 2);
        assert_eq!(
            [[tile_value(0, 0), tile_value(0, 1)], [tile_value(1, 0), tile_value(1, 1)]],
            [[0, 1], [10, 11]]
        );
        // The all-zero tile (0, 0) counts as failed and stays empty
        assert_eq!(report.unrepaired, vec![(0, 0)]);
        assert_eq!(report.fetched, 3);
        assert_eq!(source.calls_for(0, 0), 2);
    }

    #[test]
    fn test_tiles_appear_verbatim_at_offset() {
        let grid = TileGrid::new(10, 500, 502, 300, 301, 3).unwrap();
        let source = MockTileSource::new(|r: &TileRequest| {
            let mut tile = TileBuffer::new(3, 3, 2);
            for (i, s) in tile.band_mut(0).iter_mut().enumerate() {
                *s = ((r.x - 500) * 100 + r.y) as i32 + i as i32;
            }
            tile.band_mut(1).fill(r.y as i32);
            Ok(tile)
        });
        let canvas = canvas_for(&grid, 2);

        let report = MosaicAssembler::new(&grid, &key(), DataProduct::Ndvi, &source)
            .run(&pool(), &canvas)
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.tiles, 6);

        let pixels = canvas.snapshot();
        for (x, y) in grid.tiles() {
            let base = ((x - 500) * 100 + y) as i32;
            let (px, py) = grid.pixel_offset(x, y);
            let block = pixels.window(px, py, 3, 3).unwrap();
            assert_eq!(block.get(0, 0, 0), base);
            assert_eq!(block.get(0, 2, 2), base + 8);
            assert_eq!(block.get(1, 1, 1), y as i32);
        }
    }

    #[test]
    fn test_failed_tile_is_repaired_once() {
        let grid = TileGrid::new(2, 0, 2, 1, 1, 2).unwrap();
        let attempts = AtomicUsize::new(0);
        let source = MockTileSource::new(move |r: &TileRequest| {
            if r.x == 1 && attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(ProviderError::HttpError("connection reset".into()));
            }
            Ok(TileBuffer::filled(2, 2, 1, 5))
        });
        let canvas = canvas_for(&grid, 1);

        let report = MosaicAssembler::new(&grid, &key(), DataProduct::B08, &source)
            .run(&pool(), &canvas)
            .unwrap();

        assert_eq!(report.fetched, 2);
        assert_eq!(report.repaired, 1);
        assert!(report.is_complete());
        assert_eq!(source.calls_for(1, 1), 2);
        assert!(canvas.snapshot().samples().iter().all(|&s| s == 5));
    }

    #[test]
    fn test_persistent_failure_is_reported_not_fatal() {
        let grid = TileGrid::new(2, 0, 1, 0, 0, 2).unwrap();
        let source = MockTileSource::new(|r: &TileRequest| {
            if r.x == 0 {
                Err(ProviderError::TileNotFound("gone".into()))
            } else {
                Ok(TileBuffer::filled(2, 2, 1, 3))
            }
        });
        let canvas = canvas_for(&grid, 1);

        let report = MosaicAssembler::new(&grid, &key(), DataProduct::B08, &source)
            .run(&pool(), &canvas)
            .unwrap();

        assert_eq!(report.unrepaired, vec![(0, 0)]);
        assert_eq!(source.calls_for(0, 0), 2);
        let pixels = canvas.snapshot();
        assert_eq!(pixels.get(0, 0, 0), 0);
        assert_eq!(pixels.get(0, 2, 0), 3);
    }

    #[test]
    fn test_wrong_size_tile_is_a_failure() {
        let grid = TileGrid::new(2, 0, 0, 0, 0, 4).unwrap();
        let source = MockTileSource::new(|_: &TileRequest| Ok(TileBuffer::filled(2, 2, 1, 1)));
        let canvas = canvas_for(&grid, 1);

        let report = MosaicAssembler::new(&grid, &key(), DataProduct::B08, &source)
            .run(&pool(), &canvas)
            .unwrap();

        assert_eq!(report.unrepaired, vec![(0, 0)]);
    }

    #[test]
    fn test_band_mismatch_is_a_failure() {
        let grid = TileGrid::new(2, 0, 0, 0, 0, 2).unwrap();
        let source = MockTileSource::new(|_: &TileRequest| Ok(TileBuffer::filled(2, 2, 3, 1)));
        let canvas = canvas_for(&grid, 4);

        let report = MosaicAssembler::new(&grid, &key(), DataProduct::Rgb16, &source)
            .run(&pool(), &canvas)
            .unwrap();

        assert_eq!(report.unrepaired, vec![(0, 0)]);
        assert!(canvas.snapshot().is_all_zero());
    }
}
