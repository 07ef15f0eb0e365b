//! Replacement pass over the assembled canvas.

use rayon::prelude::*;
use rayon::ThreadPool;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{CandidateFetcher, ReplacementState, SearchPlan, TemporalSearch, Termination};
use crate::canvas::RasterTarget;
use crate::cloud::{ClassMask, CloudSegmenter, SegmentationError};
use crate::config::EngineConfig;
use crate::coord::TileGrid;
use crate::error::MosaicError;
use crate::provider::{MosaicKey, TileRequest, TileSource};
use crate::raster::{DataProduct, TileBuffer};

/// Rasters receiving the class masks before and after replacement.
#[derive(Clone, Copy)]
pub struct MaskTargets<'a> {
    pub before: &'a dyn RasterTarget,
    pub after: &'a dyn RasterTarget,
}

/// Counts of a replacement pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplacementReport {
    /// Tiles whose companion was classified.
    pub classified: usize,
    /// Tiles above the cloud limit that were searched.
    pub searched: usize,
    pub cleared: usize,
    pub stagnated: usize,
    pub exhausted: usize,
    /// Tiles whose companion never arrived, left as assembled.
    pub unclassified: Vec<(u32, u32)>,
}

/// What happened to one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TileOutcome {
    Unclassified,
    Clear,
    Searched(Termination),
}

impl ReplacementReport {
    fn record(&mut self, x: u32, y: u32, outcome: TileOutcome) {
        match outcome {
            TileOutcome::Unclassified => self.unclassified.push((x, y)),
            TileOutcome::Clear => self.classified += 1,
            TileOutcome::Searched(termination) => {
                self.classified += 1;
                self.searched += 1;
                match termination {
                    Termination::Cleared => self.cleared += 1,
                    Termination::Stagnated => self.stagnated += 1,
                    Termination::Exhausted => self.exhausted += 1,
                }
            }
        }
    }

    /// Tiles searched but left above the cloud limit.
    pub fn still_cloudy(&self) -> usize {
        self.stagnated + self.exhausted
    }
}

/// Classifies every tile of the canvas and searches older mosaics for the
/// cloudy ones.
///
/// Rows run in order; the tiles of a row run on the pool. Each worker:
///
/// ```text
/// fetch companion (primary key, up to classify_attempts)
///   → classify + dilate → before mask
///   → cloud fraction > limit ?
///        read tile from canvas → TemporalSearch → write tile back
///   → after mask
/// ```
pub struct ReplacementPass<'a> {
    pub grid: &'a TileGrid,
    pub key: &'a MosaicKey,
    pub product: DataProduct,
    pub source: &'a dyn TileSource,
    pub fetcher: &'a dyn CandidateFetcher,
    pub segmenter: &'a CloudSegmenter,
    pub config: &'a EngineConfig,
    pub plan: SearchPlan,
}

impl<'a> ReplacementPass<'a> {
    /// Runs the pass. Classifier and output failures abort it.
    pub fn run(
        &self,
        pool: &ThreadPool,
        canvas: &dyn RasterTarget,
        masks: Option<MaskTargets<'_>>,
    ) -> Result<ReplacementReport, MosaicError> {
        let mut report = ReplacementReport::default();

        for y in self.grid.y_range() {
            let outcomes: Vec<(u32, TileOutcome)> = pool.install(|| {
                self.grid
                    .x_range()
                    .into_par_iter()
                    .map(|x| self.process_tile(x, y, canvas, masks).map(|o| (x, o)))
                    .collect::<Result<Vec<_>, MosaicError>>()
            })?;

            for (x, outcome) in outcomes {
                report.record(x, y, outcome);
            }
            info!(
                row = y,
                classified = report.classified,
                searched = report.searched,
                "Replacement row complete"
            );
        }

        if !report.unclassified.is_empty() {
            warn!(
                count = report.unclassified.len(),
                "Some tiles could not be classified and were left as assembled"
            );
        }
        if report.still_cloudy() > 0 {
            warn!(
                count = report.still_cloudy(),
                "Some cloudy tiles could not be fully replaced"
            );
        }
        Ok(report)
    }

    fn process_tile(
        &self,
        x: u32,
        y: u32,
        canvas: &dyn RasterTarget,
        masks: Option<MaskTargets<'_>>,
    ) -> Result<TileOutcome, MosaicError> {
        let companion = match self.fetch_companion(x, y) {
            Some(companion) => companion,
            None => return Ok(TileOutcome::Unclassified),
        };

        let segmentation = match self.segmenter.classify_dilated(
            &companion,
            self.config.dilation_aperture,
            self.config.dilation_kernel,
        ) {
            Ok(segmentation) => segmentation,
            Err(SegmentationError::InvalidInput(detail)) => {
                warn!(tile_x = x, tile_y = y, error = %detail, "Companion tile cannot be classified");
                return Ok(TileOutcome::Unclassified);
            }
            Err(e) => return Err(e.into()),
        };
        debug!(
            tile_x = x,
            tile_y = y,
            cloud_fraction = segmentation.cloud_fraction,
            "Classified tile"
        );

        let (px, py) = self.grid.pixel_offset(x, y);
        if let Some(masks) = masks {
            write_mask(masks.before, px, py, &segmentation.mask)?;
        }

        let (outcome, final_mask) = if segmentation.cloud_fraction > self.config.cloud_fraction_limit
        {
            let size = self.grid.tile_size();
            let pixels = canvas.read_block(px, py, size, size)?;
            let mut state = ReplacementState::new(pixels, segmentation);

            let summary = TemporalSearch::new(self.fetcher, self.segmenter, self.config, &self.plan)
                .run(x, y, &mut state)?;
            debug!(
                tile_x = x,
                tile_y = y,
                termination = %summary.termination,
                iterations = summary.iterations,
                cloud_fraction = summary.cloud_fraction,
                "Search finished"
            );

            let (pixels, mask) = state.into_parts();
            canvas.write_block(px, py, &pixels)?;
            canvas.flush()?;
            (TileOutcome::Searched(summary.termination), mask)
        } else {
            (TileOutcome::Clear, segmentation.mask)
        };

        if let Some(masks) = masks {
            write_mask(masks.after, px, py, &final_mask)?;
        }
        Ok(outcome)
    }

    /// Fetches the tile's reflectance companion from the primary mosaic.
    fn fetch_companion(&self, x: u32, y: u32) -> Option<TileBuffer> {
        let request = TileRequest::new(
            self.key.clone(),
            self.product.companion(),
            self.grid.zoom(),
            x,
            y,
        );
        let attempts = self.config.classify_attempts.max(1);
        for attempt in 1..=attempts {
            match self.source.fetch(&request) {
                Ok(tile) => return Some(tile),
                Err(e) => debug!(
                    tile_x = x,
                    tile_y = y,
                    attempt,
                    error = %e,
                    "Companion fetch failed"
                ),
            }
        }
        warn!(tile_x = x, tile_y = y, attempts, "Companion tile unavailable, skipping classification");
        None
    }
}

fn write_mask(target: &dyn RasterTarget, x: u32, y: u32, mask: &ClassMask) -> Result<(), MosaicError> {
    target.write_block(x, y, &mask.to_tile_buffer())?;
    target.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{MemoryCanvas, RasterLayout};
    use crate::cloud::{BrokenClassifier, ThresholdClassifier};
    use crate::provider::{DateWindow, MockTileSource, ProviderError};
    use crate::raster::PixelType;
    use crate::replacement::search::tests::{companion, QueuedFetcher};
    use crate::replacement::CandidateTiles;
    use chrono::NaiveDate;
    use std::sync::Arc;

    const SIZE: u32 = 4;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn grid() -> TileGrid {
        TileGrid::new(3, 2, 3, 5, 5, SIZE).unwrap()
    }

    fn key() -> MosaicKey {
        MosaicKey::new("primary", DateWindow::new(date(2023, 6, 30), date(2023, 6, 30)))
    }

    fn canvas(bands: u32, pixel_type: PixelType) -> MemoryCanvas {
        let grid = grid();
        MemoryCanvas::new(RasterLayout::new(
            grid.canvas_width(),
            grid.canvas_height(),
            bands,
            pixel_type,
            grid.georeference(),
        ))
        .unwrap()
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
            .with_tile_size(SIZE)
            .with_dilation(1, Default::default())
            .with_parallel_downloads(2)
    }

    fn pool() -> ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    fn plan() -> SearchPlan {
        SearchPlan::new(date(2023, 6, 30), date(2023, 6, 30), 6, 12)
    }

    fn pass<'a>(
        grid: &'a TileGrid,
        key: &'a MosaicKey,
        source: &'a dyn TileSource,
        fetcher: &'a dyn CandidateFetcher,
        segmenter: &'a CloudSegmenter,
        config: &'a EngineConfig,
    ) -> ReplacementPass<'a> {
        ReplacementPass {
            grid,
            key,
            product: DataProduct::Rgb16,
            source,
            fetcher,
            segmenter,
            config,
            plan: plan(),
        }
    }

    #[test]
    fn test_cloudy_tile_is_replaced_and_masks_written() {
        // Tile (2, 5) is cloudy in the primary mosaic, (3, 5) is clear
        let source = MockTileSource::new(|request: &TileRequest| {
            let cloudy = if request.x == 2 { (SIZE * SIZE) as usize } else { 0 };
            Ok(companion(SIZE, cloudy))
        });
        let fetcher = QueuedFetcher::new(vec![Ok(CandidateTiles {
            pixels: TileBuffer::filled(SIZE, SIZE, 4, 42),
            companion: companion(SIZE, 0),
        })]);
        let segmenter = CloudSegmenter::new(Arc::new(ThresholdClassifier { threshold: 1000.0 }), SIZE);
        let (grid, key, config) = (grid(), key(), config());
        let canvas = canvas(4, PixelType::Int16);
        let before = canvas_masks();
        let after = canvas_masks();

        let report = pass(&grid, &key, &source, &fetcher, &segmenter, &config)
            .run(
                &pool(),
                &canvas,
                Some(MaskTargets {
                    before: &before,
                    after: &after,
                }),
            )
            .unwrap();

        assert_eq!(report.classified, 2);
        assert_eq!(report.searched, 1);
        assert_eq!(report.cleared, 1);
        assert!(report.unclassified.is_empty());

        let pixels = canvas.snapshot();
        assert_eq!(pixels.get(0, 0, 0), 42);
        assert_eq!(pixels.get(0, SIZE, 0), 0);

        let before = before.snapshot();
        let after = after.snapshot();
        assert_eq!(before.get(0, 0, 0), 4);
        assert_eq!(before.get(0, SIZE, 0), 1);
        assert_eq!(after.get(0, 0, 0), 1);
        assert_eq!(after.get(0, SIZE, 0), 1);
    }

    fn canvas_masks() -> MemoryCanvas {
        canvas(1, PixelType::Byte)
    }

    #[test]
    fn test_missing_companion_leaves_tile_unclassified() {
        let source = MockTileSource::new(|request: &TileRequest| {
            if request.x == 3 {
                Err(ProviderError::HttpError("timeout".into()))
            } else {
                Ok(companion(SIZE, 0))
            }
        });
        let fetcher = QueuedFetcher::new(Vec::new());
        let segmenter = CloudSegmenter::new(Arc::new(ThresholdClassifier { threshold: 1000.0 }), SIZE);
        let (grid, key) = (grid(), key());
        let config = config().with_classify_attempts(3);
        let canvas = canvas(4, PixelType::Int16);

        let report = pass(&grid, &key, &source, &fetcher, &segmenter, &config)
            .run(&pool(), &canvas, None)
            .unwrap();

        assert_eq!(report.unclassified, vec![(3, 5)]);
        assert_eq!(report.classified, 1);
        assert_eq!(source.calls_for(3, 5), 3);
        assert_eq!(source.calls_for(2, 5), 1);
    }

    #[test]
    fn test_classifier_failure_aborts_pass() {
        let source = MockTileSource::new(|_: &TileRequest| Ok(companion(SIZE, 0)));
        let fetcher = QueuedFetcher::new(Vec::new());
        let segmenter = CloudSegmenter::new(Arc::new(BrokenClassifier), SIZE);
        let (grid, key, config) = (grid(), key(), config());
        let canvas = canvas(4, PixelType::Int16);

        let result = pass(&grid, &key, &source, &fetcher, &segmenter, &config).run(
            &pool(),
            &canvas,
            None,
        );

        assert!(matches!(result, Err(MosaicError::Segmentation(_))));
    }

    #[test]
    fn test_unrepaired_search_is_counted() {
        let source = MockTileSource::new(|_: &TileRequest| Ok(companion(SIZE, (SIZE * SIZE) as usize)));
        let fetcher = QueuedFetcher::new(Vec::new());
        let segmenter = CloudSegmenter::new(Arc::new(ThresholdClassifier { threshold: 1000.0 }), SIZE);
        let (grid, key, config) = (grid(), key(), config());
        let canvas = canvas(4, PixelType::Int16);

        let report = pass(&grid, &key, &source, &fetcher, &segmenter, &config)
            .run(&pool(), &canvas, None)
            .unwrap();

        assert_eq!(report.searched, 2);
        assert_eq!(report.exhausted, 2);
        assert_eq!(report.still_cloudy(), 2);
    }
}
