//! Backward search for one cloudy tile.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use super::{merge_candidate, Candidate, MergeStats, ReplacementState, SearchPlan};
use crate::cloud::{CloudSegmenter, SegmentationError};
use crate::config::EngineConfig;
use crate::provider::{
    DateWindow, MosaicQuery, MosaicRegistrar, ProviderError, TileRequest, TileSource,
};
use crate::raster::{DataProduct, TileBuffer};

/// Scene cloud-cover ceiling used when registering candidate mosaics.
pub const CANDIDATE_CLOUD_COVER: u8 = 100;

/// Why one search iteration was skipped.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// No mosaic key for the window.
    Registration(ProviderError),
    /// The candidate or its companion could not be fetched or decoded.
    Fetch(ProviderError),
    /// The companion holds no valid pixel.
    EmptyCandidate,
    /// The candidate does not match the tile's shape.
    Mismatch(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Registration(e) => write!(f, "registration failed: {}", e),
            SkipReason::Fetch(e) => write!(f, "fetch failed: {}", e),
            SkipReason::EmptyCandidate => f.write_str("empty candidate"),
            SkipReason::Mismatch(detail) => write!(f, "shape mismatch: {}", detail),
        }
    }
}

/// Result of one iteration that got as far as merging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationOutcome {
    pub window: DateWindow,
    pub stats: MergeStats,
}

/// Why a search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    /// The running cloud fraction dropped below the limit.
    Cleared,
    /// Too many candidates had the same mask as the running tile.
    Stagnated,
    /// Every window was tried.
    Exhausted,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Termination::Cleared => "cleared",
            Termination::Stagnated => "stagnated",
            Termination::Exhausted => "exhausted",
        })
    }
}

/// Summary of a finished search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchSummary {
    pub termination: Termination,
    /// Windows tried, including skipped ones.
    pub iterations: usize,
    pub skipped: usize,
    pub merged: usize,
    pub cloud_fraction: f64,
}

/// Product pixels and reflectance companion of a candidate tile.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateTiles {
    pub pixels: TileBuffer,
    pub companion: TileBuffer,
}

/// Fetches candidate tiles for a date window.
pub trait CandidateFetcher: Send + Sync {
    fn fetch(&self, window: DateWindow, x: u32, y: u32) -> Result<CandidateTiles, SkipReason>;
}

/// Candidate fetcher registering one mosaic per window and fetching from a
/// [`TileSource`].
///
/// Pass a [`CachedRegistrar`](crate::provider::CachedRegistrar) so that the
/// windows are registered once for all tiles.
pub struct SourceCandidateFetcher {
    source: Arc<dyn TileSource>,
    registrar: Arc<dyn MosaicRegistrar>,
    product: DataProduct,
    zoom: u8,
}

impl SourceCandidateFetcher {
    pub fn new(
        source: Arc<dyn TileSource>,
        registrar: Arc<dyn MosaicRegistrar>,
        product: DataProduct,
        zoom: u8,
    ) -> Self {
        Self {
            source,
            registrar,
            product,
            zoom,
        }
    }
}

impl CandidateFetcher for SourceCandidateFetcher {
    fn fetch(&self, window: DateWindow, x: u32, y: u32) -> Result<CandidateTiles, SkipReason> {
        let query = MosaicQuery::new(self.product, window, CANDIDATE_CLOUD_COVER);
        let key = self
            .registrar
            .register(&query)
            .map_err(SkipReason::Registration)?;

        let request = TileRequest::new(key, self.product, self.zoom, x, y);
        let companion_product = self.product.companion();
        let companion = self
            .source
            .fetch(&request.with_product(companion_product))
            .map_err(SkipReason::Fetch)?;

        let pixels = if companion_product == self.product {
            companion.clone()
        } else {
            self.source.fetch(&request).map_err(SkipReason::Fetch)?
        };

        Ok(CandidateTiles { pixels, companion })
    }
}

/// Walks the search plan for one tile, merging candidates until it is
/// clear, stagnates or runs out of windows.
pub struct TemporalSearch<'a> {
    fetcher: &'a dyn CandidateFetcher,
    segmenter: &'a CloudSegmenter,
    config: &'a EngineConfig,
    plan: &'a SearchPlan,
}

impl<'a> TemporalSearch<'a> {
    pub fn new(
        fetcher: &'a dyn CandidateFetcher,
        segmenter: &'a CloudSegmenter,
        config: &'a EngineConfig,
        plan: &'a SearchPlan,
    ) -> Self {
        Self {
            fetcher,
            segmenter,
            config,
            plan,
        }
    }

    /// Runs the search for tile `(x, y)`, updating `state` in place.
    ///
    /// Only classifier failures abort the search.
    pub fn run(
        &self,
        x: u32,
        y: u32,
        state: &mut ReplacementState,
    ) -> Result<SearchSummary, SegmentationError> {
        let mut iterations = 0;
        let mut skipped = 0;
        let mut merged = 0;

        for window in self.plan {
            iterations += 1;
            let outcome = match self.iterate(window, x, y, state)? {
                Ok(outcome) => outcome,
                Err(reason) => {
                    skipped += 1;
                    debug!(tile_x = x, tile_y = y, window = %window, reason = %reason, "Skipped candidate");
                    continue;
                }
            };
            merged += 1;
            trace!(
                tile_x = x,
                tile_y = y,
                window = %outcome.window,
                adopted = outcome.stats.adopted,
                cloud_fraction = state.cloud_fraction(),
                similar_count = state.similar_count(),
                "Merged candidate"
            );

            if let Some(termination) = self.termination(state) {
                return Ok(SearchSummary {
                    termination,
                    iterations,
                    skipped,
                    merged,
                    cloud_fraction: state.cloud_fraction(),
                });
            }
        }

        Ok(SearchSummary {
            termination: Termination::Exhausted,
            iterations,
            skipped,
            merged,
            cloud_fraction: state.cloud_fraction(),
        })
    }

    /// One window: fetch, classify, merge.
    ///
    /// The outer error is fatal, the inner one skips the window.
    fn iterate(
        &self,
        window: DateWindow,
        x: u32,
        y: u32,
        state: &mut ReplacementState,
    ) -> Result<Result<IterationOutcome, SkipReason>, SegmentationError> {
        let tiles = match self.fetcher.fetch(window, x, y) {
            Ok(tiles) => tiles,
            Err(reason) => return Ok(Err(reason)),
        };

        let segmentation = match self.segmenter.classify_dilated(
            &tiles.companion,
            self.config.dilation_aperture,
            self.config.dilation_kernel,
        ) {
            Ok(segmentation) => segmentation,
            Err(SegmentationError::InvalidInput(detail)) => {
                return Ok(Err(SkipReason::Mismatch(detail)))
            }
            Err(e) => return Err(e),
        };

        let candidate = Candidate::new(tiles.pixels, &tiles.companion, segmentation);
        if candidate.is_empty() {
            return Ok(Err(SkipReason::EmptyCandidate));
        }
        if !candidate.fits(state) {
            return Ok(Err(SkipReason::Mismatch(format!(
                "candidate {}x{}x{} for a {}x{}x{} tile",
                candidate.pixels.width(),
                candidate.pixels.height(),
                candidate.pixels.bands(),
                state.pixels().width(),
                state.pixels().height(),
                state.pixels().bands()
            ))));
        }

        let stats = merge_candidate(
            state,
            &candidate,
            self.config.cloud_fraction_limit,
            self.config.correlation_limit,
        );
        Ok(Ok(IterationOutcome { window, stats }))
    }

    fn termination(&self, state: &ReplacementState) -> Option<Termination> {
        if state.cloud_fraction() < self.config.cloud_fraction_limit {
            Some(Termination::Cleared)
        } else if state.similar_count() >= self.config.max_similar_tiles {
            Some(Termination::Stagnated)
        } else {
            None
        }
    }
}
