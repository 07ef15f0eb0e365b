//! Mosaic engine.
//!
//! [`MosaicEngine`] runs one [`MosaicRequest`] end to end:
//!
//! ```text
//! bbox + zoom ─► TileGrid ─► register primary mosaic
//!                              │
//!                              ▼
//!                   MosaicAssembler (rows, repair)
//!                              │
//!          cloud detection? ── no ──────────────┐
//!                              │ yes            │
//!                              ▼                ▼
//!                   ReplacementPass ─────► finish GeoTIFF
//! ```
//!
//! The engine owns the worker pool and the collaborators; canvases are
//! supplied per run so the same engine can write to memory or to disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use tracing::{info, warn};

use crate::assembly::{AssemblyReport, MosaicAssembler};
use crate::canvas::{DiskCanvas, RasterLayout, RasterTarget};
use crate::cloud::{CloudClassifier, CloudSegmenter};
use crate::config::{EngineConfig, DEFAULT_MAX_CLOUD_COVER};
use crate::coord::{BoundingBox, CoordError, GeoReference, TileGrid, MAX_ZOOM};
use crate::error::MosaicError;
use crate::provider::{
    CachedRegistrar, DateWindow, MosaicKey, MosaicQuery, MosaicRegistrar, TileSource,
};
use crate::raster::{DataProduct, PixelType};
use crate::replacement::{
    MaskTargets, ReplacementPass, ReplacementReport, SearchPlan, SourceCandidateFetcher,
};

/// File name of the class mask written before replacement.
pub const BEFORE_MASK_FILE: &str = "BeforeMask.tif";

/// File name of the class mask written after replacement.
pub const AFTER_MASK_FILE: &str = "AfterMask.tif";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// What to build: extent, zoom, date range and product.
#[derive(Debug, Clone, PartialEq)]
pub struct MosaicRequest {
    pub bbox: BoundingBox,
    pub zoom: u8,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub product: DataProduct,
    /// Scene cloud-cover ceiling for the primary mosaic, in percent.
    pub max_cloud_cover: u8,
    /// Replace cloudy tiles from older mosaics.
    pub cloud_detection: bool,
    /// Write the before/after class masks next to the output.
    pub save_masks: bool,
    /// Region name used as the output file prefix.
    pub region: Option<String>,
}

impl MosaicRequest {
    pub fn new(
        bbox: BoundingBox,
        zoom: u8,
        start: NaiveDate,
        end: NaiveDate,
        product: DataProduct,
    ) -> Self {
        Self {
            bbox,
            zoom,
            start,
            end,
            product,
            max_cloud_cover: DEFAULT_MAX_CLOUD_COVER,
            cloud_detection: false,
            save_masks: false,
            region: None,
        }
    }

    pub fn with_max_cloud_cover(mut self, percent: u8) -> Self {
        self.max_cloud_cover = percent;
        self
    }

    pub fn with_cloud_detection(mut self, enabled: bool) -> Self {
        self.cloud_detection = enabled;
        self
    }

    pub fn with_save_masks(mut self, enabled: bool) -> Self {
        self.save_masks = enabled;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// The date window of the primary mosaic.
    pub fn window(&self) -> DateWindow {
        DateWindow::new(self.start, self.end)
    }

    pub fn validate(&self) -> Result<(), MosaicError> {
        if self.start > self.end {
            return Err(MosaicError::InvalidRequest(format!(
                "start date {} is after end date {}",
                self.start, self.end
            )));
        }
        if self.zoom > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(self.zoom).into());
        }
        if self.max_cloud_cover > 100 {
            return Err(MosaicError::InvalidRequest(format!(
                "cloud cover {}% is above 100%",
                self.max_cloud_cover
            )));
        }
        Ok(())
    }

    /// Output file name for this request.
    ///
    /// `{region}_` or `Rect_{lonMin}_{latMax}_{lonMax}_{latMin}_`, then
    /// `{product}_{start}_{end}`, `_cloudless` when cloud detection is on
    /// for a product that supports it, and `.tif`.
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use clearmosaic::{BoundingBox, DataProduct, MosaicRequest};
    ///
    /// let bbox = BoundingBox::new(10.5, 11.0, 45.0, 45.25).unwrap();
    /// let day = |d| NaiveDate::from_ymd_opt(2023, 6, d).unwrap();
    /// let request = MosaicRequest::new(bbox, 14, day(1), day(30), DataProduct::Rgb);
    ///
    /// assert_eq!(
    ///     request.default_file_name(),
    ///     "Rect_10.5_45.25_11_45_RGB_2023-06-01_2023-06-30.tif"
    /// );
    /// ```
    pub fn default_file_name(&self) -> String {
        let mut name = match &self.region {
            Some(region) => format!("{}_", region),
            None => format!(
                "Rect_{}_{}_{}_{}_",
                self.bbox.lon_min(),
                self.bbox.lat_max(),
                self.bbox.lon_max(),
                self.bbox.lat_min()
            ),
        };
        name.push_str(&format!(
            "{}_{}_{}",
            self.product,
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        ));
        if self.cloud_detection && self.product.supports_cloud_detection() {
            name.push_str("_cloudless");
        }
        name.push_str(".tif");
        name
    }
}

/// Paths of the class masks written by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaskOutputs {
    pub before: PathBuf,
    pub after: PathBuf,
}

/// Outcome of a mosaic run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MosaicReport {
    pub grid: TileGrid,
    pub georeference: GeoReference,
    pub assembly: AssemblyReport,
    /// `None` when cloud replacement did not run.
    pub replacement: Option<ReplacementReport>,
    /// Final GeoTIFF, when the run wrote one.
    pub output: Option<PathBuf>,
    pub masks: Option<MaskOutputs>,
}

impl MosaicReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Builds mosaics from a tile source and a mosaic registrar.
pub struct MosaicEngine {
    source: Arc<dyn TileSource>,
    registrar: Arc<dyn MosaicRegistrar>,
    classifier: Option<Arc<dyn CloudClassifier>>,
    config: EngineConfig,
    pool: ThreadPool,
}

impl MosaicEngine {
    /// Creates an engine with a worker pool of
    /// [`EngineConfig::parallel_downloads`] threads.
    ///
    /// Registered keys are cached for the lifetime of the engine.
    pub fn new(
        source: Arc<dyn TileSource>,
        registrar: Arc<dyn MosaicRegistrar>,
        config: EngineConfig,
    ) -> Result<Self, MosaicError> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.parallel_downloads)
            .thread_name(|i| format!("clearmosaic-worker-{}", i))
            .build()
            .map_err(|e| MosaicError::WorkerPool(e.to_string()))?;

        Ok(Self {
            source,
            registrar: Arc::new(CachedRegistrar::new(registrar)),
            classifier: None,
            config,
            pool,
        })
    }

    /// Enables cloud replacement with `classifier`.
    pub fn with_classifier(mut self, classifier: Arc<dyn CloudClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Tile grid and georeference covering the request.
    pub fn grid(&self, request: &MosaicRequest) -> Result<(TileGrid, GeoReference), MosaicError> {
        Ok(TileGrid::compute(
            &request.bbox,
            request.zoom,
            self.config.tile_size,
        )?)
    }

    /// Layout of the output raster for `request` over `grid`.
    pub fn layout(&self, request: &MosaicRequest, grid: &TileGrid) -> RasterLayout {
        RasterLayout::new(
            grid.canvas_width(),
            grid.canvas_height(),
            request.product.band_count(),
            request.product.pixel_type(),
            grid.georeference(),
        )
    }

    /// Whether cloud replacement will run for `request`.
    pub fn cloud_replacement_enabled(&self, request: &MosaicRequest) -> bool {
        request.cloud_detection
            && request.product.supports_cloud_detection()
            && self.classifier.is_some()
    }

    /// Logs why requested cloud replacement cannot run.
    fn log_replacement_skipped(&self, request: &MosaicRequest) {
        if !request.cloud_detection {
            return;
        }
        if !request.product.supports_cloud_detection() {
            warn!(
                product = %request.product,
                "Cloud detection is not available for this product, skipping replacement"
            );
        } else if self.classifier.is_none() {
            warn!("No cloud classifier configured, skipping replacement");
        }
    }

    /// Assembles the mosaic into `canvas` and, when enabled, replaces cloudy
    /// tiles in place.
    ///
    /// `canvas` must have the layout returned by [`layout`](Self::layout).
    /// The report carries no output path.
    pub fn build(
        &self,
        request: &MosaicRequest,
        canvas: &dyn RasterTarget,
        masks: Option<MaskTargets<'_>>,
    ) -> Result<MosaicReport, MosaicError> {
        request.validate()?;
        let (grid, georeference) = self.grid(request)?;
        self.check_layout(request, &grid, canvas)?;

        info!(
            product = %request.product,
            window = %request.window(),
            zoom = request.zoom,
            columns = grid.columns(),
            rows = grid.rows(),
            "Building mosaic"
        );

        let key = self.register_primary(request)?;

        let assembly =
            MosaicAssembler::new(&grid, &key, request.product, self.source.as_ref())
                .run(&self.pool, canvas)?;

        let replacement = match &self.classifier {
            Some(classifier) if self.cloud_replacement_enabled(request) => {
                Some(self.replace_clouds(request, &grid, &key, classifier, canvas, masks)?)
            }
            _ => {
                self.log_replacement_skipped(request);
                None
            }
        };

        Ok(MosaicReport {
            grid,
            georeference,
            assembly,
            replacement,
            output: None,
            masks: None,
        })
    }

    /// Builds the mosaic into a GeoTIFF at `output`.
    ///
    /// Samples are staged in a scratch file next to `output`. When masks are
    /// requested and replacement runs, [`BEFORE_MASK_FILE`] and
    /// [`AFTER_MASK_FILE`] are written to the same directory.
    pub fn run_to_file(
        &self,
        request: &MosaicRequest,
        output: &Path,
    ) -> Result<MosaicReport, MosaicError> {
        request.validate()?;
        let (grid, _) = self.grid(request)?;
        let layout = self.layout(request, &grid);
        let rows_per_strip = grid.tile_size();

        let canvas = DiskCanvas::create(output, layout)?;

        let mask_outputs = if request.save_masks && self.cloud_replacement_enabled(request) {
            let directory = output.parent().unwrap_or_else(|| Path::new("."));
            Some(MaskOutputs {
                before: directory.join(BEFORE_MASK_FILE),
                after: directory.join(AFTER_MASK_FILE),
            })
        } else {
            None
        };
        let mask_canvases = match &mask_outputs {
            Some(paths) => {
                let mask_layout = layout.with_bands(1, PixelType::Byte);
                Some((
                    DiskCanvas::create(&paths.before, mask_layout)?,
                    DiskCanvas::create(&paths.after, mask_layout)?,
                ))
            }
            None => None,
        };

        let targets = mask_canvases.as_ref().map(|(before, after)| MaskTargets {
            before,
            after,
        });
        let mut report = self.build(request, &canvas, targets)?;

        let path = canvas.finish(rows_per_strip)?;
        if let Some((before, after)) = mask_canvases {
            before.finish(rows_per_strip)?;
            after.finish(rows_per_strip)?;
        }

        info!(
            path = %path.display(),
            tiles = report.assembly.tiles,
            unrepaired = report.assembly.unrepaired.len(),
            "Mosaic written"
        );
        report.output = Some(path);
        report.masks = mask_outputs;
        Ok(report)
    }

    fn check_layout(
        &self,
        request: &MosaicRequest,
        grid: &TileGrid,
        canvas: &dyn RasterTarget,
    ) -> Result<(), MosaicError> {
        let expected = self.layout(request, grid);
        let actual = canvas.layout();
        if actual.width != expected.width
            || actual.height != expected.height
            || actual.bands != expected.bands
        {
            return Err(MosaicError::InvalidRequest(format!(
                "canvas is {}x{} with {} bands, request needs {}x{} with {} bands",
                actual.width,
                actual.height,
                actual.bands,
                expected.width,
                expected.height,
                expected.bands
            )));
        }
        Ok(())
    }

    fn register_primary(&self, request: &MosaicRequest) -> Result<MosaicKey, MosaicError> {
        let query = MosaicQuery::new(request.product, request.window(), request.max_cloud_cover);
        let key = self.registrar.register(&query)?;
        info!(key = %key, window = %key.window, "Registered primary mosaic");
        Ok(key)
    }

    fn replace_clouds(
        &self,
        request: &MosaicRequest,
        grid: &TileGrid,
        key: &MosaicKey,
        classifier: &Arc<dyn CloudClassifier>,
        canvas: &dyn RasterTarget,
        masks: Option<MaskTargets<'_>>,
    ) -> Result<ReplacementReport, MosaicError> {
        let segmenter = CloudSegmenter::new(Arc::clone(classifier), grid.tile_size());
        let fetcher = SourceCandidateFetcher::new(
            Arc::clone(&self.source),
            Arc::clone(&self.registrar),
            request.product,
            request.zoom,
        );
        let plan = SearchPlan::from_config(request.start, request.end, &self.config);

        info!(
            max_windows = plan.max_windows(),
            cloud_fraction_limit = self.config.cloud_fraction_limit,
            "Replacing cloudy tiles"
        );

        let pass = ReplacementPass {
            grid,
            key,
            product: request.product,
            source: self.source.as_ref(),
            fetcher: &fetcher,
            segmenter: &segmenter,
            config: &self.config,
            plan,
        };
        pass.run(&self.pool, canvas, masks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::MemoryCanvas;
    use crate::cloud::{BrokenClassifier, ThresholdClassifier};
    use crate::provider::{MockRegistrar, MockTileSource, TileRequest};
    use crate::raster::TileBuffer;
    use crate::replacement::ALPHA_BAND;
    use std::sync::atomic::Ordering;

    const SIZE: u32 = 4;
    const CLOUDY: i32 = 5175;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn request(product: DataProduct) -> MosaicRequest {
        let bbox = BoundingBox::new(10.0, 20.0, 10.0, 20.0).unwrap();
        MosaicRequest::new(bbox, 3, date(2023, 6, 30), date(2023, 6, 30), product)
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
            .with_tile_size(SIZE)
            .with_dilation(1, Default::default())
            .with_parallel_downloads(2)
    }

    fn tile_value(request: &TileRequest) -> i32 {
        (10 * request.x + request.y) as i32 + 1
    }

    /// Reflectance tile, cloudy in the primary mosaic and clear elsewhere.
    fn reflectance(request: &TileRequest, primary_start: NaiveDate) -> TileBuffer {
        let cloudy = request.key.window.start == primary_start;
        let value = if cloudy { CLOUDY } else { 1100 + tile_value(request) };
        let mut tile = TileBuffer::filled(SIZE, SIZE, 4, value);
        tile.band_mut(ALPHA_BAND).fill(255);
        tile
    }

    fn canvas_for(engine: &MosaicEngine, request: &MosaicRequest) -> MemoryCanvas {
        let (grid, _) = engine.grid(request).unwrap();
        MemoryCanvas::new(engine.layout(request, &grid)).unwrap()
    }

    #[test]
    fn test_build_without_cloud_detection() {
        let source = Arc::new(MockTileSource::new(|r: &TileRequest| {
            Ok(TileBuffer::filled(SIZE, SIZE, 1, tile_value(r)))
        }));
        let registrar = Arc::new(MockRegistrar::new());
        let engine = MosaicEngine::new(source.clone(), registrar.clone(), config()).unwrap();
        let request = request(DataProduct::B08);
        let canvas = canvas_for(&engine, &request);

        let report = engine.build(&request, &canvas, None).unwrap();

        assert!(report.replacement.is_none());
        assert!(report.assembly.is_complete());
        assert_eq!(report.assembly.fetched, report.grid.tile_count());
        assert_eq!(registrar.calls.load(Ordering::SeqCst), 1);

        let pixels = canvas.snapshot();
        for (x, y) in report.grid.tiles() {
            let (px, py) = report.grid.pixel_offset(x, y);
            assert_eq!(pixels.get(0, px, py), (10 * x + y) as i32 + 1);
        }
    }

    #[test]
    fn test_primary_registration_failure_is_fatal() {
        let source = Arc::new(MockTileSource::new(|_: &TileRequest| {
            Ok(TileBuffer::filled(SIZE, SIZE, 1, 1))
        }));
        let engine =
            MosaicEngine::new(source.clone(), Arc::new(MockRegistrar::failing()), config()).unwrap();
        let request = request(DataProduct::B08);
        let canvas = canvas_for(&engine, &request);

        let result = engine.build(&request, &canvas, None);

        assert!(matches!(result, Err(MosaicError::Registration(_))));
        assert_eq!(source.call_count(), 0);
    }

    #[test]
    fn test_cloudy_tiles_replaced_from_older_mosaic() {
        let request = request(DataProduct::Rgb16).with_cloud_detection(true);
        let primary_start = request.start;
        let source = Arc::new(MockTileSource::new(move |r: &TileRequest| {
            Ok(reflectance(r, primary_start))
        }));
        let engine = MosaicEngine::new(source, Arc::new(MockRegistrar::new()), config())
            .unwrap()
            .with_classifier(Arc::new(ThresholdClassifier { threshold: 1000.0 }));
        let canvas = canvas_for(&engine, &request);

        let report = engine.build(&request, &canvas, None).unwrap();

        let replacement = report.replacement.unwrap();
        let tiles = report.grid.tile_count() as usize;
        assert_eq!(replacement.classified, tiles);
        assert_eq!(replacement.searched, tiles);
        assert_eq!(replacement.cleared, tiles);

        let pixels = canvas.snapshot();
        for (x, y) in report.grid.tiles() {
            let (px, py) = report.grid.pixel_offset(x, y);
            assert_eq!(pixels.get(0, px, py), 1100 + (10 * x + y) as i32 + 1);
        }
    }

    #[test]
    fn test_replacement_skipped_without_classifier() {
        let request = request(DataProduct::Rgb16).with_cloud_detection(true);
        let source = Arc::new(MockTileSource::new(|_: &TileRequest| {
            Ok(TileBuffer::filled(SIZE, SIZE, 4, 1))
        }));
        let engine = MosaicEngine::new(source, Arc::new(MockRegistrar::new()), config()).unwrap();
        let canvas = canvas_for(&engine, &request);

        let report = engine.build(&request, &canvas, None).unwrap();

        assert!(report.replacement.is_none());
    }

    #[test]
    fn test_replacement_skipped_for_unsupported_product() {
        let request = request(DataProduct::EsaWorldCover).with_cloud_detection(true);
        let source = Arc::new(MockTileSource::new(|_: &TileRequest| {
            Ok(TileBuffer::filled(SIZE, SIZE, 4, 1))
        }));
        let engine = MosaicEngine::new(source, Arc::new(MockRegistrar::new()), config())
            .unwrap()
            .with_classifier(Arc::new(BrokenClassifier));
        let canvas = canvas_for(&engine, &request);

        let report = engine.build(&request, &canvas, None).unwrap();

        assert!(report.replacement.is_none());
    }

    #[test]
    fn test_classifier_failure_is_fatal() {
        let request = request(DataProduct::Rgb16).with_cloud_detection(true);
        let source = Arc::new(MockTileSource::new(|_: &TileRequest| {
            Ok(TileBuffer::filled(SIZE, SIZE, 4, 1))
        }));
        let engine = MosaicEngine::new(source, Arc::new(MockRegistrar::new()), config())
            .unwrap()
            .with_classifier(Arc::new(BrokenClassifier));
        let canvas = canvas_for(&engine, &request);

        let result = engine.build(&request, &canvas, None);

        assert!(matches!(result, Err(MosaicError::Segmentation(_))));
    }

    #[test]
    fn test_canvas_layout_mismatch_rejected() {
        let source = Arc::new(MockTileSource::new(|_: &TileRequest| {
            Ok(TileBuffer::filled(SIZE, SIZE, 1, 1))
        }));
        let engine = MosaicEngine::new(source, Arc::new(MockRegistrar::new()), config()).unwrap();
        let request = request(DataProduct::B08);
        let (grid, _) = engine.grid(&request).unwrap();
        let layout = engine.layout(&request, &grid).with_bands(4, PixelType::Int16);
        let canvas = MemoryCanvas::new(layout).unwrap();

        let result = engine.build(&request, &canvas, None);

        assert!(matches!(result, Err(MosaicError::InvalidRequest(_))));
    }

    #[test]
    fn test_run_to_file_writes_mosaic_and_masks() {
        let dir = tempfile::tempdir().unwrap();
        let request = request(DataProduct::Rgb16)
            .with_cloud_detection(true)
            .with_save_masks(true);
        let primary_start = request.start;
        let source = Arc::new(MockTileSource::new(move |r: &TileRequest| {
            Ok(reflectance(r, primary_start))
        }));
        let engine = MosaicEngine::new(source, Arc::new(MockRegistrar::new()), config())
            .unwrap()
            .with_classifier(Arc::new(ThresholdClassifier { threshold: 1000.0 }));
        let output = dir.path().join(request.default_file_name());

        let report = engine.run_to_file(&request, &output).unwrap();

        assert_eq!(report.output.as_deref(), Some(output.as_path()));
        assert!(output.exists());
        let masks = report.masks.unwrap();
        assert!(masks.before.exists());
        assert!(masks.after.exists());
        assert_eq!(masks.before, dir.path().join(BEFORE_MASK_FILE));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_masks_not_written_without_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let request = request(DataProduct::B08).with_save_masks(true);
        let source = Arc::new(MockTileSource::new(|_: &TileRequest| {
            Ok(TileBuffer::filled(SIZE, SIZE, 1, 3))
        }));
        let engine = MosaicEngine::new(source, Arc::new(MockRegistrar::new()), config()).unwrap();
        let output = dir.path().join("out.tif");

        let report = engine.run_to_file(&request, &output).unwrap();

        assert!(report.masks.is_none());
        assert!(!dir.path().join(BEFORE_MASK_FILE).exists());
    }

    #[test]
    fn test_request_validation() {
        let inverted = MosaicRequest {
            start: date(2023, 7, 1),
            ..request(DataProduct::Rgb)
        };
        assert!(matches!(
            inverted.validate(),
            Err(MosaicError::InvalidRequest(_))
        ));

        let zoom = MosaicRequest {
            zoom: 30,
            ..request(DataProduct::Rgb)
        };
        assert!(matches!(zoom.validate(), Err(MosaicError::Coord(_))));

        assert!(request(DataProduct::Rgb).with_max_cloud_cover(101).validate().is_err());
        assert!(request(DataProduct::Rgb).validate().is_ok());
    }

    #[test]
    fn test_default_file_name() {
        let request = request(DataProduct::Ndvi);
        assert_eq!(
            request.default_file_name(),
            "Rect_10_20_20_10_NDVI_2023-06-30_2023-06-30.tif"
        );

        let named = request.with_region("Alps").with_cloud_detection(true);
        assert_eq!(
            named.default_file_name(),
            "Alps_NDVI_2023-06-30_2023-06-30_cloudless.tif"
        );
    }

    #[test]
    fn test_file_name_without_cloudless_for_unsupported_product() {
        let request = request(DataProduct::EsaWorldCover).with_cloud_detection(true);
        assert_eq!(
            request.default_file_name(),
            "Rect_10_20_20_10_ESAWorldCover_2023-06-30_2023-06-30.tif"
        );
    }

    #[test]
    fn test_replacement_enabled_needs_product_and_classifier() {
        let source = Arc::new(MockTileSource::new(|_: &TileRequest| {
            Ok(TileBuffer::filled(SIZE, SIZE, 4, 1))
        }));
        let bare = MosaicEngine::new(source.clone(), Arc::new(MockRegistrar::new()), config())
            .unwrap();
        let classified = MosaicEngine::new(source, Arc::new(MockRegistrar::new()), config())
            .unwrap()
            .with_classifier(Arc::new(ThresholdClassifier { threshold: 1000.0 }));
        let rgb16 = request(DataProduct::Rgb16).with_cloud_detection(true);

        assert!(classified.cloud_replacement_enabled(&rgb16));
        assert!(!bare.cloud_replacement_enabled(&rgb16));
        assert!(!classified.cloud_replacement_enabled(&request(DataProduct::Rgb16)));
        assert!(!classified.cloud_replacement_enabled(
            &request(DataProduct::EsaWorldCover).with_cloud_detection(true)
        ));
    }

    #[test]
    fn test_failed_run_leaves_no_scratch_files() {
        let dir = tempfile::tempdir().unwrap();
        let request = request(DataProduct::Rgb16)
            .with_cloud_detection(true)
            .with_save_masks(true);
        let source = Arc::new(MockTileSource::new(|_: &TileRequest| {
            Ok(TileBuffer::filled(SIZE, SIZE, 4, 1))
        }));
        let engine = MosaicEngine::new(source, Arc::new(MockRegistrar::failing()), config())
            .unwrap()
            .with_classifier(Arc::new(ThresholdClassifier { threshold: 1000.0 }));

        let result = engine.run_to_file(&request, &dir.path().join("out.tif"));

        assert!(matches!(result, Err(MosaicError::Registration(_))));
        let remaining: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name())
            .collect();
        assert!(remaining.is_empty(), "left behind {:?}", remaining);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let source = Arc::new(MockTileSource::new(|_: &TileRequest| {
            Ok(TileBuffer::filled(SIZE, SIZE, 1, 1))
        }));
        let result = MosaicEngine::new(
            source,
            Arc::new(MockRegistrar::new()),
            config().with_tile_size(0),
        );
        assert!(matches!(result, Err(MosaicError::Config(_))));
    }

    #[test]
    fn test_report_serializes() {
        let source = Arc::new(MockTileSource::new(|r: &TileRequest| {
            Ok(TileBuffer::filled(SIZE, SIZE, 1, tile_value(r)))
        }));
        let engine = MosaicEngine::new(source, Arc::new(MockRegistrar::new()), config()).unwrap();
        let request = request(DataProduct::B08);
        let canvas = canvas_for(&engine, &request);

        let json = engine.build(&request, &canvas, None).unwrap().to_json().unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["grid"]["zoom"], 3);
        assert!(value["replacement"].is_null());
    }
}
