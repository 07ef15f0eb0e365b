//! End-to-end tests of the mosaic engine with in-process collaborators.

use std::collections::HashMap;
use std::fs::File;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use clearmosaic::cloud::{ClassScores, ClassifierInput, CLASS_COUNT};
use clearmosaic::provider::{MosaicKey, MosaicQuery, TileRequest};
use clearmosaic::replacement::ALPHA_BAND;
use clearmosaic::{
    BoundingBox, CloudClassifier, DataProduct, EngineConfig, MemoryCanvas, MosaicEngine,
    MosaicError, MosaicRegistrar, MosaicRequest, ProviderError, SegmentationError, TileBuffer,
    TileSource,
};
use tiff::decoder::{Decoder, DecodingResult};

const SIZE: u32 = 4;
const CLOUDY: i32 = 5175;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Tile source answering from a closure, recording attempts per tile.
struct ScriptedSource<F> {
    respond: F,
    attempts: Mutex<HashMap<(u32, u32), usize>>,
}

impl<F> ScriptedSource<F>
where
    F: Fn(&TileRequest, usize) -> Result<TileBuffer, ProviderError> + Send + Sync,
{
    fn new(respond: F) -> Self {
        Self {
            respond,
            attempts: Mutex::new(HashMap::new()),
        }
    }
}

impl<F> TileSource for ScriptedSource<F>
where
    F: Fn(&TileRequest, usize) -> Result<TileBuffer, ProviderError> + Send + Sync,
{
    fn fetch(&self, request: &TileRequest) -> Result<TileBuffer, ProviderError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry((request.x, request.y)).or_insert(0);
            *count += 1;
            *count
        };
        (self.respond)(request, attempt)
    }
}

/// Registrar naming keys after the window start.
#[derive(Default)]
struct DateRegistrar {
    calls: AtomicUsize,
}

impl MosaicRegistrar for DateRegistrar {
    fn register(&self, query: &MosaicQuery) -> Result<MosaicKey, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(MosaicKey::new(
            format!("mosaic-{}", query.window.start),
            query.window,
        ))
    }
}

/// Marks pixels with high normalised first-band reflectance as thick cloud.
struct BrightnessClassifier;

impl CloudClassifier for BrightnessClassifier {
    fn classify(&self, input: &ClassifierInput) -> Result<ClassScores, SegmentationError> {
        let plane = (input.size * input.size) as usize;
        let mut data = vec![0.0; CLASS_COUNT * plane];
        for p in 0..plane {
            let class = if input.data[p] > 1000.0 { 4 } else { 1 };
            data[class * plane + p] = 1.0;
        }
        Ok(ClassScores {
            size: input.size,
            data,
        })
    }
}

fn config() -> EngineConfig {
    EngineConfig::default()
        .with_tile_size(SIZE)
        .with_dilation(1, Default::default())
        .with_parallel_downloads(4)
}

fn request(product: DataProduct) -> MosaicRequest {
    let bbox = BoundingBox::new(2.0, 30.0, 40.0, 60.0).unwrap();
    MosaicRequest::new(bbox, 4, date(2023, 8, 1), date(2023, 8, 10), product)
}

fn value_of(request: &TileRequest) -> i32 {
    (100 * request.x + request.y) as i32
}

#[test]
fn assembles_repairs_and_writes_geotiff() {
    let dir = tempfile::tempdir().unwrap();
    let request = request(DataProduct::B08);
    let engine_probe = MosaicEngine::new(
        Arc::new(ScriptedSource::new(|_: &TileRequest, _| {
            Err(ProviderError::TileNotFound("probe".into()))
        })),
        Arc::new(DateRegistrar::default()),
        config(),
    )
    .unwrap();
    let (grid, _) = engine_probe.grid(&request).unwrap();
    assert!(grid.tile_count() > 1);
    let (flaky_x, flaky_y) = (grid.x_min(), grid.y_min());

    let source = Arc::new(ScriptedSource::new(move |r: &TileRequest, attempt| {
        if (r.x, r.y) == (flaky_x, flaky_y) && attempt == 1 {
            return Err(ProviderError::HttpError("connection reset".into()));
        }
        Ok(TileBuffer::filled(SIZE, SIZE, 1, value_of(r)))
    }));
    let engine = MosaicEngine::new(source, Arc::new(DateRegistrar::default()), config()).unwrap();
    let output = dir.path().join(request.default_file_name());

    let report = engine.run_to_file(&request, &output).unwrap();

    assert_eq!(report.grid, grid);
    assert_eq!(report.assembly.repaired, 1);
    assert!(report.assembly.is_complete());
    assert!(report.replacement.is_none());

    let mut decoder = Decoder::new(File::open(&output).unwrap()).unwrap();
    assert_eq!(
        decoder.dimensions().unwrap(),
        (grid.canvas_width(), grid.canvas_height())
    );
    let samples = match decoder.read_image().unwrap() {
        DecodingResult::I16(values) => values,
        _ => panic!("expected 16-bit signed samples"),
    };
    let width = grid.canvas_width() as usize;
    for (x, y) in grid.tiles() {
        let (px, py) = grid.pixel_offset(x, y);
        let sample = samples[py as usize * width + px as usize];
        assert_eq!(sample as u32, 100 * x + y);
    }
}

#[test]
fn missing_tiles_stay_empty_and_are_reported() {
    let request = request(DataProduct::B08);
    let source = Arc::new(ScriptedSource::new(|r: &TileRequest, _| {
        if r.x % 2 == 0 {
            Err(ProviderError::TileNotFound(r.to_string()))
        } else {
            Ok(TileBuffer::filled(SIZE, SIZE, 1, 7))
        }
    }));
    let engine = MosaicEngine::new(source, Arc::new(DateRegistrar::default()), config()).unwrap();
    let (grid, _) = engine.grid(&request).unwrap();
    let canvas = MemoryCanvas::new(engine.layout(&request, &grid)).unwrap();

    let report = engine.build(&request, &canvas, None).unwrap();

    let mut expected: Vec<(u32, u32)> = grid.tiles().filter(|(x, _)| x % 2 == 0).collect();
    expected.sort();
    let mut unrepaired = report.assembly.unrepaired.clone();
    unrepaired.sort();
    assert_eq!(unrepaired, expected);

    let pixels = canvas.snapshot();
    for (x, y) in grid.tiles() {
        let (px, py) = grid.pixel_offset(x, y);
        let expected = if x % 2 == 0 { 0 } else { 7 };
        assert_eq!(pixels.get(0, px, py), expected);
    }
}

#[test]
fn cloudy_tiles_take_pixels_from_older_mosaics() {
    let request = request(DataProduct::Rgb16).with_cloud_detection(true);
    let primary = format!("mosaic-{}", request.start);

    let source = Arc::new(ScriptedSource::new(move |r: &TileRequest, _| {
        let is_primary = r.key.id == primary;
        let mut tile = if is_primary && r.x % 2 == 1 {
            TileBuffer::filled(SIZE, SIZE, 4, CLOUDY)
        } else if is_primary {
            TileBuffer::filled(SIZE, SIZE, 4, 1175)
        } else {
            TileBuffer::filled(SIZE, SIZE, 4, 1200)
        };
        tile.band_mut(ALPHA_BAND).fill(255);
        Ok(tile)
    }));
    let registrar = Arc::new(DateRegistrar::default());
    let engine = MosaicEngine::new(source, registrar.clone(), config())
        .unwrap()
        .with_classifier(Arc::new(BrightnessClassifier));
    let (grid, _) = engine.grid(&request).unwrap();
    let canvas = MemoryCanvas::new(engine.layout(&request, &grid)).unwrap();

    let report = engine.build(&request, &canvas, None).unwrap();

    let cloudy_tiles = grid.tiles().filter(|(x, _)| x % 2 == 1).count();
    let replacement = report.replacement.unwrap();
    assert_eq!(replacement.classified as u64, grid.tile_count());
    assert_eq!(replacement.searched, cloudy_tiles);
    assert_eq!(replacement.cleared, cloudy_tiles);
    assert_eq!(replacement.still_cloudy(), 0);

    // primary plus the newest search window, shared by every cloudy tile
    assert_eq!(registrar.calls.load(Ordering::SeqCst), 2);

    let pixels = canvas.snapshot();
    for (x, y) in grid.tiles() {
        let (px, py) = grid.pixel_offset(x, y);
        let expected = if x % 2 == 1 { 1200 } else { 1175 };
        assert_eq!(pixels.get(0, px + 1, py + 1), expected);
    }
}

#[test]
fn invalid_request_fails_before_any_fetch() {
    let source = Arc::new(ScriptedSource::new(|_: &TileRequest, _| {
        Ok(TileBuffer::filled(SIZE, SIZE, 1, 1))
    }));
    let registrar = Arc::new(DateRegistrar::default());
    let engine = MosaicEngine::new(source, registrar.clone(), config()).unwrap();
    let request = MosaicRequest {
        end: date(2023, 7, 1),
        ..request(DataProduct::B08)
    };
    let dir = tempfile::tempdir().unwrap();

    let result = engine.run_to_file(&request, &dir.path().join("out.tif"));

    assert!(matches!(result, Err(MosaicError::InvalidRequest(_))));
    assert_eq!(registrar.calls.load(Ordering::SeqCst), 0);
}
