//! ClearMosaic - cloud-free satellite mosaics from web map tiles
//!
//! This library assembles a georeferenced raster mosaic from the tiles of a
//! registered imagery mosaic and replaces cloudy tiles with clear pixels
//! from older mosaics, using a cloud classifier to decide which pixels to
//! keep.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use chrono::NaiveDate;
//! use clearmosaic::{
//!     BoundingBox, DataProduct, EngineConfig, HttpTileSource, MosaicEngine, MosaicRequest,
//!     PlanetaryComputerRegistrar, ReqwestClient, UrlTemplates,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default();
//! let source = HttpTileSource::new(
//!     ReqwestClient::with_timeout(config.request_timeout)?,
//!     UrlTemplates::new(),
//! );
//! let registrar = PlanetaryComputerRegistrar::new(ReqwestClient::new()?)?;
//! let engine = MosaicEngine::new(Arc::new(source), Arc::new(registrar), config)?;
//!
//! let bbox = BoundingBox::new(7.0, 7.2, 46.0, 46.1)?;
//! let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
//! let end = NaiveDate::from_ymd_opt(2023, 6, 30).unwrap();
//! let request = MosaicRequest::new(bbox, 14, start, end, DataProduct::Rgb);
//!
//! let report = engine.run_to_file(&request, Path::new(&request.default_file_name()))?;
//! println!("{}", report.to_json()?);
//! # Ok(())
//! # }
//! ```

pub mod assembly;
pub mod canvas;
pub mod cloud;
pub mod config;
pub mod coord;
pub mod engine;
pub mod error;
pub mod geotiff;
pub mod logging;
pub mod provider;
pub mod raster;
pub mod replacement;

pub use assembly::{AssemblyReport, MosaicAssembler};
pub use canvas::{CanvasError, DiskCanvas, MemoryCanvas, RasterLayout, RasterTarget};
pub use cloud::{CloudClassifier, CloudSegmenter, DilationKernel, SegmentationError};
pub use config::{ConfigError, ConfigFile, EngineConfig};
pub use coord::{BoundingBox, CoordError, GeoReference, TileGrid};
pub use engine::{MosaicEngine, MosaicReport, MosaicRequest};
pub use error::MosaicError;
pub use provider::{
    HttpTileSource, MosaicRegistrar, PlanetaryComputerRegistrar, ProviderError, ReqwestClient,
    TileSource, UrlTemplates,
};
pub use raster::{DataProduct, PixelType, TileBuffer};
pub use replacement::ReplacementReport;

#[cfg(feature = "onnx")]
pub use cloud::OnnxClassifier;
