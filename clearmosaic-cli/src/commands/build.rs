//! Build command - assemble a mosaic and replace cloudy tiles.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use clap::Args;
use clearmosaic::cloud::CloudClassifier;
use clearmosaic::{
    ConfigFile, DataProduct, EngineConfig, HttpTileSource, MosaicEngine, MosaicReport,
    MosaicRequest, PlanetaryComputerRegistrar, ReqwestClient,
};
use tracing::warn;

use super::common::ExtentArgs;
use crate::error::CliError;

/// Arguments for the build command.
#[derive(Debug, Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub extent: ExtentArgs,

    /// First day of the date range (YYYY-MM-DD)
    #[arg(long)]
    pub start: NaiveDate,

    /// Last day of the date range (YYYY-MM-DD)
    #[arg(long)]
    pub end: NaiveDate,

    /// Data product, e.g. RGB, NDVI, B08, RGB16 [default: from config]
    #[arg(long)]
    pub product: Option<DataProduct>,

    /// Maximum scene cloud cover of the primary mosaic, in percent
    #[arg(long, value_name = "PERCENT")]
    pub clouds: Option<u8>,

    /// Replace cloudy tiles with pixels from older mosaics
    #[arg(long)]
    pub cloud_detection: bool,

    /// Write BeforeMask.tif and AfterMask.tif next to the output
    #[arg(long)]
    pub save_masks: bool,

    /// Region name used as the output file prefix
    #[arg(long)]
    pub region: Option<String>,

    /// Output file or directory [default: config output directory]
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// ONNX cloud model [default: from config]
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Number of parallel tile downloads
    #[arg(long)]
    pub parallel: Option<usize>,

    /// HTTP request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Write the run report as JSON to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl BuildArgs {
    /// Layers the command-line overrides over the configured engine settings.
    fn engine_config(&self, config: &ConfigFile) -> EngineConfig {
        let mut engine = config
            .engine
            .clone()
            .with_tile_size(self.extent.tile_size(&config.engine));
        if let Some(parallel) = self.parallel {
            engine = engine.with_parallel_downloads(parallel);
        }
        if let Some(timeout) = self.timeout {
            engine = engine.with_request_timeout(Duration::from_secs(timeout));
        }
        engine
    }

    fn request(&self, config: &ConfigFile) -> Result<MosaicRequest, CliError> {
        let mut request = MosaicRequest::new(
            self.extent.bbox()?,
            self.extent.zoom,
            self.start,
            self.end,
            self.product.unwrap_or(config.product),
        )
        .with_max_cloud_cover(self.clouds.unwrap_or(config.max_cloud_cover))
        .with_cloud_detection(self.cloud_detection)
        .with_save_masks(self.save_masks || config.save_masks);
        if let Some(region) = &self.region {
            request = request.with_region(region.clone());
        }
        request.validate()?;
        Ok(request)
    }
}

/// Resolves the output file: an explicit file, a file in an explicit
/// directory, or a file in the configured output directory.
fn output_path(
    output: Option<&Path>,
    directory: Option<&Path>,
    request: &MosaicRequest,
) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(request.default_file_name()),
        Some(path) => path.to_path_buf(),
        None => directory
            .unwrap_or_else(|| Path::new("."))
            .join(request.default_file_name()),
    }
}

/// Loads the cloud model when cloud detection is requested.
fn load_classifier(
    args: &BuildArgs,
    config: &ConfigFile,
) -> Result<Option<Arc<dyn CloudClassifier>>, CliError> {
    if !args.cloud_detection {
        return Ok(None);
    }
    let model = match args.model.as_ref().or(config.model_path.as_ref()) {
        Some(model) => model,
        None => {
            warn!("Cloud detection requested but no model given (--model or [classifier] model)");
            return Ok(None);
        }
    };
    open_model(model, &config.model_input_name)
}

#[cfg(feature = "onnx")]
fn open_model(
    path: &Path,
    input_name: &str,
) -> Result<Option<Arc<dyn CloudClassifier>>, CliError> {
    let classifier = clearmosaic::OnnxClassifier::from_file(path)?.with_input_name(input_name);
    Ok(Some(Arc::new(classifier)))
}

#[cfg(not(feature = "onnx"))]
fn open_model(
    path: &Path,
    _input_name: &str,
) -> Result<Option<Arc<dyn CloudClassifier>>, CliError> {
    warn!(
        model = %path.display(),
        "Built without the onnx feature, cloud model cannot be loaded"
    );
    Ok(None)
}

/// Run the build command.
pub fn run(args: BuildArgs, config: &ConfigFile) -> Result<(), CliError> {
    let engine_config = args.engine_config(config);
    let request = args.request(config)?;
    let output = output_path(
        args.output.as_deref(),
        config.output_directory.as_deref(),
        &request,
    );

    let client = || {
        ReqwestClient::with_timeout(engine_config.request_timeout)
            .map_err(|e| CliError::Provider(e.to_string()))
    };
    let source = HttpTileSource::new(client()?, config.templates.clone());
    let registrar =
        PlanetaryComputerRegistrar::with_endpoint(client()?, config.register_url.clone())
            .map_err(|e| CliError::Provider(e.to_string()))?;

    let mut engine = MosaicEngine::new(Arc::new(source), Arc::new(registrar), engine_config)?;
    if let Some(classifier) = load_classifier(&args, config)? {
        engine = engine.with_classifier(classifier);
    }

    println!("Building {}", output.display());
    let report = engine.run_to_file(&request, &output)?;
    print_summary(&report);

    if let Some(path) = &args.report {
        let json = report
            .to_json()
            .map_err(|e| CliError::Report(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| CliError::Report(e.to_string()))?;
    }
    Ok(())
}

fn print_summary(report: &MosaicReport) {
    let assembly = &report.assembly;
    println!(
        "Tiles: {} ({} fetched, {} repaired, {} missing)",
        assembly.tiles,
        assembly.fetched,
        assembly.repaired,
        assembly.unrepaired.len()
    );
    if let Some(replacement) = &report.replacement {
        println!(
            "Clouds: {} classified, {} searched, {} cleared, {} still cloudy, {} unclassified",
            replacement.classified,
            replacement.searched,
            replacement.cleared,
            replacement.still_cloudy(),
            replacement.unclassified.len()
        );
    }
    if let Some(output) = &report.output {
        println!("Wrote {}", output.display());
    }
}
