//! Grid command - print the tile grid of an extent without downloading.

use clap::Args;
use clearmosaic::{ConfigFile, TileGrid};
use serde_json::json;

use super::common::ExtentArgs;
use crate::error::CliError;

/// Arguments for the grid command.
#[derive(Debug, Args)]
pub struct GridArgs {
    #[command(flatten)]
    pub extent: ExtentArgs,

    /// Print the grid as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the grid command.
pub fn run(args: GridArgs, config: &ConfigFile) -> Result<(), CliError> {
    let bbox = args.extent.bbox()?;
    let tile_size = args.extent.tile_size(&config.engine);
    let (grid, georeference) = TileGrid::compute(&bbox, args.extent.zoom, tile_size)
        .map_err(|e| CliError::Config(e.to_string()))?;

    if args.json {
        let value = json!({
            "grid": grid,
            "georeference": georeference,
            "geo_transform": georeference.geo_transform(),
        });
        let text =
            serde_json::to_string_pretty(&value).map_err(|e| CliError::Report(e.to_string()))?;
        println!("{}", text);
        return Ok(());
    }

    println!("Extent:     {}", bbox);
    println!("Zoom:       {}", grid.zoom());
    println!(
        "Tiles:      x {}..={}, y {}..={} ({} columns x {} rows, {} tiles)",
        grid.x_min(),
        grid.x_max(),
        grid.y_min(),
        grid.y_max(),
        grid.columns(),
        grid.rows(),
        grid.tile_count()
    );
    println!(
        "Canvas:     {} x {} pixels",
        grid.canvas_width(),
        grid.canvas_height()
    );
    println!(
        "Origin:     {:.3}, {:.3} (EPSG:{})",
        georeference.origin_x, georeference.origin_y, georeference.epsg
    );
    println!("Resolution: {:.6} m/pixel", georeference.resolution);
    Ok(())
}
