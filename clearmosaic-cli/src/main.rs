//! ClearMosaic CLI - Command-line interface
//!
//! Builds cloud-free GeoTIFF mosaics from web map tiles.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use clearmosaic::logging;

use commands::build::BuildArgs;
use commands::grid::GridArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "clearmosaic")]
#[command(about = "Cloud-free satellite mosaics from web map tiles", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file [default: <config dir>/clearmosaic/config.ini]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. debug or clearmosaic=trace [default: from config]
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a mosaic GeoTIFF, optionally replacing cloudy tiles
    Build(BuildArgs),

    /// Print the tile grid and georeference of an extent
    Grid(GridArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = commands::common::load_config(cli.config.as_deref())?;

    let mut logging_config = config.logging.clone();
    if let Some(level) = cli.log_level {
        logging_config = logging_config.with_level(level);
    }
    let _guard = logging::init(&logging_config)?;

    match cli.command {
        Commands::Build(args) => commands::build::run(args, &config),
        Commands::Grid(args) => commands::grid::run(args, &config),
    }
}
