//! HipsLayer CLI - Command-line interface
//!
//! Seeds tile caches, builds Allsky previews and serves HiPS layers
//! described by a configuration file.

mod commands;
mod error;
mod runner;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::{allsky, map, properties, seed, serve, tile};
use error::CliError;
use runner::{default_concurrency, CliRunner};

#[derive(Parser)]
#[command(name = "hipslayer")]
#[command(version = hipslayer::VERSION)]
#[command(about = "Generate and serve HiPS tiles from planar raster sources", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.hipslayer/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and cache every tile of one order
    Seed {
        /// Layer name
        #[arg(long)]
        layer: String,

        /// HEALPix order to seed
        #[arg(long)]
        order: u8,

        /// Number of worker threads (default: available cores)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build Allsky.png and Allsky.jpg for one order
    Allsky {
        /// Layer name
        #[arg(long)]
        layer: String,

        /// HEALPix order, generally 0 to 3
        #[arg(long)]
        order: u8,

        /// Number of worker threads (default: available cores)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the properties document of a layer
    Properties {
        /// Layer name
        #[arg(long)]
        layer: String,
    },

    /// Answer one /hips request and save the response body
    Tile {
        /// Request path, e.g. /hips/osm/Norder3/Dir0/Npix42.png
        #[arg(long)]
        path: String,

        /// Output file
        #[arg(long)]
        output: PathBuf,
    },

    /// Render a planar image from a layer's source
    Map {
        /// Layer name
        #[arg(long)]
        layer: String,

        /// Bounding box as MINX,MINY,MAXX,MAXY
        #[arg(long, allow_hyphen_values = true)]
        bbox: String,

        /// Spatial reference system of the bounding box
        #[arg(long, default_value = "EPSG:4326")]
        srs: String,

        /// Image size as WIDTHxHEIGHT
        #[arg(long)]
        size: String,

        /// Output file (.png or .jpg)
        #[arg(long)]
        output: PathBuf,
    },

    /// Serve /hips over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let stdout_logging = matches!(cli.command, Commands::Serve { .. });
    let runner = CliRunner::new(cli.config.as_deref(), stdout_logging)?;

    match cli.command {
        Commands::Seed {
            layer,
            order,
            concurrency,
            json,
        } => seed::run(
            &runner,
            seed::SeedArgs {
                layer,
                order,
                concurrency: concurrency.unwrap_or_else(default_concurrency),
                json,
            },
        ),
        Commands::Allsky {
            layer,
            order,
            concurrency,
            json,
        } => allsky::run(
            &runner,
            allsky::AllskyArgs {
                layer,
                order,
                concurrency: concurrency.unwrap_or_else(default_concurrency),
                json,
            },
        ),
        Commands::Properties { layer } => properties::run(&runner, &layer),
        Commands::Tile { path, output } => tile::run(&runner, &path, &output),
        Commands::Map {
            layer,
            bbox,
            srs,
            size,
            output,
        } => map::run(
            &runner,
            map::MapArgs {
                layer,
                bbox,
                srs,
                size,
                output,
            },
        ),
        Commands::Serve { bind } => serve::run(&runner, bind),
    }
}
