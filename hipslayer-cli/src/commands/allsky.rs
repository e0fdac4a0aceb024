//! Allsky command - build the Allsky preview files of one order.

use hipslayer::healpix::pixel_count;
use hipslayer::mosaic;

use super::pixel_progress;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the allsky command.
pub struct AllskyArgs {
    pub layer: String,
    pub order: u8,
    pub concurrency: usize,
    pub json: bool,
}

/// Run the allsky command.
pub fn run(runner: &CliRunner, args: AllskyArgs) -> Result<(), CliError> {
    runner.log_startup("allsky");

    let (pb, callback) = pixel_progress(pixel_count(args.order));
    let result = mosaic::generate_allsky(
        runner.service(),
        &args.layer,
        args.order,
        args.concurrency,
        Some(&callback),
    );
    pb.finish_and_clear();
    let report = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
        return Ok(());
    }

    let layout = report.layout;
    println!(
        "Allsky for layer '{}' at order {}: {}x{} tiles of {}x{} pixels",
        report.layer,
        report.order,
        layout.tiles_per_row,
        layout.rows,
        layout.tile_size(),
        layout.tile_size()
    );
    for file in &report.files {
        println!("  {}", file.display());
    }
    if !report.failed.is_empty() {
        println!("{} tiles could not be generated:", report.failed.len());
        for failure in &report.failed {
            println!("  Npix{}: {}", failure.pixel, failure.message);
        }
    }
    Ok(())
}
