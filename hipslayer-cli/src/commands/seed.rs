//! Seed command - generate every tile of one order into the cache.

use hipslayer::healpix::pixel_count;
use hipslayer::mosaic;

use super::pixel_progress;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the seed command.
pub struct SeedArgs {
    pub layer: String,
    pub order: u8,
    pub concurrency: usize,
    pub json: bool,
}

/// Run the seed command.
pub fn run(runner: &CliRunner, args: SeedArgs) -> Result<(), CliError> {
    runner.log_startup("seed");

    let (pb, callback) = pixel_progress(pixel_count(args.order));
    let result = mosaic::seed(
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

    println!(
        "Seeded layer '{}' at order {}: {} generated, {} already cached, {} failed",
        report.layer,
        report.order,
        report.generated.len(),
        report.skipped.len(),
        report.failed.len()
    );
    for failure in &report.failed {
        println!("  Npix{}: {}", failure.pixel, failure.message);
    }
    Ok(())
}
