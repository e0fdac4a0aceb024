//! Seeding the tile cache for a whole order.

use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use super::{lookup, worker_pool, MosaicError, MosaicProgress, PixelFailure, ProgressCallback};
use crate::cache::{CacheMode, TileKey};
use crate::codec::TileFormat;
use crate::healpix::pixel_count;
use crate::service::{HipsService, ServedLayer};

/// Outcome of [`seed`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub layer: String,
    pub order: u8,
    pub total: u64,
    /// Pixels for which at least one format was generated.
    pub generated: Vec<u64>,
    /// Pixels already cached in every format.
    pub skipped: Vec<u64>,
    pub failed: Vec<PixelFailure>,
}

enum PixelOutcome {
    Generated,
    Skipped,
    Failed(String),
}

/// Generates and stores every tile of `layer` at `order`.
///
/// Formats come from the layer's `hips_tile_format`. Tiles already cached
/// in every format are skipped; otherwise the tile is projected once and
/// each missing format is stored, whatever `populate_cache` says.
pub fn seed(
    service: &HipsService,
    layer: &str,
    order: u8,
    concurrency: usize,
    progress: Option<&ProgressCallback>,
) -> Result<SeedReport, MosaicError> {
    let served = lookup(service, layer, order, None)?;
    let formats = served.layer().config().tile_formats();
    if formats.is_empty() {
        return Err(MosaicError::NoTileFormats(layer.to_string()));
    }

    let total = pixel_count(order);
    info!(layer, order, total, concurrency, "Seeding HiPS tiles");

    let pool = worker_pool(concurrency)?;
    let completed = AtomicU64::new(0);

    let outcomes: Vec<(u64, PixelOutcome)> = pool.install(|| {
        (0..total)
            .into_par_iter()
            .map(|pixel| {
                let outcome = seed_pixel(served, order, pixel, &formats);
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                let update = MosaicProgress {
                    completed: done,
                    total,
                };
                info!(layer, "Seeding completed at {:.2} %", update.percent());
                if let Some(cb) = progress {
                    cb(update);
                }
                (pixel, outcome)
            })
            .collect()
    });

    let mut report = SeedReport {
        layer: layer.to_string(),
        order,
        total,
        ..SeedReport::default()
    };
    for (pixel, outcome) in outcomes {
        match outcome {
            PixelOutcome::Generated => report.generated.push(pixel),
            PixelOutcome::Skipped => report.skipped.push(pixel),
            PixelOutcome::Failed(message) => report.failed.push(PixelFailure { pixel, message }),
        }
    }

    info!(
        layer,
        order,
        generated = report.generated.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "Seeding finished"
    );
    Ok(report)
}

fn seed_pixel(served: &ServedLayer, order: u8, pixel: u64, formats: &[TileFormat]) -> PixelOutcome {
    let cache = served.cache();
    let missing: Vec<TileKey> = formats
        .iter()
        .map(|format| TileKey::new(order, pixel, *format))
        .filter(|key| !cache.is_cached(key))
        .collect();
    if missing.is_empty() {
        return PixelOutcome::Skipped;
    }

    let raster = match served.layer().tile(order, pixel) {
        Ok(raster) => raster,
        Err(e) => {
            warn!(layer = %served.layer().name(), order, pixel, error = %e, "Failed to generate tile");
            return PixelOutcome::Failed(e.to_string());
        }
    };

    for key in missing {
        let stored = cache.get_or_populate_as(&key, CacheMode::ReadWrite, || {
            key.format.encode(&raster)
        });
        if let Err(e) = stored {
            warn!(tile = %key, error = %e, "Failed to encode tile");
            return PixelOutcome::Failed(e.to_string());
        }
    }
    PixelOutcome::Generated
}
