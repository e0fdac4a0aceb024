//! Allsky preview images: every tile of one order, downscaled and packed
//! row-major into a single image.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use super::{lookup, worker_pool, MosaicError, MosaicProgress, PixelFailure, ProgressCallback};
use crate::codec::TileFormat;
use crate::healpix::pixel_count;
use crate::raster::Raster;
use crate::service::HipsService;

/// Maximum height in pixels of an Allsky image.
pub const MAX_ALLSKY_SIZE: u32 = 2048;

/// Grid geometry of an Allsky image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AllskyLayout {
    pub tiles: u64,
    pub tiles_per_row: u64,
    pub rows: u64,
    /// log2 of the preview tile width.
    pub shift: u8,
}

impl AllskyLayout {
    /// Lays out the tiles of `order`, starting from tiles of side
    /// `2^max_shift` and halving them until the image is at most
    /// [`MAX_ALLSKY_SIZE`] high.
    pub fn new(order: u8, max_shift: u8) -> Option<Self> {
        let tiles = pixel_count(order);
        let tiles_per_row = integer_sqrt(tiles);
        let rows = tiles.div_ceil(tiles_per_row);

        let mut shift = max_shift;
        while (rows << shift) > MAX_ALLSKY_SIZE as u64 {
            if shift == 0 {
                return None;
            }
            shift -= 1;
        }
        Some(Self {
            tiles,
            tiles_per_row,
            rows,
            shift,
        })
    }

    pub fn tile_size(&self) -> u32 {
        1 << self.shift
    }

    pub fn width(&self) -> u32 {
        (self.tiles_per_row as u32) << self.shift
    }

    pub fn height(&self) -> u32 {
        (self.rows as u32) << self.shift
    }

    /// Top-left corner of `pixel` in the image.
    pub fn position(&self, pixel: u64) -> (u32, u32) {
        let col = (pixel % self.tiles_per_row) as u32;
        let row = (pixel / self.tiles_per_row) as u32;
        (col << self.shift, row << self.shift)
    }
}

fn integer_sqrt(n: u64) -> u64 {
    let mut root = (n as f64).sqrt() as u64;
    while root * root > n {
        root -= 1;
    }
    while (root + 1) * (root + 1) <= n {
        root += 1;
    }
    root.max(1)
}

/// Outcome of [`generate_allsky`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllskyReport {
    pub layer: String,
    pub order: u8,
    pub layout: AllskyLayout,
    pub files: Vec<PathBuf>,
    /// Pixels left transparent because they could not be generated.
    pub failed: Vec<PixelFailure>,
}

/// Builds `Allsky.png` and `Allsky.jpg` for `layer` at `order`.
///
/// Files are written next to the layer's tiles, where the service looks
/// for them.
pub fn generate_allsky(
    service: &HipsService,
    layer: &str,
    order: u8,
    concurrency: usize,
    progress: Option<&ProgressCallback>,
) -> Result<AllskyReport, MosaicError> {
    let max_shift = service
        .layer(layer)
        .map(|served| served.layer().shift())
        .ok_or_else(|| MosaicError::UnknownLayer(layer.to_string()))?;
    let layout = AllskyLayout::new(order, max_shift).ok_or(MosaicError::AllskyTooLarge {
        order,
        max: MAX_ALLSKY_SIZE,
    })?;
    let served = lookup(service, layer, order, Some(layout.shift))?;

    info!(
        layer,
        order,
        columns = layout.tiles_per_row,
        rows = layout.rows,
        tile_size = layout.tile_size(),
        "Generating Allsky"
    );

    let pool = worker_pool(concurrency)?;
    let completed = AtomicU64::new(0);
    let total = layout.tiles;

    let tiles: Vec<(u64, Result<Raster, String>)> = pool.install(|| {
        (0..total)
            .into_par_iter()
            .map(|pixel| {
                let tile = served
                    .layer()
                    .project_with_shift(order, pixel, layout.shift)
                    .map_err(|e| {
                        warn!(layer, order, pixel, error = %e, "Failed to generate Allsky tile");
                        e.to_string()
                    });
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(cb) = progress {
                    cb(MosaicProgress {
                        completed: done,
                        total,
                    });
                }
                (pixel, tile)
            })
            .collect()
    });

    let mut canvas = Raster::new(layout.width(), layout.height(), 4);
    let mut failed = Vec::new();
    for (pixel, tile) in tiles {
        match tile {
            Ok(tile) => {
                let (x, y) = layout.position(pixel);
                canvas.blit(&tile, x, y);
            }
            Err(message) => failed.push(PixelFailure { pixel, message }),
        }
    }

    let mut files = Vec::with_capacity(TileFormat::ALL.len());
    for format in TileFormat::ALL {
        let path = service.allsky_path(layer, order, format);
        let bytes = format.encode(&canvas)?;
        write_file(&path, &bytes)?;
        info!(path = %path.display(), "Wrote Allsky");
        files.push(path);
    }

    Ok(AllskyReport {
        layer: layer.to_string(),
        order,
        layout,
        files,
        failed,
    })
}

fn write_file(path: &std::path::Path, bytes: &[u8]) -> Result<(), MosaicError> {
    let io_error = |source| MosaicError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    std::fs::write(path, bytes).map_err(io_error)
}
