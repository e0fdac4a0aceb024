//! Bulk generation: seeding every tile of an order and building Allsky
//! previews.
//!
//! Both operations fan out over all pixels of one order on a dedicated
//! `rayon` pool. A pixel that fails is recorded in the report and does not
//! stop the run.

mod allsky;
mod seed;

pub use allsky::{generate_allsky, AllskyLayout, AllskyReport, MAX_ALLSKY_SIZE};
pub use seed::{seed, SeedReport};

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::codec::CodecError;
use crate::healpix::MAX_ORDER;
use crate::service::{HipsService, ServedLayer};

/// Errors that abort a bulk run before or after the per-pixel work.
#[derive(Debug, Error)]
pub enum MosaicError {
    #[error("Unknown layer '{0}'")]
    UnknownLayer(String),

    #[error("Order {order} exceeds the maximum order {max} for layer '{layer}'")]
    OrderTooLarge { layer: String, order: u8, max: u8 },

    #[error("Layer '{0}' advertises neither png nor jpeg in hips_tile_format")]
    NoTileFormats(String),

    #[error("Allsky for order {order} does not fit in {max}x{max} pixels")]
    AllskyTooLarge { order: u8, max: u32 },

    #[error("Failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Failed to encode Allsky: {0}")]
    Codec(#[from] CodecError),

    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Progress of a bulk run, reported once per finished pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MosaicProgress {
    pub completed: u64,
    pub total: u64,
}

impl MosaicProgress {
    /// Completion in percent.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        100.0 * self.completed as f64 / self.total as f64
    }
}

/// Callback receiving [`MosaicProgress`] updates from worker threads.
pub type ProgressCallback = Arc<dyn Fn(MosaicProgress) + Send + Sync>;

/// A pixel that could not be generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PixelFailure {
    pub pixel: u64,
    pub message: String,
}

fn lookup<'a>(
    service: &'a HipsService,
    layer: &str,
    order: u8,
    shift: Option<u8>,
) -> Result<&'a ServedLayer, MosaicError> {
    let served = service
        .layer(layer)
        .ok_or_else(|| MosaicError::UnknownLayer(layer.to_string()))?;
    let max = MAX_ORDER.saturating_sub(shift.unwrap_or_else(|| served.layer().shift()));
    if order > max {
        return Err(MosaicError::OrderTooLarge {
            layer: layer.to_string(),
            order,
            max,
        });
    }
    Ok(served)
}

fn worker_pool(concurrency: usize) -> Result<rayon::ThreadPool, MosaicError> {
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .thread_name(|i| format!("hipslayer-mosaic-{}", i))
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent() {
        assert_eq!(MosaicProgress { completed: 3, total: 12 }.percent(), 25.0);
        assert_eq!(MosaicProgress { completed: 0, total: 0 }.percent(), 100.0);
    }

    #[test]
    fn test_seed_report_serializes_failures() {
        let report = SeedReport {
            layer: "osm".to_string(),
            order: 1,
            total: 48,
            generated: vec![0, 1],
            skipped: vec![],
            failed: vec![PixelFailure {
                pixel: 2,
                message: "Timeout".to_string(),
            }],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["layer"], "osm");
        assert_eq!(json["generated"], serde_json::json!([0, 1]));
        assert_eq!(json["failed"][0]["pixel"], 2);
        assert_eq!(json["failed"][0]["message"], "Timeout");
    }
}
