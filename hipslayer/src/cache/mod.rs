//! On-disk tile cache with per-tile locking.
//!
//! Tiles are persisted in their encoded form under a HiPS directory layout
//! (`Norder{N}/Dir{D}/Npix{P}.{ext}`) so that a populated cache can also be
//! served statically.
//!
//! # Architecture
//!
//! ```text
//! TileCache ── get_or_populate(key, populate)
//!   ├── TileLocker  (in-process slot + cross-process lock file per key)
//!   └── TileStore   (DiskTileStore: atomic write-then-rename)
//! ```
//!
//! Locks are scoped to one [`TileKey`]: callers building the same tile
//! serialize, callers building different tiles never wait on each other.

mod lock;
mod store;
mod tile_cache;

pub use lock::{TileLock, TileLocker, DEFAULT_LOCK_TIMEOUT};
pub use store::{DiskTileStore, TileStore};
pub use tile_cache::{default_lock_dir, CacheMode, CachedTile, TileCache, TileOrigin};

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::codec::TileFormat;

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error while reading, writing or locking.
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The lock for a tile could not be acquired in time.
    #[error("Timed out after {timeout:?} waiting for lock {name}")]
    LockTimeout { name: String, timeout: Duration },
}

/// Identifies one cache entry: a tile at `(order, pixel)` in one format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub order: u8,
    pub pixel: u64,
    pub format: TileFormat,
}

impl TileKey {
    pub fn new(order: u8, pixel: u64, format: TileFormat) -> Self {
        Self {
            order,
            pixel,
            format,
        }
    }

    /// HiPS directory bucket of the pixel (`floor(pixel / 10000) · 10000`).
    pub fn dir(&self) -> u64 {
        hips_dir(self.pixel)
    }

    /// Path of the tile relative to a HiPS root.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(format!("Norder{}", self.order))
            .join(format!("Dir{}", self.dir()))
            .join(format!("Npix{}.{}", self.pixel, self.format.extension()))
    }

    /// Name used for the per-key lock.
    pub fn lock_name(&self) -> String {
        format!("{}-{}-{}", self.order, self.pixel, self.format.extension())
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Norder{}/Dir{}/Npix{}.{}",
            self.order,
            self.dir(),
            self.pixel,
            self.format.extension()
        )
    }
}

/// HiPS directory bucket for `pixel`.
pub fn hips_dir(pixel: u64) -> u64 {
    (pixel / 10_000) * 10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_key_paths() {
        let key = TileKey::new(3, 12_345, TileFormat::Jpeg);
        assert_eq!(key.dir(), 10_000);
        assert_eq!(
            key.relative_path(),
            PathBuf::from("Norder3/Dir10000/Npix12345.jpg")
        );
        assert_eq!(key.to_string(), "Norder3/Dir10000/Npix12345.jpg");
        assert_eq!(key.lock_name(), "3-12345-jpg");
    }

    #[test]
    fn test_hips_dir() {
        assert_eq!(hips_dir(0), 0);
        assert_eq!(hips_dir(9_999), 0);
        assert_eq!(hips_dir(10_000), 10_000);
        assert_eq!(hips_dir(123_456), 120_000);
    }
}
