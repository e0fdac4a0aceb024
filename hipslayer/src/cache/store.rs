//! Persistent tile storage.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{CacheError, TileKey};

/// Byte store addressed by [`TileKey`].
///
/// Implementations must be safe to share between threads; callers serialize
/// writers of the same key through the cache lock.
pub trait TileStore: Send + Sync {
    /// Returns the stored bytes, or `None` if the key is absent.
    fn load(&self, key: &TileKey) -> Result<Option<Vec<u8>>, CacheError>;

    /// Stores `data`, replacing any previous value.
    fn store(&self, key: &TileKey, data: &[u8]) -> Result<(), CacheError>;

    /// Checks existence without reading the value.
    fn contains(&self, key: &TileKey) -> bool;
}

/// Tile store rooted at a directory, one file per tile.
#[derive(Debug)]
pub struct DiskTileStore {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl DiskTileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the file holding `key`.
    pub fn tile_path(&self, key: &TileKey) -> PathBuf {
        self.root.join(key.relative_path())
    }
}

impl TileStore for DiskTileStore {
    fn load(&self, key: &TileKey) -> Result<Option<Vec<u8>>, CacheError> {
        match fs::read(self.tile_path(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, key: &TileKey, data: &[u8]) -> Result<(), CacheError> {
        let path = self.tile_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Readers never observe a partially written tile.
        let tmp = path.with_extension(format!(
            "{}.tmp-{}-{}",
            key.format.extension(),
            std::process::id(),
            self.tmp_counter.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, data)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn contains(&self, key: &TileKey) -> bool {
        self.tile_path(key).is_file()
    }
}
