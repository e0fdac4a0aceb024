//! Get-or-populate over a [`TileStore`] guarded by a [`TileLocker`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{DiskTileStore, TileKey, TileLock, TileLocker, TileStore};

/// Whether populated tiles are written back to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    ReadWrite,
    /// Read-through only: hits are served, misses are built but not stored.
    ReadOnly,
}

/// Where a returned tile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOrigin {
    Cache,
    Populated,
}

/// Encoded tile returned by [`TileCache::get_or_populate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTile {
    pub bytes: Vec<u8>,
    pub origin: TileOrigin,
}

/// Tile cache with at-most-one build per key.
///
/// Storage and locking failures never fail a request: they are logged and
/// the cache degrades to building the tile without storing it.
pub struct TileCache {
    store: Arc<dyn TileStore>,
    locker: TileLocker,
    mode: CacheMode,
}

impl TileCache {
    /// Creates a cache over an arbitrary store.
    pub fn new(store: Arc<dyn TileStore>, locker: TileLocker, mode: CacheMode) -> Self {
        Self {
            store,
            locker,
            mode,
        }
    }

    /// Creates a disk-backed cache rooted at `root`.
    ///
    /// # Arguments
    ///
    /// * `root` - Directory holding the `Norder*/Dir*/Npix*` tree
    /// * `lock_dir` - Directory for lock files shared across processes
    /// * `timeout` - Bound on lock waits
    /// * `mode` - Whether populated tiles are stored
    pub fn on_disk(
        root: impl Into<PathBuf>,
        lock_dir: impl Into<PathBuf>,
        timeout: Duration,
        mode: CacheMode,
    ) -> Self {
        let root = root.into();
        let locker = TileLocker::new(lock_dir, &root, timeout);
        Self::new(Arc::new(DiskTileStore::new(root)), locker, mode)
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    fn lock(&self, key: &TileKey) -> Option<TileLock<'_>> {
        match self.locker.lock(&key.lock_name()) {
            Ok(lock) => Some(lock),
            Err(e) => {
                warn!(error = %e, key = %key, "Tile lock unavailable, continuing without cache");
                None
            }
        }
    }

    fn load(&self, key: &TileKey) -> Option<Vec<u8>> {
        match self.store.load(key) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, key = %key, "Failed to read cached tile");
                None
            }
        }
    }

    /// Returns the cached tile for `key`, building it with `populate` when
    /// absent.
    ///
    /// While the per-key lock is held the store is checked again, so
    /// concurrent callers with the same key invoke `populate` at most once
    /// between them (as long as locking succeeds).
    ///
    /// # Errors
    ///
    /// Only errors returned by `populate` are propagated.
    pub fn get_or_populate<F, E>(&self, key: &TileKey, populate: F) -> Result<CachedTile, E>
    where
        F: FnOnce() -> Result<Vec<u8>, E>,
    {
        self.get_or_populate_as(key, self.mode, populate)
    }

    /// [`get_or_populate`](Self::get_or_populate) with an explicit mode.
    ///
    /// Bulk seeding stores tiles even when request handling is read-only.
    pub fn get_or_populate_as<F, E>(
        &self,
        key: &TileKey,
        mode: CacheMode,
        populate: F,
    ) -> Result<CachedTile, E>
    where
        F: FnOnce() -> Result<Vec<u8>, E>,
    {
        let lock = self.lock(key);

        if let Some(bytes) = self.load(key) {
            debug!(key = %key, "Tile cache hit");
            return Ok(CachedTile {
                bytes,
                origin: TileOrigin::Cache,
            });
        }

        let bytes = populate()?;

        if lock.is_some() && mode == CacheMode::ReadWrite {
            if let Err(e) = self.store.store(key, &bytes) {
                warn!(error = %e, key = %key, "Failed to store tile");
            }
        }
        drop(lock);

        Ok(CachedTile {
            bytes,
            origin: TileOrigin::Populated,
        })
    }

    /// Checks for `key` while holding its lock.
    pub fn is_cached(&self, key: &TileKey) -> bool {
        let _lock = self.lock(key);
        self.store.contains(key)
    }

    /// Reads `key` without locking.
    pub fn get(&self, key: &TileKey) -> Option<Vec<u8>> {
        self.load(key)
    }
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache").field("mode", &self.mode).finish()
    }
}

/// Lock directory used when none is configured.
pub fn default_lock_dir(cache_dir: &Path) -> PathBuf {
    cache_dir.join("tile_locks")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheError;
    use crate::codec::TileFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use tempfile::TempDir;

    fn cache(temp: &TempDir, mode: CacheMode) -> TileCache {
        TileCache::on_disk(
            temp.path().join("tiles"),
            temp.path().join("locks"),
            Duration::from_secs(10),
            mode,
        )
    }

    #[test]
    fn test_populates_then_hits() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp, CacheMode::ReadWrite);
        let key = TileKey::new(0, 1, TileFormat::Png);

        let first = cache
            .get_or_populate(&key, || Ok::<_, String>(vec![9, 9]))
            .unwrap();
        assert_eq!(first.origin, TileOrigin::Populated);

        let second = cache
            .get_or_populate(&key, || Err::<Vec<u8>, _>("must not run".to_string()))
            .unwrap();
        assert_eq!(second.origin, TileOrigin::Cache);
        assert_eq!(second.bytes, vec![9, 9]);
        assert!(cache.is_cached(&key));
    }

    #[test]
    fn test_read_only_mode_does_not_store() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp, CacheMode::ReadOnly);
        let key = TileKey::new(0, 1, TileFormat::Png);
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let tile = cache
                .get_or_populate(&key, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(vec![1])
                })
                .unwrap();
            assert_eq!(tile.origin, TileOrigin::Populated);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!cache.is_cached(&key));
    }

    #[test]
    fn test_explicit_mode_overrides_read_only() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp, CacheMode::ReadOnly);
        let key = TileKey::new(1, 3, TileFormat::Png);
        cache
            .get_or_populate_as(&key, CacheMode::ReadWrite, || Ok::<_, String>(vec![5]))
            .unwrap();
        assert!(cache.is_cached(&key));
        assert_eq!(cache.get(&key), Some(vec![5]));
    }

    #[test]
    fn test_populate_error_propagates_and_stores_nothing() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp, CacheMode::ReadWrite);
        let key = TileKey::new(2, 7, TileFormat::Jpeg);
        let result = cache.get_or_populate(&key, || Err::<Vec<u8>, _>("boom"));
        assert_eq!(result.unwrap_err(), "boom");
        assert!(!cache.is_cached(&key));
    }

    #[test]
    fn test_concurrent_same_key_populates_once() {
        let temp = TempDir::new().unwrap();
        let cache = Arc::new(cache(&temp, CacheMode::ReadWrite));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = TileKey::new(3, 42, TileFormat::Png);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    cache
                        .get_or_populate(&key, || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            Ok::<_, String>(vec![4, 2])
                        })
                        .unwrap()
                })
            })
            .collect();

        for h in handles {
            assert_eq!(h.join().unwrap().bytes, vec![4, 2]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct FailingStore;

    impl TileStore for FailingStore {
        fn load(&self, _key: &TileKey) -> Result<Option<Vec<u8>>, CacheError> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into())
        }
        fn store(&self, _key: &TileKey, _data: &[u8]) -> Result<(), CacheError> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into())
        }
        fn contains(&self, _key: &TileKey) -> bool {
            false
        }
    }

    #[test]
    fn test_io_failures_degrade_to_read_through() {
        let temp = TempDir::new().unwrap();
        let locker = TileLocker::new(temp.path(), temp.path(), Duration::from_secs(1));
        let cache = TileCache::new(Arc::new(FailingStore), locker, CacheMode::ReadWrite);
        let key = TileKey::new(0, 0, TileFormat::Png);
        let tile = cache
            .get_or_populate(&key, || Ok::<_, String>(vec![7]))
            .unwrap();
        assert_eq!(tile.bytes, vec![7]);
        assert_eq!(tile.origin, TileOrigin::Populated);
    }
}
