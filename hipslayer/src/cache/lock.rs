//! Per-key exclusive locks spanning threads and processes.
//!
//! A lock is held in two places at once:
//!
//! 1. An in-process slot (flag + condvar) registered in a `DashMap`, so
//!    threads of one process block without polling.
//! 2. A lock file created with `create_new`, so independently running
//!    processes (a server and a seeding job) exclude each other.
//!
//! Lock files older than the timeout are considered abandoned and removed.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::CacheError;

/// Default bound on lock waits and lock hold time.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between lock-file creation attempts.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Default)]
struct LockSlot {
    held: Mutex<bool>,
    released: Condvar,
}

/// Issues [`TileLock`]s for one cache namespace.
pub struct TileLocker {
    lock_dir: PathBuf,
    namespace: String,
    timeout: Duration,
    slots: DashMap<String, Arc<LockSlot>>,
}

impl TileLocker {
    /// Creates a locker writing lock files into `lock_dir`.
    ///
    /// # Arguments
    ///
    /// * `lock_dir` - Directory shared by every process using the cache
    /// * `scope` - Identifies the cache (usually its root directory); lock
    ///   files of different caches never collide
    /// * `timeout` - Maximum wait for a lock, and age after which a lock
    ///   file is treated as abandoned
    pub fn new(lock_dir: impl Into<PathBuf>, scope: &Path, timeout: Duration) -> Self {
        let digest = Sha256::digest(scope.to_string_lossy().as_bytes());
        let namespace = digest
            .iter()
            .take(8)
            .map(|b| format!("{:02x}", b))
            .collect();
        Self {
            lock_dir: lock_dir.into(),
            namespace,
            timeout,
            slots: DashMap::new(),
        }
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.lock_dir
            .join(format!("{}-{}.lck", self.namespace, name))
    }

    /// Acquires the exclusive lock for `name`, waiting at most the timeout.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::LockTimeout` when the lock stays busy and
    /// `CacheError::Io` when the lock file cannot be created.
    pub fn lock(&self, name: &str) -> Result<TileLock<'_>, CacheError> {
        let deadline = Instant::now() + self.timeout;
        let slot = self
            .slots
            .entry(name.to_string())
            .or_default()
            .value()
            .clone();

        // From here on the guard owns the slot reference and cleans up on
        // every exit path.
        let mut lock = TileLock {
            locker: self,
            name: name.to_string(),
            slot,
            slot_held: false,
            file: None,
        };

        {
            let mut held = lock.slot.held.lock();
            while *held {
                if lock.slot.released.wait_until(&mut held, deadline).timed_out() && *held {
                    return Err(self.timeout_error(name));
                }
            }
            *held = true;
        }
        lock.slot_held = true;

        let path = self.lock_path(name);
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let _ = write!(file, "{}", std::process::id());
                    lock.file = Some(path);
                    return Ok(lock);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(&path, self.timeout) {
                        warn!(lock = %path.display(), "Removing stale tile lock");
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(self.timeout_error(name));
                    }
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    fs::create_dir_all(&self.lock_dir)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn timeout_error(&self, name: &str) -> CacheError {
        CacheError::LockTimeout {
            name: name.to_string(),
            timeout: self.timeout,
        }
    }

    /// Number of keys with a registered in-process slot.
    pub fn active_slots(&self) -> usize {
        self.slots.len()
    }
}

fn is_stale(path: &Path, timeout: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|modified| {
            SystemTime::now()
                .duration_since(modified)
                .map(|age| age > timeout)
                .unwrap_or(false)
        })
        .unwrap_or(false)
}

/// Exclusive lock on one key; released on drop.
pub struct TileLock<'a> {
    locker: &'a TileLocker,
    name: String,
    slot: Arc<LockSlot>,
    slot_held: bool,
    file: Option<PathBuf>,
}

impl TileLock<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for TileLock<'_> {
    fn drop(&mut self) {
        if let Some(path) = self.file.take() {
            if let Err(e) = fs::remove_file(&path) {
                debug!(error = %e, lock = %path.display(), "Failed to remove tile lock file");
            }
        }
        if self.slot_held {
            *self.slot.held.lock() = false;
            self.slot.released.notify_all();
        }
        // Drop the registry entry once no other caller references it.
        let slot = std::mem::take(&mut self.slot);
        drop(slot);
        self.locker
            .slots
            .remove_if(&self.name, |_, s| Arc::strong_count(s) == 1);
    }
}
