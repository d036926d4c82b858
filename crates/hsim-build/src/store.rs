//! ---
//! hsim_section: "04-build-coordination"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Lock-guarded persistent build-record store."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::key::BuildKey;

/// Poll interval while waiting for the advisory lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result alias for record-store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The advisory lock could not be acquired within the bound.
    #[error("timed out after {waited_secs}s acquiring lock {}", lock_path.display())]
    LockTimeout {
        /// Companion lock-file path.
        lock_path: PathBuf,
        /// How long acquisition was attempted.
        waited_secs: u64,
    },
    /// Reading or writing the store file failed.
    #[error("record store io error at {}: {source}", path.display())]
    Io {
        /// Store or lock file involved.
        path: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },
    /// The store file holds malformed JSON.
    #[error("record store {} is corrupt: {source}", path.display())]
    Corrupt {
        /// Store file path.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

/// Lifecycle state of one build record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// No worker has claimed the key yet.
    #[default]
    Unknown,
    /// A worker is currently building the artifact.
    InProgress,
    /// The artifact is available at the recorded path.
    Finished,
}

/// Persistent record for one build key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Current lifecycle state.
    pub status: BuildStatus,
    /// Shared artifact path this key resolves to.
    pub artifact_path: PathBuf,
}

/// In-memory snapshot of the store, mutated inside the lock's critical
/// section and written back as a whole.
pub type RecordMap = IndexMap<BuildKey, BuildRecord>;

/// Mapping from build key to build record, persisted as a single JSON file
/// and guarded by a companion advisory lock file.
///
/// Both paths are constructor parameters so tests can inject a temporary
/// store; nothing here is derived from the environment. Every
/// decision-making read and every write happens inside [`RecordStore::with_lock`],
/// making check-and-set atomic with respect to other worker processes.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
}

impl RecordStore {
    /// Companion lock-file suffix.
    pub const LOCK_SUFFIX: &'static str = ".lock";

    /// Create a store handle for the given file, deriving the companion lock
    /// path by appending [`Self::LOCK_SUFFIX`].
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        let path = path.into();
        let mut lock_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        lock_name.push_str(Self::LOCK_SUFFIX);
        let lock_path = path.with_file_name(lock_name);
        Self {
            path,
            lock_path,
            lock_timeout,
        }
    }

    /// Store file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Companion lock-file path.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Reinitialize the store to an empty map. Called once per test session
    /// by the session coordinator.
    pub fn reset(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        self.write_snapshot(&RecordMap::new())?;
        debug!(store = %self.path.display(), "record store reset");
        Ok(())
    }

    /// Remove a stale lock file at session teardown. Missing files are fine.
    pub fn remove_stale_lock(&self) -> Result<()> {
        match fs::remove_file(&self.lock_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                path: self.lock_path.clone(),
                source,
            }),
        }
    }

    /// Run `f` inside the lock's critical section with the deserialized
    /// record map, then persist the (possibly mutated) map as a whole-file
    /// snapshot before releasing the lock.
    pub async fn with_lock<T>(&self, f: impl FnOnce(&mut RecordMap) -> T) -> Result<T> {
        let _guard = self.acquire_lock().await?;
        let mut records = self.read_snapshot()?;
        let result = f(&mut records);
        self.write_snapshot(&records)?;
        Ok(result)
    }

    async fn acquire_lock(&self) -> Result<LockGuard> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.lock_path)
            .map_err(|source| StoreError::Io {
                path: self.lock_path.clone(),
                source,
            })?;

        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(LockGuard { file }),
                Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                    if started.elapsed() >= self.lock_timeout {
                        warn!(lock = %self.lock_path.display(), "lock acquisition timed out");
                        return Err(StoreError::LockTimeout {
                            lock_path: self.lock_path.clone(),
                            waited_secs: started.elapsed().as_secs(),
                        });
                    }
                    tokio::time::sleep(LOCK_POLL_INTERVAL).await;
                }
                Err(source) => {
                    return Err(StoreError::Io {
                        path: self.lock_path.clone(),
                        source,
                    })
                }
            }
        }
    }

    fn read_snapshot(&self) -> Result<RecordMap> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(RecordMap::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_slice(&contents).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Whole-file snapshot write via temp file + rename, so a lock holder
    /// never observes a partially written store.
    fn write_snapshot(&self, records: &RecordMap) -> Result<()> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StoreError::Io {
                path: path.clone(),
                source,
            }
        };
        let tmp_path = self.path.with_extension("json.tmp");
        let payload = serde_json::to_vec_pretty(records).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&tmp_path, payload).map_err(io_err(&tmp_path))?;
        fs::rename(&tmp_path, &self.path).map_err(io_err(&self.path))?;
        Ok(())
    }
}

/// RAII guard releasing the advisory lock on drop.
struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            warn!(error = %err, "failed to release record-store lock");
        }
    }
}
