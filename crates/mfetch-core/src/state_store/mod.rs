//! Durable journal of download records, keyed by artifact id.
//!
//! The whole journal is a single JSON document rewritten atomically (sibling
//! temp file + rename) on every write. Writes arriving within the coalescing
//! window of the previous one are deferred and merged into the next write;
//! `put_now`, `delete` and `flush` always hit the disk.

mod record;

pub use record::{DownloadRecord, DownloadStatus, ACTIVE_FRACTION_CAP};

use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::storage;

/// Minimum spacing between coalesced journal writes.
pub const DEFAULT_COALESCE_INTERVAL: Duration = Duration::from_millis(200);

/// Suffix of the backup made when the journal cannot be parsed.
pub const BACKUP_SUFFIX: &str = ".bak";

/// `last_error_message` given to records found mid-download at load time.
pub const INTERRUPTED_MESSAGE: &str = "interrupted";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("persisting download state to {path} failed: {source}")]
    PersistenceFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("reading download state {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serializing download state: {0}")]
    Serialize(#[from] serde_json::Error),
}

struct StoreInner {
    records: BTreeMap<String, DownloadRecord>,
    last_write: Option<Instant>,
    dirty: bool,
}

/// Journal handle. One instance per state file per process.
pub struct StateStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    coalesce: Duration,
    inner: Mutex<StoreInner>,
}

impl StateStore {
    /// Load the journal at `path`.
    ///
    /// A missing file yields an empty store. An unparsable file is renamed to
    /// `<path>.bak` and the store starts empty. Records left in `downloading`
    /// by a previous process are rewritten to `paused` with
    /// `last_error_message = "interrupted"` before this returns.
    pub fn open(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = read_journal(&path)?;
        let store = Self {
            path,
            clock,
            coalesce: DEFAULT_COALESCE_INTERVAL,
            inner: Mutex::new(StoreInner {
                records,
                last_write: None,
                dirty: false,
            }),
        };
        store.recover_interrupted()?;
        Ok(store)
    }

    /// Override the coalescing window (0 disables coalescing).
    pub fn with_coalesce_interval(mut self, interval: Duration) -> Self {
        self.coalesce = interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, id: &str) -> Option<DownloadRecord> {
        self.lock().records.get(id).cloned()
    }

    /// Every artifact id with a record.
    pub fn ids(&self) -> Vec<String> {
        self.lock().records.keys().cloned().collect()
    }

    pub fn list_by_status(&self, status: DownloadStatus) -> Vec<String> {
        self.lock()
            .records
            .iter()
            .filter(|(_, r)| r.status == status)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Store a record, writing the journal unless the previous write was less
    /// than the coalescing window ago; in that case the write is deferred and
    /// merged into the next one.
    pub fn put(&self, id: &str, record: DownloadRecord) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.records.insert(id.to_string(), record);
        inner.dirty = true;
        let now = self.clock.now();
        let due = match inner.last_write {
            Some(last) => now.saturating_duration_since(last) >= self.coalesce,
            None => true,
        };
        if due {
            self.write_locked(&mut inner)?;
        }
        Ok(())
    }

    /// Store a record and write the journal immediately. If the write fails
    /// the record is rolled back, so the store keeps matching the last
    /// durable state for `id`.
    pub fn put_now(&self, id: &str, record: DownloadRecord) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let was_dirty = inner.dirty;
        let previous = inner.records.insert(id.to_string(), record);
        inner.dirty = true;
        if let Err(e) = self.write_locked(&mut inner) {
            match previous {
                Some(prev) => {
                    inner.records.insert(id.to_string(), prev);
                }
                None => {
                    inner.records.remove(id);
                }
            }
            inner.dirty = was_dirty;
            return Err(e);
        }
        Ok(())
    }

    /// Remove a record. Returns whether one existed.
    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let existed = inner.records.remove(id).is_some();
        if existed {
            inner.dirty = true;
            self.write_locked(&mut inner)?;
        }
        Ok(existed)
    }

    /// Write any deferred update.
    pub fn flush(&self) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.dirty {
            self.write_locked(&mut inner)?;
        }
        Ok(())
    }

    /// True when an update is waiting for the coalescing window.
    pub fn has_pending(&self) -> bool {
        self.lock().dirty
    }

    fn recover_interrupted(&self) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let now = self.clock.wall();
        let mut recovered = 0usize;
        for (id, rec) in inner.records.iter_mut() {
            if rec.status == DownloadStatus::Downloading {
                rec.status = DownloadStatus::Paused;
                rec.last_error_message = Some(INTERRUPTED_MESSAGE.to_string());
                rec.last_update_at = Some(now);
                recovered += 1;
                tracing::info!(artifact = %id, bytes = rec.current_file_downloaded_bytes, "interrupted download marked paused");
            }
        }
        if recovered > 0 {
            inner.dirty = true;
            self.write_locked(&mut inner)?;
        }
        Ok(())
    }

    fn write_locked(&self, inner: &mut StoreInner) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(&inner.records)?;
        storage::atomic_write(&self.path, &json).map_err(|source| StoreError::PersistenceFailed {
            path: self.path.clone(),
            source,
        })?;
        inner.dirty = false;
        inner.last_write = Some(self.clock.now());
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock()
    }
}

impl Drop for StateStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!("final download state flush failed: {}", e);
        }
    }
}

fn read_journal(path: &Path) -> Result<BTreeMap<String, DownloadRecord>, StoreError> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(records) => Ok(records),
        Err(e) => {
            let mut backup = path.as_os_str().to_owned();
            backup.push(BACKUP_SUFFIX);
            let backup = PathBuf::from(backup);
            tracing::warn!(
                path = %path.display(),
                backup = %backup.display(),
                "download state unreadable ({}), starting empty",
                e
            );
            std::fs::rename(path, &backup).map_err(|source| StoreError::PersistenceFailed {
                path: backup.clone(),
                source,
            })?;
            Ok(BTreeMap::new())
        }
    }
}
