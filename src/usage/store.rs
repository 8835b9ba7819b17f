//! # Usage Store
//!
//! Durable mapping from [`LaunchableId`] to [`UsageRecord`], backed by one
//! JSON file (see [`super::schema`]).
//!
//! ## Concurrency
//!
//! Records live in an `Arc<BTreeMap>` behind a read/write lock. Writers
//! mutate copy-on-write under the write lock, so readers holding a
//! snapshot never observe a half-applied change and never wait on disk.
//!
//! Mutations are serialized by the file mutex, which also holds the last
//! map known to be on disk. A writer takes the file mutex, applies its
//! change, writes the new snapshot and only then lets the next writer in.
//! A call returns `Ok` once a file containing its change has been renamed
//! into place; when the write fails, the in-memory map is reset to the
//! last durable one, so a failed change never survives into a later write.
//!
//! ```text
//! upsert ──► file mutex ──► write lock: mutate map
//!                       ──► write snapshot ── ok ──► durable = snapshot
//!                                          └─ err ─► map = durable
//! ```
//!
//! ## Durability
//!
//! Each write goes to `<file>.tmp`, is optionally fsynced, then renamed over
//! the target, so a crash leaves either the old or the new document. Failed
//! writes are retried with exponential backoff; when retries run out the
//! in-memory change is rolled back and the error is returned.

use super::identity::LaunchableId;
use super::record::{now_millis, UsageRecord};
use super::schema::{self, DecodeError};
use crate::config::StorageConfig;
use crate::error::StoreError;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Records keyed by identity, in identity order.
pub type RecordMap = BTreeMap<LaunchableId, UsageRecord>;

/// Retry and durability settings for the usage file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
    pub fsync: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from(&StorageConfig::default())
    }
}

impl From<&StorageConfig> for StoreOptions {
    fn from(config: &StorageConfig) -> Self {
        Self {
            retry_attempts: config.retry_attempts.max(1),
            retry_backoff: config.retry_backoff(),
            fsync: config.fsync,
        }
    }
}

/// Read access to usage records, the seam the ranking engine depends on.
pub trait UsageSource: Send + Sync {
    /// A consistent view of every record.
    fn snapshot(&self) -> Result<Arc<RecordMap>, StoreError>;
}

#[derive(Debug)]
struct State {
    records: Arc<RecordMap>,
    closed: bool,
}

impl State {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

/// File-backed usage store.
#[derive(Debug)]
pub struct UsageStore {
    path: PathBuf,
    options: StoreOptions,
    state: RwLock<State>,
    /// Serializes mutations and file writes; holds the records on disk.
    durable: Mutex<Arc<RecordMap>>,
}

impl UsageStore {
    /// Open the store at `path`, creating it lazily on first write.
    ///
    /// Legacy layouts are migrated and rewritten immediately. A file that
    /// is not a usage document fails with [`StoreError::Corrupt`].
    pub fn open(path: impl Into<PathBuf>, options: StoreOptions) -> Result<Self, StoreError> {
        let path = path.into();
        let text = read_with_retry(&path, &options)?;

        let decoded = match text {
            Some(text) => schema::decode(&text).map_err(|e| match e {
                DecodeError::Malformed(reason) => StoreError::Corrupt {
                    path: path.clone(),
                    reason,
                },
                DecodeError::UnsupportedVersion(found) => StoreError::UnsupportedVersion {
                    path: path.clone(),
                    found,
                    supported: schema::CURRENT_VERSION,
                },
            })?,
            None => schema::Decoded {
                source_version: schema::CURRENT_VERSION,
                ..schema::Decoded::default()
            },
        };

        info!(
            path = %path.display(),
            records = decoded.records.len(),
            version = decoded.source_version,
            skipped = decoded.skipped,
            "opened usage store"
        );

        let needs_rewrite = decoded.needs_rewrite();
        let records = Arc::new(decoded.records);
        let store = Self {
            path,
            options,
            state: RwLock::new(State {
                records: Arc::clone(&records),
                closed: false,
            }),
            durable: Mutex::new(Arc::clone(&records)),
        };

        if needs_rewrite {
            info!(
                from = decoded.source_version,
                to = schema::CURRENT_VERSION,
                "rewriting usage file in the current layout"
            );
            store.write_snapshot(&records)?;
        }

        Ok(store)
    }

    /// Like [`UsageStore::open`], but a corrupt file is moved aside to
    /// `<file>.corrupt-<millis>` and the store starts empty.
    ///
    /// Files written by a newer schema are never moved; that error is
    /// returned as is.
    pub fn open_or_quarantine(
        path: impl Into<PathBuf>,
        options: StoreOptions,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        match Self::open(path.clone(), options.clone()) {
            Err(StoreError::Corrupt { reason, .. }) => {
                let quarantine = sibling(&path, &format!("corrupt-{}", now_millis()));
                warn!(
                    path = %path.display(),
                    moved_to = %quarantine.display(),
                    %reason,
                    "usage file is corrupt, starting with an empty store"
                );
                fs::rename(&path, &quarantine).map_err(|source| StoreError::Io {
                    path: path.clone(),
                    attempts: 1,
                    source,
                })?;
                Self::open(path, options)
            }
            other => other,
        }
    }

    /// Open a store, run `f` with it and close it again.
    pub fn scoped<T>(
        path: impl Into<PathBuf>,
        options: StoreOptions,
        f: impl FnOnce(&Arc<UsageStore>) -> T,
    ) -> Result<T, StoreError> {
        let store = Arc::new(Self::open(path, options)?);
        let result = f(&store);
        store.close();
        Ok(result)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting reads and writes. Every acknowledged write is
    /// already on disk, so there is nothing left to flush.
    pub fn close(&self) {
        let mut state = self.state.write();
        if !state.closed {
            state.closed = true;
            debug!(path = %self.path.display(), "closed usage store");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    /// Look up one record. An unknown identity is `Ok(None)`.
    pub fn get(&self, identity: &str) -> Result<Option<UsageRecord>, StoreError> {
        let state = self.state.read();
        state.ensure_open()?;
        Ok(state.records.get(identity).cloned())
    }

    /// Atomically read-modify-write the record for `identity`.
    ///
    /// `mutation` receives the current record (if any) and returns the
    /// replacement; `None` or a zero launch count deletes the record. The
    /// closure runs under the store's write lock, so keep it short and
    /// free of I/O. Returns the record as stored after the call.
    pub fn upsert<F>(
        &self,
        identity: &LaunchableId,
        mutation: F,
    ) -> Result<Option<UsageRecord>, StoreError>
    where
        F: FnOnce(Option<&UsageRecord>) -> Option<UsageRecord>,
    {
        let mut durable = self.durable.lock();
        let (next, snapshot) = {
            let mut state = self.state.write();
            state.ensure_open()?;

            let previous = state.records.get(identity).cloned();
            let next = mutation(previous.as_ref())
                .filter(|r| r.launch_count > 0)
                .map(|mut r| {
                    r.identity = identity.clone();
                    r
                });

            // Every earlier write has settled while we hold the file mutex,
            // so `previous` is already on disk.
            if next == previous {
                return Ok(next);
            }

            let records = Arc::make_mut(&mut state.records);
            match &next {
                Some(record) => {
                    records.insert(identity.clone(), record.clone());
                }
                None => {
                    records.remove(identity);
                }
            }
            (next, Arc::clone(&state.records))
        };

        self.persist(&mut durable, snapshot)?;
        Ok(next)
    }

    /// Delete a record. Returns whether one existed; deleting an unknown
    /// identity is a successful no-op.
    pub fn delete(&self, identity: &LaunchableId) -> Result<bool, StoreError> {
        let mut existed = false;
        self.upsert(identity, |current| {
            existed = current.is_some();
            None
        })?;
        Ok(existed)
    }

    /// Remove every record for which `keep` returns `false`, in one write.
    /// Returns the removed records.
    pub fn retain<F>(&self, mut keep: F) -> Result<Vec<UsageRecord>, StoreError>
    where
        F: FnMut(&UsageRecord) -> bool,
    {
        let mut durable = self.durable.lock();
        let (removed, snapshot) = {
            let mut state = self.state.write();
            state.ensure_open()?;

            let doomed: Vec<LaunchableId> = state
                .records
                .values()
                .filter(|r| !keep(r))
                .map(|r| r.identity.clone())
                .collect();

            if doomed.is_empty() {
                return Ok(Vec::new());
            }

            let records = Arc::make_mut(&mut state.records);
            let removed: Vec<UsageRecord> =
                doomed.iter().filter_map(|id| records.remove(id)).collect();
            (removed, Arc::clone(&state.records))
        };

        self.persist(&mut durable, snapshot)?;
        Ok(removed)
    }

    /// Iterate over a snapshot of every record in identity order.
    ///
    /// The snapshot is taken once; writes made while iterating are not
    /// visible to this scan.
    pub fn scan_all(&self) -> Result<Scan, StoreError> {
        Ok(Scan {
            snapshot: self.snapshot()?,
            cursor: None,
        })
    }

    /// Write `snapshot` while the caller holds the file mutex. On failure
    /// the in-memory records go back to the last durable map.
    fn persist(
        &self,
        durable: &mut Arc<RecordMap>,
        snapshot: Arc<RecordMap>,
    ) -> Result<(), StoreError> {
        match self.write_snapshot(&snapshot) {
            Ok(()) => {
                debug!(records = snapshot.len(), "persisted usage store");
                *durable = snapshot;
                Ok(())
            }
            Err(e) => {
                self.state.write().records = Arc::clone(durable);
                Err(e)
            }
        }
    }

    fn write_snapshot(&self, records: &RecordMap) -> Result<(), StoreError> {
        let bytes = schema::encode(records.values()).map_err(|e| StoreError::Io {
            path: self.path.clone(),
            attempts: 1,
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;

        with_retry(&self.path, &self.options, "write usage file", || {
            write_atomically(&self.path, &bytes, self.options.fsync)
        })
    }
}

impl UsageSource for UsageStore {
    fn snapshot(&self) -> Result<Arc<RecordMap>, StoreError> {
        let state = self.state.read();
        state.ensure_open()?;
        Ok(Arc::clone(&state.records))
    }
}

impl Drop for UsageStore {
    fn drop(&mut self) {
        self.close();
    }
}

/// Lazy, single-pass iterator returned by [`UsageStore::scan_all`].
#[derive(Debug)]
pub struct Scan {
    snapshot: Arc<RecordMap>,
    cursor: Option<LaunchableId>,
}

impl Iterator for Scan {
    type Item = UsageRecord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match &self.cursor {
                None => self.snapshot.values().next(),
                Some(last) => self
                    .snapshot
                    .range::<LaunchableId, _>((Bound::Excluded(last), Bound::Unbounded))
                    .next()
                    .map(|(_, record)| record),
            }?;
            self.cursor = Some(record.identity.clone());

            match record.check() {
                Ok(()) => return Some(record.clone()),
                Err(reason) => {
                    warn!(identity = %record.identity, %reason, "skipping corrupt usage record");
                }
            }
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn write_atomically(path: &Path, bytes: &[u8], fsync: bool) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp = sibling(path, "tmp");
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)?;
        file.write_all(bytes)?;
        if fsync {
            file.sync_all()?;
        }
    }

    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }

    if fsync {
        // Make the rename itself durable where directories can be synced.
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
    }

    Ok(())
}

fn read_with_retry(path: &Path, options: &StoreOptions) -> Result<Option<String>, StoreError> {
    with_retry(path, options, "read usage file", || {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    })
}

fn with_retry<T>(
    path: &Path,
    options: &StoreOptions,
    operation: &str,
    mut attempt: impl FnMut() -> io::Result<T>,
) -> Result<T, StoreError> {
    let attempts = options.retry_attempts.max(1);
    let mut backoff = options.retry_backoff;

    for n in 1..=attempts {
        match attempt() {
            Ok(value) => return Ok(value),
            Err(source) if n == attempts => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    attempts,
                    source,
                });
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    attempt = n,
                    of = attempts,
                    error = %e,
                    "{operation} failed, retrying"
                );
                std::thread::sleep(backoff);
                backoff = backoff.saturating_mul(2);
            }
        }
    }

    unreachable!("retry loop always returns")
}
