// src/cache/mod.rs

//! Persistent staleness cache.
//!
//! Maps a source file key (hash of its absolute path) to the fingerprint it
//! had when it was last transformed successfully. Records are written only
//! after a transform completed, and flushed to storage with a trailing
//! debounce so a burst of `set` calls produces a single write.

pub mod fingerprint;
pub mod store;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::errors::{MirrorError, Result};
use crate::types::CacheStorageMode;

pub use fingerprint::{compute_file_hash, content_fingerprint, file_key, fingerprint};
pub use store::{
    cache_file_path, FileFingerprintStore, FingerprintStore, MemoryFingerprintStore,
    CACHE_NAMESPACE,
};

/// Default trailing window for coalescing flushes.
pub const DEFAULT_FLUSH_WINDOW: Duration = Duration::from_millis(1000);

struct CacheInner {
    records: Mutex<HashMap<String, String>>,
    store: Box<dyn FingerprintStore>,
    dirty: AtomicBool,
    flush_lock: tokio::sync::Mutex<()>,
}

impl CacheInner {
    fn records(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle to the staleness cache. Cheap to clone; all clones share state.
///
/// Must be created inside a Tokio runtime: opening spawns the background
/// flusher.
#[derive(Clone)]
pub struct StalenessCache {
    inner: Arc<CacheInner>,
    wake: Arc<Notify>,
}

impl std::fmt::Debug for StalenessCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StalenessCache")
            .field("records", &self.len())
            .field("location", &self.inner.store.location())
            .finish()
    }
}

impl StalenessCache {
    /// Open the cache for `identity_key`.
    ///
    /// - `reset = true` starts empty without reading storage; new records are
    ///   still persisted.
    /// - `CacheStorageMode::Memory` never touches the disk.
    pub fn open(
        identity_key: &str,
        reset: bool,
        cache_dir: &Path,
        mode: CacheStorageMode,
    ) -> Self {
        let store: Box<dyn FingerprintStore> = match mode {
            CacheStorageMode::File => {
                Box::new(FileFingerprintStore::for_identity(cache_dir, identity_key))
            }
            CacheStorageMode::Memory => Box::new(MemoryFingerprintStore::new()),
        };
        Self::with_store(store, reset, DEFAULT_FLUSH_WINDOW)
    }

    /// Open a cache on top of an explicit store.
    ///
    /// An unreadable or corrupt store is treated as empty.
    pub fn with_store(store: Box<dyn FingerprintStore>, reset: bool, window: Duration) -> Self {
        let records = if reset {
            info!("cache reset requested; ignoring stored fingerprints");
            HashMap::new()
        } else {
            match store.load() {
                Ok(records) => {
                    debug!(records = records.len(), location = ?store.location(), "loaded fingerprints");
                    records
                }
                Err(err) => {
                    warn!(error = %err, "failed to read cache; starting empty");
                    HashMap::new()
                }
            }
        };

        let inner = Arc::new(CacheInner {
            records: Mutex::new(records),
            store,
            dirty: AtomicBool::new(false),
            flush_lock: tokio::sync::Mutex::new(()),
        });
        let wake = Arc::new(Notify::new());

        spawn_flusher(Arc::downgrade(&inner), Arc::clone(&wake), window);

        Self { inner, wake }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.records().get(key).cloned()
    }

    /// Record a fingerprint and schedule a coalesced flush.
    pub fn set(&self, key: impl Into<String>, fingerprint: impl Into<String>) {
        self.inner.records().insert(key.into(), fingerprint.into());
        self.inner.dirty.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn len(&self) -> usize {
        self.inner.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write pending records now. A no-op when nothing changed since the
    /// last successful flush.
    pub async fn flush(&self) -> Result<()> {
        flush_inner(Arc::clone(&self.inner)).await
    }
}

async fn flush_inner(inner: Arc<CacheInner>) -> Result<()> {
    let _guard = inner.flush_lock.lock().await;

    if !inner.dirty.swap(false, Ordering::SeqCst) {
        return Ok(());
    }

    let snapshot = inner.records().clone();
    let task_inner = Arc::clone(&inner);
    let res = tokio::task::spawn_blocking(move || task_inner.store.save(&snapshot))
        .await
        .map_err(|e| MirrorError::Other(e.into()))
        .and_then(|res| res.map_err(MirrorError::from));

    if res.is_err() {
        // Keep the records dirty so the next flush retries them.
        inner.dirty.store(true, Ordering::SeqCst);
    }
    res
}

/// Background task: waits for a `set`, then for `window` without further
/// `set`s, then flushes. Exits once every cache handle is dropped.
fn spawn_flusher(inner: Weak<CacheInner>, wake: Arc<Notify>, window: Duration) {
    tokio::spawn(async move {
        loop {
            wake.notified().await;

            loop {
                tokio::select! {
                    _ = wake.notified() => continue,
                    _ = tokio::time::sleep(window) => break,
                }
            }

            let Some(inner) = inner.upgrade() else {
                break;
            };
            if let Err(err) = flush_inner(inner).await {
                warn!(error = %err, "failed to flush cache; will retry on next write");
            }
        }
        debug!("cache flusher finished");
    });
}
