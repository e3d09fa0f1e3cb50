// src/cache/store.rs

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::cache::fingerprint::hash_str;

/// Directory (below the cache directory) that holds all cache files.
pub const CACHE_NAMESPACE: &str = ".transmirror";

const HEADER: &str = "# transmirror fingerprints v1";

/// Where the cache for `identity_key` lives:
///
/// `<cache_dir>/.transmirror/cache-<blake3(identity_key)>`
pub fn cache_file_path(cache_dir: &Path, identity_key: &str) -> PathBuf {
    cache_dir
        .join(CACHE_NAMESPACE)
        .join(format!("cache-{}", hash_str(identity_key)))
}

/// Abstract storage for the whole fingerprint map.
///
/// Stores are read once and then rewritten wholesale on every flush; the
/// in-memory map in [`StalenessCache`](super::StalenessCache) is the source
/// of truth in between.
pub trait FingerprintStore: Send + Sync {
    fn load(&self) -> Result<HashMap<String, String>>;
    fn save(&self, records: &HashMap<String, String>) -> Result<()>;
    /// On-disk location, if any.
    fn location(&self) -> Option<&Path> {
        None
    }
}

/// Stores fingerprints in a single file.
pub struct FileFingerprintStore {
    path: PathBuf,
}

impl FileFingerprintStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store for `identity_key` below `cache_dir`.
    pub fn for_identity(cache_dir: &Path, identity_key: &str) -> Self {
        Self::new(cache_file_path(cache_dir, identity_key))
    }
}

impl FingerprintStore for FileFingerprintStore {
    fn load(&self) -> Result<HashMap<String, String>> {
        load_records(&self.path)
    }

    fn save(&self, records: &HashMap<String, String>) -> Result<()> {
        save_records(&self.path, records)?;
        debug!(path = ?self.path, records = records.len(), "flushed fingerprints (file)");
        Ok(())
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Stores fingerprints in memory only.
#[derive(Default)]
pub struct MemoryFingerprintStore {
    saved: Mutex<HashMap<String, String>>,
    saves: AtomicUsize,
}

impl MemoryFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `save` has been called.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Snapshot of the last saved map.
    pub fn saved(&self) -> HashMap<String, String> {
        self.saved
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl FingerprintStore for MemoryFingerprintStore {
    fn load(&self) -> Result<HashMap<String, String>> {
        Ok(self.saved())
    }

    fn save(&self, records: &HashMap<String, String>) -> Result<()> {
        let mut guard = self
            .saved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = records.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Load all records from `path`. A missing file is an empty map; a file
/// that doesn't look like ours is an error.
fn load_records(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let file = File::open(path).with_context(|| format!("opening cache file at {:?}", path))?;
    let reader = BufReader::new(file);

    let mut map = HashMap::new();
    let mut lines = reader.lines();

    match lines.next().transpose()? {
        Some(header) if header.trim() == HEADER => {}
        Some(_) => bail!("cache file {:?} has an unknown header", path),
        None => return Ok(map),
    }

    for (idx, line_res) in lines.enumerate() {
        let line = line_res?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match trimmed.split_once(char::is_whitespace) {
            Some((key, fingerprint)) if !fingerprint.trim().is_empty() => {
                map.insert(key.to_string(), fingerprint.trim().to_string());
            }
            _ => bail!("malformed cache record on line {} of {:?}", idx + 2, path),
        }
    }

    Ok(map)
}

/// Persist all records to `path`, replacing the file atomically.
fn save_records(path: &Path, map: &HashMap<String, String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating cache directory at {:?}", parent))?;
    }

    let tmp_path = path.with_extension("tmp");
    {
        let file = File::create(&tmp_path)
            .with_context(|| format!("creating cache file at {:?}", tmp_path))?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "{HEADER}")?;
        let mut entries: Vec<_> = map.iter().collect();
        entries.sort();
        for (key, fingerprint) in entries {
            writeln!(writer, "{} {}", key, fingerprint)?;
        }
        writer.flush()?;
    }

    fs::rename(&tmp_path, path)
        .with_context(|| format!("replacing cache file at {:?}", path))?;
    Ok(())
}
