// src/cache/fingerprint.rs

use std::io::Read;
use std::path::Path;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use blake3::Hasher;

use crate::fs::{EntryStats, FileSystem};
use crate::types::FingerprintPolicy;

/// Compute the hash of a single file.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// blake3 hex digest of an arbitrary string.
pub fn hash_str(value: &str) -> String {
    blake3::hash(value.as_bytes()).to_hex().to_string()
}

/// Cache key for a source file: a hash of its absolute path, independent of
/// its contents.
pub fn file_key(source: &Path) -> String {
    hash_str(&source.to_string_lossy())
}

/// Fingerprint of already-read file contents.
pub fn content_fingerprint(contents: &[u8]) -> String {
    format!("blake3:{}", blake3::hash(contents).to_hex())
}

/// Fingerprint of a modification time.
pub fn mtime_fingerprint(stats: &EntryStats) -> Option<String> {
    let modified = stats.modified?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(format!(
        "mtime:{}.{:09}",
        since_epoch.as_secs(),
        since_epoch.subsec_nanos()
    ))
}

/// Current fingerprint of `path` under `policy`.
///
/// The two policies produce differently prefixed values, so switching policy
/// makes every record stale instead of comparing apples to oranges.
pub fn fingerprint(
    fs: &dyn FileSystem,
    path: &Path,
    stats: &EntryStats,
    policy: FingerprintPolicy,
) -> Result<String> {
    match policy {
        FingerprintPolicy::Content => {
            Ok(format!("blake3:{}", compute_file_hash(fs, path)?))
        }
        FingerprintPolicy::Mtime => mtime_fingerprint(stats)
            .with_context(|| format!("no modification time available for {:?}", path)),
    }
}
