// src/mirror/mod.rs

//! Source tree → output tree mirroring.
//!
//! - [`mapping`] turns source file names into output file names.
//! - [`ignore`] decides which entries are excluded entirely.
//! - [`sync`] walks a source directory, deletes orphaned output entries and
//!   hands every file that should be transformed to a callback.
//!
//! Nothing here transforms file contents or knows about the cache; callers
//! decide what to do with each [`FileJob`].

use std::path::PathBuf;

use crate::fs::EntryStats;

pub mod ignore;
pub mod mapping;
pub mod sync;

pub use ignore::IgnoreSpec;
pub use mapping::{sidecar_name, sidecar_path, OutputMapping};
pub use sync::{MirrorOptions, Synchronizer};

/// One entry of a source directory listing. Never persisted.
#[derive(Debug, Clone)]
pub struct SourceEntry {
    pub path: PathBuf,
    pub name: String,
    pub stats: EntryStats,
}

/// A source file the synchronizer wants transformed.
#[derive(Debug, Clone)]
pub struct FileJob {
    pub source: PathBuf,
    pub output: PathBuf,
    pub stats: EntryStats,
}

/// A per-entry failure that did not abort the pass.
#[derive(Debug, Clone)]
pub struct SyncFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Summary of a synchronization pass.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Files handed to the callback.
    pub files_visited: usize,
    /// Output entries removed because nothing in the source maps onto them.
    pub deleted: Vec<PathBuf>,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn fail(&mut self, path: impl Into<PathBuf>, error: impl ToString) {
        self.failures.push(SyncFailure {
            path: path.into(),
            error: error.to_string(),
        });
    }
}
