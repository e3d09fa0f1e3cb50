// src/mirror/sync.rs

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::fs::FileSystem;
use crate::mirror::{sidecar_name, FileJob, IgnoreSpec, OutputMapping, SourceEntry, SyncReport};
use crate::types::SourceMapMode;

/// Knobs of a synchronization pass that are not mapping or ignore rules.
#[derive(Debug, Clone)]
pub struct MirrorOptions {
    /// Root directory, used for root-relative ignore matching.
    pub root: PathBuf,
    /// Never delete anything from the output tree.
    pub keep_extra_files: bool,
    /// Decides whether `.map` sidecars are protected from deletion.
    pub source_maps: SourceMapMode,
    /// Output root of the whole mirror. If it lives inside the source tree it
    /// is never walked.
    pub output_root: PathBuf,
}

/// Walks a source tree and keeps an output tree in step with it.
///
/// The walk uses an explicit stack of `(source dir, output dir)` pairs, so
/// tree depth never grows the call stack.
#[derive(Clone)]
pub struct Synchronizer {
    fs: Arc<dyn FileSystem>,
    mapping: Arc<OutputMapping>,
    ignore: Arc<IgnoreSpec>,
    options: Arc<MirrorOptions>,
}

impl fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronizer")
            .field("mapping", &self.mapping)
            .field("ignore", &self.ignore)
            .field("options", &self.options)
            .finish()
    }
}

impl Synchronizer {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        mapping: Arc<OutputMapping>,
        ignore: Arc<IgnoreSpec>,
        options: MirrorOptions,
    ) -> Self {
        Self {
            fs,
            mapping,
            ignore,
            options: Arc::new(options),
        }
    }

    pub fn mapping(&self) -> &OutputMapping {
        &self.mapping
    }

    pub fn ignore(&self) -> &IgnoreSpec {
        &self.ignore
    }

    /// Mirror `source_dir` into `output_dir`, calling `on_file` for every
    /// file that should be transformed.
    ///
    /// Only a failure to list `source_dir` itself is returned as an error.
    /// Everything below it (unreadable subdirectories, failed deletions,
    /// callback errors) is recorded in the report and the walk goes on.
    pub fn synchronize<F>(&self, source_dir: &Path, output_dir: &Path, mut on_file: F) -> Result<SyncReport>
    where
        F: FnMut(FileJob) -> Result<()>,
    {
        let mut report = SyncReport::default();
        let mut stack = vec![(source_dir.to_path_buf(), output_dir.to_path_buf())];
        let mut top_level = true;

        while let Some((src, out)) = stack.pop() {
            match self.sync_level(&src, &out, &mut on_file, &mut report) {
                Ok(subdirs) => {
                    // Reverse so subdirectories are visited in name order.
                    stack.extend(subdirs.into_iter().rev());
                }
                Err(err) if top_level => return Err(err),
                Err(err) => {
                    warn!(dir = ?src, error = %err, "failed to mirror directory");
                    report.fail(&src, format!("{err:#}"));
                }
            }
            top_level = false;
        }

        Ok(report)
    }

    /// Handle one directory level; returns the subdirectories to visit next.
    fn sync_level<F>(
        &self,
        src: &Path,
        out: &Path,
        on_file: &mut F,
        report: &mut SyncReport,
    ) -> Result<Vec<(PathBuf, PathBuf)>>
    where
        F: FnMut(FileJob) -> Result<()>,
    {
        let entries = self.list_source(src)?;

        let out_stats = if out == self.options.output_root {
            self.fs.metadata(out)
        } else {
            self.fs.symlink_metadata(out)
        };
        let mut out_exists = match out_stats {
            Ok(stats) if stats.is_symlink() => {
                // Anything behind it lives outside the output tree.
                warn!(path = ?out, "output directory is a symlink; not following it");
                report.fail(out, "output directory is a symlink");
                return Ok(Vec::new());
            }
            Ok(stats) if stats.is_dir() => true,
            Ok(_) => {
                info!(path = ?out, "output path is not a directory; removing it");
                self.fs
                    .remove_all(out)
                    .with_context(|| format!("removing non-directory output {:?}", out))?;
                false
            }
            Err(_) => false,
        };

        if out_exists && !self.options.keep_extra_files {
            self.delete_orphans(&entries, out, report);
        }

        let mut subdirs = Vec::new();
        for entry in entries {
            if entry.stats.is_symlink() {
                debug!(path = ?entry.path, "skipping symlink");
                continue;
            }
            if self.is_excluded(&entry.path) {
                debug!(path = ?entry.path, "skipping ignored entry");
                continue;
            }

            if entry.stats.is_file() {
                if !self.mapping.is_allowed(&entry.name) {
                    continue;
                }
                if !out_exists {
                    self.fs.create_dir_all(out)?;
                    out_exists = true;
                }
                let job = FileJob {
                    output: out.join(self.mapping.map_name(&entry.name)),
                    source: entry.path,
                    stats: entry.stats,
                };
                report.files_visited += 1;
                let source = job.source.clone();
                if let Err(err) = on_file(job) {
                    warn!(source = ?source, error = %err, "file callback failed");
                    report.fail(source, format!("{err:#}"));
                }
            } else if entry.stats.is_dir() {
                subdirs.push((entry.path, out.join(&entry.name)));
            }
        }

        Ok(subdirs)
    }

    fn list_source(&self, src: &Path) -> Result<Vec<SourceEntry>> {
        let mut entries = Vec::new();
        for path in self.fs.read_dir(src)? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                warn!(path = ?path, "skipping entry with non UTF-8 name");
                continue;
            };
            let stats = match self.fs.symlink_metadata(&path) {
                Ok(stats) => stats,
                Err(err) => {
                    // Deleted between listing and stat.
                    debug!(path = ?path, error = %err, "entry vanished during listing");
                    continue;
                }
            };
            entries.push(SourceEntry { path, name, stats });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        path == self.options.output_root || self.ignore.matches(&self.options.root, path)
    }

    /// Names in the output directory that must survive this pass.
    fn retention_whitelist(&self, entries: &[SourceEntry]) -> HashSet<String> {
        let mut keep = HashSet::new();
        for entry in entries {
            if entry.stats.is_symlink() {
                keep.insert(entry.name.clone());
                continue;
            }
            if self.is_excluded(&entry.path) {
                continue;
            }
            if entry.stats.is_dir() {
                keep.insert(entry.name.clone());
                continue;
            }
            let mapped = self.mapping.map_name(&entry.name);
            if self.options.source_maps.writes_sidecar() && self.mapping.is_allowed(&entry.name) {
                keep.insert(sidecar_name(&mapped));
            }
            keep.insert(mapped);
        }
        keep
    }

    fn delete_orphans(&self, entries: &[SourceEntry], out: &Path, report: &mut SyncReport) {
        let keep = self.retention_whitelist(entries);

        let mut existing = match self.fs.read_dir(out) {
            Ok(existing) => existing,
            Err(err) => {
                report.fail(out, format!("{err:#}"));
                return;
            }
        };
        existing.sort();

        for path in existing {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if keep.contains(name) {
                continue;
            }
            if matches!(self.fs.symlink_metadata(&path), Ok(stats) if stats.is_symlink()) {
                continue;
            }
            match self.fs.remove_all(&path) {
                Ok(()) => {
                    info!(path = ?path, "deleted stale output");
                    report.deleted.push(path);
                }
                Err(err) => {
                    warn!(path = ?path, error = %err, "failed to delete stale output");
                    report.fail(path, format!("{err:#}"));
                }
            }
        }
    }
}
