// src/engine/pipeline.rs

//! Per-file work shared by the full pass and the watcher.
//!
//! The full pass asks the synchronizer for every candidate file and enqueues
//! the stale ones; watch events call [`Pipeline::enqueue_file`],
//! [`Pipeline::remove_output`] or [`Pipeline::mirror_subtree`] directly. Both
//! paths go through the same [`OutputMapping`], cache and queue.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{anyhow, Context};
use tracing::{debug, info};

use crate::cache::{file_key, fingerprint, StalenessCache};
use crate::config::MirrorConfig;
use crate::engine::queue::{TaskHandle, TransformQueue};
use crate::errors::{MirrorError, Result};
use crate::fs::{is_not_found, FileSystem};
use crate::mirror::{sidecar_name, sidecar_path, FileJob, OutputMapping, Synchronizer, SyncReport};
use crate::transform::{TransformOptions, Transformer};
use crate::types::{FingerprintPolicy, SourceMapMode};
use crate::watch::path_utils::relative_str;

/// Counts for the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub transformed: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} transformed, {} unchanged, {} deleted, {} failed",
            self.transformed, self.unchanged, self.deleted, self.failed
        )
    }
}

#[derive(Default)]
struct Counters {
    transformed: AtomicUsize,
    unchanged: AtomicUsize,
    deleted: AtomicUsize,
    sync_failures: AtomicUsize,
}

struct PipelineInner {
    fs: Arc<dyn FileSystem>,
    transformer: Arc<dyn Transformer>,
    cache: StalenessCache,
    queue: TransformQueue,
    sync: Synchronizer,
    source_dir: PathBuf,
    output_dir: PathBuf,
    root: PathBuf,
    fingerprint: FingerprintPolicy,
    options: TransformOptions,
    counters: Counters,
}

/// Cheap to clone; clones share the cache, queue and counters.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("source_dir", &self.inner.source_dir)
            .field("output_dir", &self.inner.output_dir)
            .field("sync", &self.inner.sync)
            .field("queue", &self.inner.queue)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(
        config: &MirrorConfig,
        fs: Arc<dyn FileSystem>,
        transformer: Arc<dyn Transformer>,
        cache: StalenessCache,
        queue: TransformQueue,
    ) -> Result<Self> {
        let ignore = config
            .ignore_spec()
            .map_err(|e| MirrorError::ConfigError(format!("{e:#}")))?;
        let sync = Synchronizer::new(
            Arc::clone(&fs),
            Arc::new(config.mapping()),
            Arc::new(ignore),
            config.mirror_options(),
        );

        Ok(Self {
            inner: Arc::new(PipelineInner {
                fs,
                transformer,
                cache,
                queue,
                sync,
                source_dir: config.source_dir.clone(),
                output_dir: config.output_dir.clone(),
                root: config.root.clone(),
                fingerprint: config.fingerprint,
                options: TransformOptions {
                    root: config.root.clone(),
                    source_maps: config.source_maps,
                },
                counters: Counters::default(),
            }),
        })
    }

    pub fn source_dir(&self) -> &Path {
        &self.inner.source_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.inner.output_dir
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn mapping(&self) -> &OutputMapping {
        self.inner.sync.mapping()
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.inner.sync
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.inner.fs
    }

    pub fn cache(&self) -> &StalenessCache {
        &self.inner.cache
    }

    /// Output path for a source path, using the shared mapping.
    pub fn output_for(&self, source: &Path) -> Option<PathBuf> {
        self.mapping()
            .output_for(&self.inner.source_dir, &self.inner.output_dir, source)
    }

    /// Counts accumulated so far.
    pub fn summary(&self) -> RunSummary {
        let counters = &self.inner.counters;
        RunSummary {
            transformed: counters.transformed.load(Ordering::SeqCst),
            unchanged: counters.unchanged.load(Ordering::SeqCst),
            deleted: counters.deleted.load(Ordering::SeqCst),
            failed: self.inner.queue.stats().failed
                + counters.sync_failures.load(Ordering::SeqCst),
        }
    }

    /// Synchronize the whole source tree and enqueue every stale file.
    ///
    /// Returns once the walk is done; transforms may still be running (see
    /// [`wait_idle`](Self::wait_idle)).
    pub async fn full_pass(&self) -> Result<SyncReport> {
        let source = self.inner.source_dir.clone();
        let output = self.inner.output_dir.clone();
        self.sync_blocking(source, output).await
    }

    /// Synchronize one subdirectory of the source tree, e.g. one that just
    /// appeared while watching.
    pub async fn mirror_subtree(&self, dir: &Path) -> Result<SyncReport> {
        let rel = dir.strip_prefix(&self.inner.source_dir).map_err(|_| {
            MirrorError::Other(anyhow!("{:?} is outside the source directory", dir))
        })?;
        let output = self.inner.output_dir.join(rel);
        self.sync_blocking(dir.to_path_buf(), output).await
    }

    async fn sync_blocking(&self, source: PathBuf, output: PathBuf) -> Result<SyncReport> {
        let this = self.clone();
        let report = tokio::task::spawn_blocking(move || {
            let scheduler = this.clone();
            this.inner
                .sync
                .synchronize(&source, &output, move |job| scheduler.schedule_if_stale(job))
        })
        .await
        .map_err(|e| MirrorError::Other(e.into()))??;

        let counters = &self.inner.counters;
        counters.deleted.fetch_add(report.deleted.len(), Ordering::SeqCst);
        counters
            .sync_failures
            .fetch_add(report.failures.len(), Ordering::SeqCst);
        Ok(report)
    }

    /// Enqueue `job` unless its output is up to date. Runs on the blocking
    /// pool during a walk.
    fn schedule_if_stale(&self, job: FileJob) -> anyhow::Result<()> {
        if self.is_up_to_date(&job)? {
            self.inner.counters.unchanged.fetch_add(1, Ordering::SeqCst);
            debug!(source = ?job.source, "unchanged");
            return Ok(());
        }
        self.enqueue_file(job.source);
        Ok(())
    }

    /// Up to date means: the output exists and the cached fingerprint equals
    /// the current one.
    fn is_up_to_date(&self, job: &FileJob) -> anyhow::Result<bool> {
        if !self.inner.fs.exists(&job.output) {
            return Ok(false);
        }
        let Some(cached) = self.inner.cache.get(&file_key(&job.source)) else {
            return Ok(false);
        };
        let current = fingerprint(
            self.inner.fs.as_ref(),
            &job.source,
            &job.stats,
            self.inner.fingerprint,
        )?;
        Ok(cached == current)
    }

    /// Transform `source` on the queue. The handle resolves to the written
    /// output path, or `None` when the file is not allow-listed.
    pub fn enqueue_file(&self, source: PathBuf) -> TaskHandle<Option<PathBuf>> {
        let label = self.display_path(&source);
        let this = self.clone();
        self.inner
            .queue
            .enqueue(label, async move { this.process_file(&source).await })
    }

    /// Read, transform and write one file, then record its fingerprint.
    ///
    /// The cache is only updated once the output (and its source map) are
    /// fully written.
    pub async fn process_file(&self, source: &Path) -> Result<Option<PathBuf>> {
        let Some(name) = source.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        if !self.mapping().is_allowed(name) {
            debug!(source = ?source, "extension not allow-listed; skipping");
            return Ok(None);
        }
        let output = self.output_for(source).ok_or_else(|| {
            MirrorError::Other(anyhow!("{:?} is outside the source directory", source))
        })?;

        let read = {
            let this = self.clone();
            let source = source.to_path_buf();
            tokio::task::spawn_blocking(move || this.read_source(&source))
                .await
                .map_err(|e| MirrorError::Other(e.into()))?
        };
        let (contents, fp, mode) = match read.map_err(MirrorError::from) {
            Ok(read) => read,
            // Deleted between the event and the transform; the unlink
            // event cleans up after it.
            Err(err) if err.is_not_found() => {
                debug!(source = ?source, "source vanished before transform; skipping");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let transformed = self
            .inner
            .transformer
            .transform(source, contents, &self.inner.options)
            .await?;

        {
            let this = self.clone();
            let output = output.clone();
            tokio::task::spawn_blocking(move || {
                this.write_output(&output, transformed.code, transformed.map, mode)
            })
            .await
            .map_err(|e| MirrorError::Other(e.into()))??;
        }

        info!(
            "{} -> {}",
            self.display_path(source),
            self.display_path(&output)
        );
        self.inner.cache.set(file_key(source), fp);
        self.inner.counters.transformed.fetch_add(1, Ordering::SeqCst);
        Ok(Some(output))
    }

    fn read_source(&self, source: &Path) -> anyhow::Result<(Vec<u8>, String, Option<u32>)> {
        let fs = self.inner.fs.as_ref();
        let stats = fs.metadata(source)?;
        let contents = fs.read(source)?;
        let fp = match self.inner.fingerprint {
            FingerprintPolicy::Content => crate::cache::content_fingerprint(&contents),
            policy => fingerprint(fs, source, &stats, policy)?,
        };
        Ok((contents, fp, stats.mode))
    }

    fn write_output(
        &self,
        output: &Path,
        mut code: Vec<u8>,
        map: Option<Vec<u8>>,
        mode: Option<u32>,
    ) -> anyhow::Result<()> {
        let fs = self.inner.fs.as_ref();
        self.ensure_no_symlinked_parent(output)?;

        if fs.is_dir(output) {
            fs.remove_all(output)
                .with_context(|| format!("replacing directory {:?} with a file", output))?;
        }

        let map = map.filter(|_| self.inner.options.source_maps == SourceMapMode::File);
        if let Some(map) = &map {
            let name = output
                .file_name()
                .and_then(|n| n.to_str())
                .map(sidecar_name)
                .unwrap_or_default();
            if !code.ends_with(b"\n") && !code.is_empty() {
                code.push(b'\n');
            }
            code.extend_from_slice(format!("//# sourceMappingURL={name}\n").as_bytes());
            fs.write(&sidecar_path(output), map)?;
        }

        fs.write(output, &code)?;
        if let Some(mode) = mode {
            fs.set_mode(output, mode)?;
        }
        Ok(())
    }

    /// Refuse to write through a symlinked directory below the output root.
    fn ensure_no_symlinked_parent(&self, output: &Path) -> anyhow::Result<()> {
        let Some(rel) = output
            .parent()
            .and_then(|parent| parent.strip_prefix(&self.inner.output_dir).ok())
        else {
            return Ok(());
        };
        let mut dir = self.inner.output_dir.clone();
        for component in rel.components() {
            dir.push(component);
            if matches!(self.inner.fs.symlink_metadata(&dir), Ok(stats) if stats.is_symlink()) {
                return Err(anyhow!(
                    "output directory {:?} is a symlink; not writing through it",
                    dir
                ));
            }
        }
        Ok(())
    }

    /// Delete whatever `source` (now gone) produced in the output tree.
    ///
    /// Best-effort: anything already missing is fine. Returns the removed
    /// paths.
    pub async fn remove_output(&self, source: &Path) -> Result<Vec<PathBuf>> {
        let this = self.clone();
        let source = source.to_path_buf();
        let removed = tokio::task::spawn_blocking(move || this.remove_output_blocking(&source))
            .await
            .map_err(|e| MirrorError::Other(e.into()))??;

        for path in &removed {
            info!("removed {}", self.display_path(path));
        }
        self.inner
            .counters
            .deleted
            .fetch_add(removed.len(), Ordering::SeqCst);
        Ok(removed)
    }

    fn remove_output_blocking(&self, source: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let fs = self.inner.fs.as_ref();
        let Ok(rel) = source.strip_prefix(&self.inner.source_dir) else {
            return Ok(Vec::new());
        };
        if rel.as_os_str().is_empty() {
            return Ok(Vec::new());
        }

        // Directories are mirrored under their own name.
        let unmapped = self.inner.output_dir.join(rel);
        if matches!(fs.symlink_metadata(&unmapped), Ok(stats) if stats.is_dir()) {
            return Ok(remove_if_present(fs, &unmapped)?.into_iter().collect());
        }

        let mut removed = Vec::new();
        if let Some(output) = self.output_for(source) {
            removed.extend(remove_if_present(fs, &output)?);
            removed.extend(remove_if_present(fs, &sidecar_path(&output))?);
        }
        Ok(removed)
    }

    /// Wait until every enqueued transform has settled.
    pub async fn wait_idle(&self) {
        self.inner.queue.wait_idle().await;
    }

    fn display_path(&self, path: &Path) -> String {
        relative_str(&self.inner.root, path).unwrap_or_else(|| path.display().to_string())
    }
}

fn remove_if_present(fs: &dyn FileSystem, path: &Path) -> anyhow::Result<Option<PathBuf>> {
    match fs.remove_all(path) {
        Ok(()) => Ok(Some(path.to_path_buf())),
        Err(err) if is_not_found(&err) => Ok(None),
        Err(err) => Err(err),
    }
}
