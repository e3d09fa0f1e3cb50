// src/watch/event_handler.rs

//! Turns filesystem changes into pipeline work and restart signals.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{EventKind, ModifyKind};
use tracing::{debug, warn};

use crate::engine::Pipeline;
use crate::exec::SupervisorHandle;
use crate::fs::is_not_found;
use crate::mirror::IgnoreSpec;
use crate::watch::path_utils::rebase_onto;

/// What a changed path turned out to be when we looked at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    /// A file was added or changed; a transform was enqueued.
    Transform(PathBuf),
    /// A directory appeared; its subtree was mirrored.
    MirrorDir(PathBuf),
    /// The path is gone; its output was removed.
    Remove(PathBuf),
    /// A changed file outside the extension allow-list.
    Unmapped(PathBuf),
    /// Nothing to do (ignored, symlink, outside the tree, ...).
    Skip,
}

/// Event kinds that can change what the output tree should contain.
pub fn is_relevant(kind: &EventKind) -> bool {
    !matches!(
        kind,
        EventKind::Access(_) | EventKind::Modify(ModifyKind::Metadata(_))
    )
}

/// Handles one path at a time. Cheap to clone.
#[derive(Debug, Clone)]
pub struct WatchHandler {
    pipeline: Pipeline,
    supervisor: Option<SupervisorHandle>,
    restart_ignore: Arc<IgnoreSpec>,
}

impl WatchHandler {
    pub fn new(
        pipeline: Pipeline,
        supervisor: Option<SupervisorHandle>,
        restart_ignore: IgnoreSpec,
    ) -> Self {
        Self {
            pipeline,
            supervisor,
            restart_ignore: Arc::new(restart_ignore),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// React to a change of `path`.
    ///
    /// The event kind is not trusted; instead the path is looked at now
    /// (without following symlinks). A file is transformed, a directory is
    /// mirrored, a missing path has its output removed.
    pub async fn handle_path(&self, path: &Path) -> WatchAction {
        let source_dir = self.pipeline.source_dir();
        let Some(path) = rebase_onto(source_dir, path) else {
            debug!(path = ?path, "event outside the source tree");
            return WatchAction::Skip;
        };
        if path == source_dir || path.starts_with(self.pipeline.output_dir()) {
            return WatchAction::Skip;
        }
        let ignore = self.pipeline.synchronizer().ignore();
        if ignore.matches_within(self.pipeline.root(), source_dir, &path) {
            debug!(path = ?path, "ignored");
            return WatchAction::Skip;
        }

        match self.pipeline.fs().symlink_metadata(&path) {
            Ok(stats) if stats.is_file() => self.on_file(path),
            Ok(stats) if stats.is_dir() => self.on_dir(path).await,
            Ok(_) => {
                debug!(path = ?path, "not a regular file or directory");
                WatchAction::Skip
            }
            Err(err) if is_not_found(&err) => self.on_removed(path).await,
            Err(err) => {
                warn!(path = ?path, error = %err, "failed to inspect changed path");
                WatchAction::Skip
            }
        }
    }

    fn on_file(&self, path: PathBuf) -> WatchAction {
        let allowed = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| self.pipeline.mapping().is_allowed(name));

        if !allowed {
            // Not ours to transform, but the program may still read it.
            self.signal_restart(&path);
            return WatchAction::Unmapped(path);
        }

        let task = self.pipeline.enqueue_file(path.clone());
        debug!(task = task.label(), "transform queued");
        let this = self.clone();
        let settled = path.clone();
        tokio::spawn(async move {
            // Failures are already logged by the queue; restart either way.
            let _ = task.join().await;
            this.signal_restart(&settled);
        });
        WatchAction::Transform(path)
    }

    async fn on_dir(&self, path: PathBuf) -> WatchAction {
        match self.pipeline.mirror_subtree(&path).await {
            Ok(report) => {
                if report.files_visited > 0 {
                    self.pipeline.wait_idle().await;
                    self.signal_restart(&path);
                }
            }
            Err(err) => warn!(dir = ?path, error = %err, "failed to mirror new directory"),
        }
        WatchAction::MirrorDir(path)
    }

    async fn on_removed(&self, path: PathBuf) -> WatchAction {
        if let Err(err) = self.pipeline.remove_output(&path).await {
            warn!(source = ?path, error = %err, "failed to remove output");
        }
        WatchAction::Remove(path)
    }

    fn signal_restart(&self, path: &Path) {
        let Some(supervisor) = &self.supervisor else {
            return;
        };
        if self
            .restart_ignore
            .matches(self.pipeline.root(), path)
        {
            debug!(path = ?path, "change does not trigger a restart");
            return;
        }
        supervisor.signal();
    }
}
