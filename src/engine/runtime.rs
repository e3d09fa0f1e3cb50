// src/engine/runtime.rs

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::StalenessCache;
use crate::config::MirrorConfig;
use crate::errors::{MirrorError, Result};
use crate::exec::{spawn_stdin_reader, ProcessLauncher, Supervisor, SupervisorHandle};
use crate::fs::FileSystem;
use crate::transform::Transformer;
use crate::watch::{spawn_watcher, WatchHandler};

use super::pipeline::{Pipeline, RunSummary};
use super::queue::TransformQueue;

/// Ties configuration, pipeline, watcher and supervisor together.
///
/// All collaborators are injected, so tests can drive a whole run against
/// a fake transformer and launcher.
pub struct Mirror {
    config: Arc<MirrorConfig>,
    pipeline: Pipeline,
    launcher: Arc<dyn ProcessLauncher>,
}

impl fmt::Debug for Mirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mirror")
            .field("config", &self.config)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl Mirror {
    /// Open the cache and build the pipeline. Must run inside a Tokio
    /// runtime.
    pub fn new(
        config: MirrorConfig,
        fs: Arc<dyn FileSystem>,
        transformer: Arc<dyn Transformer>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Result<Self> {
        let cache = StalenessCache::open(
            &config.cache_identity(),
            config.reset_cache,
            &config.cache_directory,
            config.cache_storage,
        );
        let queue = TransformQueue::new(config.concurrency);
        debug!(concurrency = queue.limit(), "transform queue ready");
        let pipeline = Pipeline::new(&config, fs, transformer, cache, queue)?;

        Ok(Self {
            config: Arc::new(config),
            pipeline,
            launcher,
        })
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Full pass, wait for every transform, flush the cache.
    pub async fn run_once(&self) -> Result<RunSummary> {
        let summary = self.initial_pass().await?;
        self.flush_cache().await;
        Ok(summary)
    }

    /// Full pass, then keep the output in step with the source tree until
    /// `shutdown` resolves.
    ///
    /// With `read_stdin`, an `rs` line on stdin restarts the executed
    /// program.
    pub async fn run_watch<S>(&self, shutdown: S, read_stdin: bool) -> Result<RunSummary>
    where
        S: Future<Output = ()>,
    {
        self.initial_pass().await?;
        self.flush_cache().await;

        let supervisor = self.spawn_supervisor(read_stdin)?;

        let restart_ignore = self
            .config
            .restart_ignore_spec()
            .map_err(|e| MirrorError::ConfigError(format!("{e:#}")))?;
        let handler = WatchHandler::new(
            self.pipeline.clone(),
            supervisor.clone(),
            restart_ignore,
        );
        let watcher = spawn_watcher(&self.config.source_dir, handler)?;

        if let Some(supervisor) = &supervisor {
            supervisor.start();
        }

        shutdown.await;
        info!("shutting down");

        drop(watcher);
        if let Some(supervisor) = &supervisor {
            supervisor.shutdown().await;
        }
        self.pipeline.wait_idle().await;
        self.flush_cache().await;

        Ok(self.pipeline.summary())
    }

    async fn initial_pass(&self) -> Result<RunSummary> {
        info!(
            source = ?self.config.source_dir,
            output = ?self.config.output_dir,
            "mirroring"
        );
        let report = self.pipeline.full_pass().await?;
        for failure in &report.failures {
            warn!(path = ?failure.path, error = %failure.error, "failed to mirror entry");
        }
        self.pipeline.wait_idle().await;

        let summary = self.pipeline.summary();
        info!("{summary}");
        Ok(summary)
    }

    fn spawn_supervisor(&self, read_stdin: bool) -> Result<Option<SupervisorHandle>> {
        let Some(spec) = self.config.launch_spec() else {
            return Ok(None);
        };
        let (handle, _join) = Supervisor::spawn(
            spec,
            Arc::clone(&self.launcher),
            self.config.execute_delay,
        );
        if read_stdin {
            spawn_stdin_reader(handle.clone())?;
        }
        Ok(Some(handle))
    }

    async fn flush_cache(&self) {
        if let Err(err) = self.pipeline.cache().flush().await {
            warn!(error = %err, "failed to write cache");
        }
    }
}
