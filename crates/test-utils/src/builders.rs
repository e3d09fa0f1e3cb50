use std::path::{Path, PathBuf};
use std::time::Duration;

use transmirror::config::{validate, MirrorConfig};
use transmirror::types::{CacheStorageMode, FingerprintPolicy, SourceMapMode};

/// Builder for `MirrorConfig` to simplify test setup.
///
/// Starts from the defaults, except that the cache lives in memory and two
/// transforms run at once, so tests never touch the user's cache directory.
pub struct MirrorConfigBuilder {
    config: MirrorConfig,
}

impl MirrorConfigBuilder {
    /// `source` and `output` should be absolute; the root is the parent of
    /// `source`.
    pub fn new(source: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        let source = source.into();
        let root = source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| source.clone());
        let mut config = MirrorConfig::new(root, source, output.into());
        config.cache_storage = CacheStorageMode::Memory;
        config.concurrency = 2;
        Self { config }
    }

    pub fn extensions(mut self, exts: &[&str]) -> Self {
        self.config.extensions = exts.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn output_extension(mut self, ext: &str) -> Self {
        self.config.output_extension = Some(ext.to_string());
        self
    }

    pub fn map_extension(mut self, from: &str, to: &str) -> Self {
        self.config
            .extension_map
            .insert(from.to_string(), to.to_string());
        self
    }

    pub fn ignored(mut self, pattern: &str) -> Self {
        self.config.ignored.push(pattern.to_string());
        self
    }

    pub fn ignored_for_restart(mut self, pattern: &str) -> Self {
        self.config.ignored_for_restart.push(pattern.to_string());
        self
    }

    pub fn keep_extra_files(mut self, val: bool) -> Self {
        self.config.keep_extra_files = val;
        self
    }

    pub fn source_maps(mut self, mode: SourceMapMode) -> Self {
        self.config.source_maps = mode;
        self
    }

    pub fn fingerprint(mut self, policy: FingerprintPolicy) -> Self {
        self.config.fingerprint = policy;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    /// Persist the cache to files below `dir`.
    pub fn cache_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_directory = dir.into();
        self.config.cache_storage = CacheStorageMode::File;
        self
    }

    pub fn reset_cache(mut self, val: bool) -> Self {
        self.config.reset_cache = val;
        self
    }

    pub fn watch(mut self, val: bool) -> Self {
        self.config.watch = val;
        self
    }

    /// Run `entry` directly (no runtime) under supervision. Implies watch.
    pub fn execute(mut self, entry: impl Into<PathBuf>) -> Self {
        self.config.execute = Some(entry.into());
        self.config.runtime = None;
        self.config.watch = true;
        self
    }

    pub fn execute_delay(mut self, delay: Duration) -> Self {
        self.config.execute_delay = delay;
        self
    }

    pub fn build(self) -> MirrorConfig {
        validate(&self.config).expect("Failed to build valid config from builder");
        self.config
    }
}
