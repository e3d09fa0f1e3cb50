// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::exec::LaunchSpec;
use crate::mirror::{IgnoreSpec, MirrorOptions, OutputMapping};
use crate::types::{CacheStorageMode, FingerprintPolicy, SourceMapMode};

/// Name of the optional project config file, looked up in the root
/// directory.
pub const CONFIG_FILE_NAME: &str = "Transmirror.toml";

pub const DEFAULT_EXECUTE_DELAY_MS: u64 = 250;
pub const DEFAULT_RUNTIME: &str = "node";

/// Configuration as read from `Transmirror.toml`.
///
/// Every key is optional; a key that is set here is used unless the same
/// setting was passed on the command line. Relative paths are resolved
/// against the root directory.
///
/// ```toml
/// source = "src"
/// output_directory = "lib"
/// extensions = [".ts", ".tsx"]
/// output_extension = ".js"
/// ignored = ["**/__tests__/**"]
/// source_maps = true
/// transform_command = "esbuild --loader=ts"
///
/// [extension_map]
/// ".mts" = ".mjs"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub source: Option<PathBuf>,
    pub output_directory: Option<PathBuf>,
    pub watch: Option<bool>,
    pub ignored: Option<Vec<String>>,
    pub ignored_for_restart: Option<Vec<String>>,
    pub source_maps: Option<SourceMapMode>,
    pub reset_cache: Option<bool>,
    pub keep_extra_files: Option<bool>,
    pub execute: Option<PathBuf>,
    /// Milliseconds.
    pub execute_delay: Option<u64>,
    pub extensions: Option<Vec<String>>,
    pub output_extension: Option<String>,
    /// Per-extension output suffix, overriding `output_extension`.
    #[serde(default)]
    pub extension_map: BTreeMap<String, String>,
    pub transform_command: Option<String>,
    /// Program used to run `execute`. An empty string runs the entry point
    /// directly.
    pub runtime: Option<String>,
    pub runtime_args: Option<Vec<String>>,
    pub program_args: Option<Vec<String>>,
    pub concurrency: Option<usize>,
    pub fingerprint: Option<FingerprintPolicy>,
    pub cache_directory: Option<PathBuf>,
    pub cache_storage: Option<CacheStorageMode>,
}

/// Fully resolved configuration. All paths are absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    pub root: PathBuf,
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub watch: bool,
    pub ignored: Vec<String>,
    pub ignored_for_restart: Vec<String>,
    pub source_maps: SourceMapMode,
    pub reset_cache: bool,
    pub keep_extra_files: bool,
    pub execute: Option<PathBuf>,
    pub execute_delay: Duration,
    pub extensions: Vec<String>,
    pub output_extension: Option<String>,
    pub extension_map: BTreeMap<String, String>,
    pub transform_command: Option<String>,
    pub runtime: Option<String>,
    pub runtime_args: Vec<String>,
    pub program_args: Vec<String>,
    pub concurrency: usize,
    pub fingerprint: FingerprintPolicy,
    pub cache_directory: PathBuf,
    pub cache_storage: CacheStorageMode,
}

impl MirrorConfig {
    /// Configuration with every optional setting at its default.
    pub fn new(root: PathBuf, source_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            root,
            source_dir,
            output_dir,
            watch: false,
            ignored: Vec::new(),
            ignored_for_restart: Vec::new(),
            source_maps: SourceMapMode::default(),
            reset_cache: false,
            keep_extra_files: false,
            execute: None,
            execute_delay: Duration::from_millis(DEFAULT_EXECUTE_DELAY_MS),
            extensions: default_extensions(),
            output_extension: None,
            extension_map: BTreeMap::new(),
            transform_command: None,
            runtime: Some(DEFAULT_RUNTIME.to_string()),
            runtime_args: Vec::new(),
            program_args: Vec::new(),
            concurrency: default_concurrency(),
            fingerprint: FingerprintPolicy::default(),
            cache_directory: default_cache_directory(),
            cache_storage: CacheStorageMode::default(),
        }
    }

    pub fn mapping(&self) -> OutputMapping {
        OutputMapping::new(
            &self.extensions,
            self.output_extension.as_deref(),
            &self.extension_map,
        )
    }

    pub fn ignore_spec(&self) -> Result<IgnoreSpec> {
        IgnoreSpec::new(&self.ignored)
    }

    pub fn restart_ignore_spec(&self) -> Result<IgnoreSpec> {
        IgnoreSpec::new(&self.ignored_for_restart)
    }

    pub fn mirror_options(&self) -> MirrorOptions {
        MirrorOptions {
            root: self.root.clone(),
            keep_extra_files: self.keep_extra_files,
            source_maps: self.source_maps,
            output_root: self.output_dir.clone(),
        }
    }

    /// Identity of the cache file: one per source tree, output tree and
    /// output naming scheme.
    pub fn cache_identity(&self) -> String {
        format!(
            "{}|{}|{}",
            self.source_dir.display(),
            self.output_dir.display(),
            self.mapping().describe()
        )
    }

    pub fn output_inside_source(&self) -> bool {
        self.output_dir.starts_with(&self.source_dir)
    }

    /// What to run under supervision, if anything.
    pub fn launch_spec(&self) -> Option<LaunchSpec> {
        let entry = self.execute.as_ref()?;
        Some(LaunchSpec::new(
            self.runtime.as_deref(),
            &self.runtime_args,
            entry,
            &self.program_args,
            &self.root,
        ))
    }
}

pub fn default_extensions() -> Vec<String> {
    vec![".js".to_string()]
}

pub fn default_concurrency() -> usize {
    num_cpus::get().max(1)
}

/// Platform cache directory, or the temp directory where there is none.
pub fn default_cache_directory() -> PathBuf {
    dirs::cache_dir().unwrap_or_else(std::env::temp_dir)
}
