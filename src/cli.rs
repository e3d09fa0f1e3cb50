// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! Settings that can also come from `Transmirror.toml` are `Option`s (or
//! plain flags that only ever switch something on), so the loader can tell
//! "not passed" apart from "passed with the default value".

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use crate::types::{CacheStorageMode, FingerprintPolicy, SourceMapMode};

/// Command-line arguments for `transmirror`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "transmirror",
    version,
    about = "Mirror a source tree into an output tree, transforming changed files.",
    long_about = None
)]
pub struct CliArgs {
    /// Source directory to mirror.
    #[arg(value_name = "SOURCE")]
    pub source: Option<PathBuf>,

    /// Directory the transformed tree is written to.
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_directory: Option<PathBuf>,

    /// Project root: config file location, ignore-pattern base and working
    /// directory of the transformer and the executed program.
    ///
    /// Default: the current working directory.
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Keep running and re-transform files as they change.
    #[arg(short = 'w', long)]
    pub watch: bool,

    /// Glob of entries to leave out entirely (repeatable, or comma separated).
    #[arg(long, value_name = "GLOB", value_delimiter = ',', action = ArgAction::Append)]
    pub ignored: Vec<String>,

    /// Glob of files whose changes are transformed but don't restart the
    /// executed program.
    #[arg(long, value_name = "GLOB", value_delimiter = ',', action = ArgAction::Append)]
    pub ignored_for_restart: Vec<String>,

    /// Emit source maps: `true` (sidecar `.map` files), `false` or `inline`.
    #[arg(long, value_name = "MODE", num_args = 0..=1, default_missing_value = "true")]
    pub source_maps: Option<SourceMapMode>,

    /// Ignore the fingerprints of previous runs.
    #[arg(long)]
    pub reset_cache: bool,

    /// Never delete anything from the output directory.
    #[arg(long)]
    pub keep_extra_files: bool,

    /// Entry point to run, and restart whenever output changes (needs
    /// `--watch`).
    #[arg(short = 'x', long, value_name = "ENTRY")]
    pub execute: Option<PathBuf>,

    /// Quiet period in milliseconds before a restart.
    #[arg(long, value_name = "MS")]
    pub execute_delay: Option<u64>,

    /// File extensions to transform, comma separated (e.g. `.ts,.tsx`).
    #[arg(short = 'e', long, value_name = "EXTS", value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,

    /// Extension given to every transformed file (e.g. `.js`).
    #[arg(long, value_name = "EXT")]
    pub output_extension: Option<String>,

    /// Shell command that transforms one file from stdin to stdout.
    ///
    /// Without it, files are copied verbatim.
    #[arg(long, value_name = "CMD")]
    pub transform_command: Option<String>,

    /// Program used to run the entry point. Pass an empty string to run the
    /// entry point directly.
    #[arg(long, value_name = "PROGRAM")]
    pub runtime: Option<String>,

    /// Extra argument for the runtime, placed before the entry point
    /// (repeatable).
    #[arg(long = "runtime-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub runtime_args: Vec<String>,

    /// Maximum number of transforms running at once.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// How changes are detected: `content` or `mtime`.
    #[arg(long, value_name = "POLICY")]
    pub fingerprint: Option<FingerprintPolicy>,

    /// Directory holding the fingerprint cache.
    #[arg(long, value_name = "DIR")]
    pub cache_directory: Option<PathBuf>,

    /// Where fingerprints are kept: `file` or `memory`.
    #[arg(long, value_name = "MODE")]
    pub cache_storage: Option<CacheStorageMode>,

    /// Don't read `Transmirror.toml`.
    #[arg(long)]
    pub no_load_config: bool,

    /// Print the resolved configuration and exit.
    #[arg(long)]
    pub print_config: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TRANSMIRROR_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Arguments passed to the executed program.
    #[arg(last = true, value_name = "PROGRAM ARGS")]
    pub program_args: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
