// src/config/loader.rs

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::cli::CliArgs;
use crate::config::model::{FileConfig, MirrorConfig, CONFIG_FILE_NAME};
use crate::config::validate::validate;
use crate::errors::{MirrorError, Result};

/// Load a configuration file from a given path.
///
/// This only performs TOML deserialization; it does **not** check that the
/// settings make sense together. A file that fails to parse, or has keys we
/// don't know, is an error.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<FileConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: FileConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Resolve the effective configuration for this process.
pub fn resolve(args: &CliArgs) -> Result<MirrorConfig> {
    let cwd = std::env::current_dir()?;
    resolve_with(args, &cwd)
}

/// Resolve the effective configuration, taking relative CLI paths against
/// `cwd`.
///
/// - Precedence per setting: explicitly passed flag, then `Transmirror.toml`
///   in the root directory, then the built-in default.
/// - Relative paths from the config file are taken against the root.
/// - The result is validated; any problem is a `ConfigError`.
pub fn resolve_with(args: &CliArgs, cwd: &Path) -> Result<MirrorConfig> {
    let root = match &args.root {
        Some(root) => absolutize(cwd, root),
        None => cwd.to_path_buf(),
    };
    let root = canonicalize_lenient(&root);

    let file = if args.no_load_config {
        FileConfig::default()
    } else {
        let path = root.join(CONFIG_FILE_NAME);
        if path.is_file() {
            debug!(path = ?path, "loading config file");
            load_from_path(&path)?
        } else {
            FileConfig::default()
        }
    };

    let source = args
        .source
        .as_ref()
        .map(|p| absolutize(cwd, p))
        .or_else(|| file.source.as_ref().map(|p| absolutize(&root, p)))
        .ok_or_else(|| MirrorError::ConfigError("a source directory is required".to_string()))?;
    let output = args
        .output_directory
        .as_ref()
        .map(|p| absolutize(cwd, p))
        .or_else(|| file.output_directory.as_ref().map(|p| absolutize(&root, p)))
        .ok_or_else(|| {
            MirrorError::ConfigError(
                "an output directory is required (--output-directory)".to_string(),
            )
        })?;

    let mut cfg = MirrorConfig::new(
        root.clone(),
        canonicalize_lenient(&source),
        canonicalize_lenient(&output),
    );

    cfg.watch = args.watch || file.watch.unwrap_or(false);
    cfg.reset_cache = args.reset_cache || file.reset_cache.unwrap_or(false);
    cfg.keep_extra_files = args.keep_extra_files || file.keep_extra_files.unwrap_or(false);

    cfg.ignored = if args.ignored.is_empty() {
        file.ignored.unwrap_or_default()
    } else {
        args.ignored.clone()
    };
    cfg.ignored_for_restart = if args.ignored_for_restart.is_empty() {
        file.ignored_for_restart.unwrap_or_default()
    } else {
        args.ignored_for_restart.clone()
    };

    if let Some(mode) = args.source_maps.or(file.source_maps) {
        cfg.source_maps = mode;
    }
    cfg.execute = args
        .execute
        .as_ref()
        .map(|p| absolutize(cwd, p))
        .or_else(|| file.execute.as_ref().map(|p| absolutize(&root, p)));
    if let Some(ms) = args.execute_delay.or(file.execute_delay) {
        cfg.execute_delay = Duration::from_millis(ms);
    }
    if let Some(exts) = args.extensions.clone().or(file.extensions) {
        cfg.extensions = exts
            .into_iter()
            .map(|ext| ext.trim().to_string())
            .filter(|ext| !ext.is_empty())
            .collect();
    }
    cfg.output_extension = args.output_extension.clone().or(file.output_extension);
    cfg.extension_map = file.extension_map;
    cfg.transform_command = args
        .transform_command
        .clone()
        .or(file.transform_command)
        .filter(|cmd| !cmd.trim().is_empty());
    if let Some(runtime) = args.runtime.clone().or(file.runtime) {
        cfg.runtime = Some(runtime).filter(|r| !r.trim().is_empty());
    }
    cfg.runtime_args = if args.runtime_args.is_empty() {
        file.runtime_args.unwrap_or_default()
    } else {
        args.runtime_args.clone()
    };
    cfg.program_args = if args.program_args.is_empty() {
        file.program_args.unwrap_or_default()
    } else {
        args.program_args.clone()
    };
    if let Some(n) = args.concurrency.or(file.concurrency) {
        cfg.concurrency = n;
    }
    if let Some(policy) = args.fingerprint.or(file.fingerprint) {
        cfg.fingerprint = policy;
    }
    if let Some(dir) = args
        .cache_directory
        .as_ref()
        .map(|p| absolutize(cwd, p))
        .or_else(|| file.cache_directory.as_ref().map(|p| absolutize(&root, p)))
    {
        cfg.cache_directory = dir;
    }
    if let Some(mode) = args.cache_storage.or(file.cache_storage) {
        cfg.cache_storage = mode;
    }

    validate(&cfg)?;
    Ok(cfg)
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Canonicalize the longest existing prefix of `path` and append the rest.
///
/// Paths that don't exist yet (the output directory on a first run) still
/// end up in the same form as the canonicalized paths the watcher reports.
fn canonicalize_lenient(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut rest: Vec<PathBuf> = Vec::new();
    loop {
        if let Ok(canon) = existing.canonicalize() {
            return rest.iter().rev().fold(canon, |acc, part| acc.join(part));
        }
        let Some(name) = existing.file_name().map(PathBuf::from) else {
            break;
        };
        rest.push(name);
        if !existing.pop() {
            break;
        }
    }
    normalize(path)
}

/// Lexically drop `.` and resolve `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
