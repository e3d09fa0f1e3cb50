// src/config/validate.rs

use crate::config::model::MirrorConfig;
use crate::errors::{MirrorError, Result};
use crate::mirror::IgnoreSpec;

/// Check that a resolved configuration can be run. Every failure is a
/// `ConfigError` and happens before any work is done.
pub fn validate(cfg: &MirrorConfig) -> Result<()> {
    validate_directories(cfg)?;
    validate_extensions(cfg)?;
    validate_execute(cfg)?;
    validate_patterns(cfg)?;

    if cfg.concurrency == 0 {
        return Err(MirrorError::ConfigError(
            "concurrency must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_directories(cfg: &MirrorConfig) -> Result<()> {
    if !cfg.source_dir.exists() {
        return Err(MirrorError::ConfigError(format!(
            "source directory {:?} does not exist",
            cfg.source_dir
        )));
    }
    if !cfg.source_dir.is_dir() {
        return Err(MirrorError::ConfigError(format!(
            "source {:?} is not a directory",
            cfg.source_dir
        )));
    }
    if cfg.output_dir == cfg.source_dir {
        return Err(MirrorError::ConfigError(
            "output directory must differ from the source directory".to_string(),
        ));
    }
    if cfg.source_dir.starts_with(&cfg.output_dir) {
        return Err(MirrorError::ConfigError(format!(
            "output directory {:?} must not contain the source directory",
            cfg.output_dir
        )));
    }
    Ok(())
}

fn validate_extensions(cfg: &MirrorConfig) -> Result<()> {
    if cfg.extensions.is_empty() {
        return Err(MirrorError::ConfigError(
            "at least one extension is required".to_string(),
        ));
    }
    for ext in cfg.extensions.iter().chain(cfg.output_extension.iter()) {
        check_extension(ext)?;
    }
    for (from, to) in cfg.extension_map.iter() {
        if !cfg.extensions.contains(from) {
            return Err(MirrorError::ConfigError(format!(
                "[extension_map] entry '{}' is not one of the configured extensions",
                from
            )));
        }
        check_extension(to)?;
    }
    Ok(())
}

fn check_extension(ext: &str) -> Result<()> {
    if !ext.starts_with('.') || ext.len() < 2 || ext.contains('/') {
        return Err(MirrorError::ConfigError(format!(
            "invalid extension '{}' (expected something like \".js\")",
            ext
        )));
    }
    Ok(())
}

fn validate_execute(cfg: &MirrorConfig) -> Result<()> {
    if cfg.execute.is_some() && !cfg.watch {
        return Err(MirrorError::ConfigError(
            "--execute requires --watch".to_string(),
        ));
    }
    Ok(())
}

fn validate_patterns(cfg: &MirrorConfig) -> Result<()> {
    for (name, patterns) in [
        ("ignored", &cfg.ignored),
        ("ignored_for_restart", &cfg.ignored_for_restart),
    ] {
        IgnoreSpec::new(patterns)
            .map_err(|e| MirrorError::ConfigError(format!("invalid `{name}` pattern: {e:#}")))?;
    }
    Ok(())
}
