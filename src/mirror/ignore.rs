// src/mirror/ignore.rs

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::watch::path_utils::to_slash;

/// Compiled set of ignore globs.
///
/// An entry is tested three ways: its bare file name, its absolute path and
/// its path relative to the project root. Any hit excludes it. This lets
/// users write `node_modules`, `/abs/src/gen/**` or `src/**/*.test.js` and
/// have all of them behave as expected.
///
/// `*` does not cross `/`; use `**` for that.
#[derive(Clone)]
pub struct IgnoreSpec {
    patterns: Vec<String>,
    set: Option<GlobSet>,
}

impl fmt::Debug for IgnoreSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IgnoreSpec")
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

impl Default for IgnoreSpec {
    fn default() -> Self {
        Self::empty()
    }
}

impl IgnoreSpec {
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            set: None,
        }
    }

    pub fn new(patterns: &[String]) -> Result<Self> {
        if patterns.is_empty() {
            return Ok(Self::empty());
        }
        Ok(Self {
            patterns: patterns.to_vec(),
            set: Some(build_globset(patterns)?),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_none()
    }

    /// Test a single entry against all three representations.
    pub fn matches(&self, root: &Path, path: &Path) -> bool {
        let Some(set) = &self.set else {
            return false;
        };

        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if set.is_match(name) {
                return true;
            }
        }

        if set.is_match(to_slash(path)) {
            return true;
        }

        match path.strip_prefix(root) {
            Ok(rel) if !rel.as_os_str().is_empty() => set.is_match(to_slash(rel)),
            _ => false,
        }
    }

    /// Like [`matches`](Self::matches), but also tests every ancestor of
    /// `path` below `base`. A file inside an ignored directory is ignored.
    pub fn matches_within(&self, root: &Path, base: &Path, path: &Path) -> bool {
        if self.is_empty() {
            return false;
        }
        let mut current = Some(path);
        while let Some(candidate) = current {
            if candidate == base || !candidate.starts_with(base) {
                break;
            }
            if self.matches(root, candidate) {
                return true;
            }
            current = candidate.parent();
        }
        false
    }
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = GlobBuilder::new(pat)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
