// src/mirror/mapping.rs

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Maps source file names onto output file names.
///
/// Built from the extension allow-list plus the optional output extension and
/// per-extension overrides. Rules are kept longest-suffix-first so that
/// `.d.ts` is tried before `.ts`. The full pass and the watcher share one
/// instance so both always agree on where an output lives.
#[derive(Clone, PartialEq, Eq)]
pub struct OutputMapping {
    /// `(source suffix, output suffix)`, longest source suffix first.
    rules: Vec<(String, String)>,
}

impl fmt::Debug for OutputMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.rules.iter().map(|(from, to)| (from, to)))
            .finish()
    }
}

impl OutputMapping {
    /// Build a mapping for the given allow-listed `extensions`.
    ///
    /// For each extension the output suffix is, in order of preference:
    /// the `overrides` entry, `output_extension`, or the extension itself.
    pub fn new(
        extensions: &[String],
        output_extension: Option<&str>,
        overrides: &BTreeMap<String, String>,
    ) -> Self {
        let mut rules: Vec<(String, String)> = extensions
            .iter()
            .map(|ext| {
                let target = overrides
                    .get(ext)
                    .map(String::as_str)
                    .or(output_extension)
                    .unwrap_or(ext.as_str());
                (ext.clone(), target.to_string())
            })
            .collect();

        rules.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        rules.dedup_by(|a, b| a.0 == b.0);

        Self { rules }
    }

    /// Allow-listed extensions, longest first.
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(from, _)| from.as_str())
    }

    fn rule_for(&self, name: &str) -> Option<&(String, String)> {
        self.rules.iter().find(|(from, _)| name.ends_with(from.as_str()))
    }

    /// Whether a file with this name should be transformed at all.
    pub fn is_allowed(&self, name: &str) -> bool {
        self.rule_for(name).is_some()
    }

    /// Output file name for a source file name. Names outside the allow-list
    /// map onto themselves.
    pub fn map_name(&self, name: &str) -> String {
        match self.rule_for(name) {
            Some((from, to)) => format!("{}{}", &name[..name.len() - from.len()], to),
            None => name.to_string(),
        }
    }

    /// Apply [`map_name`](Self::map_name) to the last component of `path`.
    pub fn map_path(&self, path: &Path) -> PathBuf {
        match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => path.with_file_name(self.map_name(name)),
            None => path.to_path_buf(),
        }
    }

    /// Output path for `source`, which must live under `source_root`.
    ///
    /// Returns `None` when `source` is outside `source_root`.
    pub fn output_for(&self, source_root: &Path, output_root: &Path, source: &Path) -> Option<PathBuf> {
        let rel = source.strip_prefix(source_root).ok()?;
        if rel.as_os_str().is_empty() {
            return Some(output_root.to_path_buf());
        }
        Some(self.map_path(&output_root.join(rel)))
    }

    /// Stable textual form, used as part of the cache identity.
    pub fn describe(&self) -> String {
        self.rules
            .iter()
            .map(|(from, to)| format!("{from}=>{to}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Name of the source map written next to an output file.
pub fn sidecar_name(output_name: &str) -> String {
    format!("{output_name}.map")
}

/// Path of the source map written next to `output`.
pub fn sidecar_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(".map");
    PathBuf::from(name)
}
