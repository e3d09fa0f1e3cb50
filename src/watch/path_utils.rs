// src/watch/path_utils.rs

//! Utility functions for path handling in the watcher.

use std::path::{Path, PathBuf};

/// Render a path with forward slashes, the form glob patterns are written in.
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Re-root an event path onto `root`.
///
/// Event paths normally start with the watched root already. If they don't
/// (symlinks, or `/private/var` vs `/var` on macOS), both sides are
/// canonicalized and the relative part is grafted back onto `root`, so the
/// result can always be fed to the same output mapping as the full pass.
///
/// Returns `None` if the path cannot be reasonably related to `root`.
pub fn rebase_onto(root: &Path, path: &Path) -> Option<PathBuf> {
    // Fast path: event path already starts with our root.
    if path.starts_with(root) {
        return Some(path.to_path_buf());
    }

    if let Ok(root_canon) = root.canonicalize() {
        if let Ok(rel) = path.strip_prefix(&root_canon) {
            return Some(root.join(rel));
        }
        // A deleted file cannot be canonicalized; its parent usually can.
        let parent_canon = path
            .parent()
            .and_then(|parent| parent.canonicalize().ok());
        if let (Some(parent_canon), Some(name)) = (parent_canon, path.file_name()) {
            if let Ok(rel) = parent_canon.join(name).strip_prefix(&root_canon) {
                return Some(root.join(rel));
            }
        }
    }

    None
}

/// Convert a path into a string relative to `root`, with forward slashes.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    let rebased = rebase_onto(root, path)?;
    rebased.strip_prefix(root).ok().map(to_slash)
}
