// src/fs/mock.rs

use super::{EntryKind, EntryStats, FileSystem};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File {
        content: Vec<u8>,
        modified: SystemTime,
        mode: u32,
    },
    Dir(Vec<String>), // List of child names
    Symlink(PathBuf),
}

/// In-memory filesystem for tests.
///
/// Modification times come from a logical clock that ticks one second per
/// write, so mtime fingerprints change deterministically.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
    clock: Arc<AtomicU64>,
}

fn not_found(path: &Path) -> anyhow::Error {
    anyhow!(io::Error::new(
        io::ErrorKind::NotFound,
        format!("not found: {:?}", path)
    ))
}

fn parent_of(path: &Path) -> Option<&Path> {
    path.parent().map(|parent| {
        if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        }
    })
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        // Ensure root exists
        files.insert(PathBuf::from("."), MockEntry::Dir(Vec::new()));
        files.insert(PathBuf::from("/"), MockEntry::Dir(Vec::new()));

        Self {
            files: Arc::new(Mutex::new(files)),
            clock: Arc::new(AtomicU64::new(1)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, MockEntry>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn tick(&self) -> SystemTime {
        let secs = self.clock.fetch_add(1, Ordering::SeqCst);
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let modified = self.tick();
        let path = path.as_ref().to_path_buf();
        let mut files = self.lock();
        let mode = match files.get(&path) {
            Some(MockEntry::File { mode, .. }) => *mode,
            _ => 0o644,
        };
        files.insert(
            path.clone(),
            MockEntry::File {
                content: content.into(),
                modified,
                mode,
            },
        );
        Self::link_into_parent(&mut files, &path);
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut files = self.lock();
        Self::ensure_dir_entry(&mut files, path.as_ref());
    }

    pub fn add_symlink(&self, path: impl AsRef<Path>, target: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        let mut files = self.lock();
        files.insert(path.clone(), MockEntry::Symlink(target.as_ref().to_path_buf()));
        Self::link_into_parent(&mut files, &path);
    }

    /// Bump the modification time of a file without changing its contents.
    pub fn touch(&self, path: impl AsRef<Path>) {
        let now = self.tick();
        let mut files = self.lock();
        if let Some(MockEntry::File { modified, .. }) = files.get_mut(path.as_ref()) {
            *modified = now;
        }
    }

    /// All file and symlink paths below `root`, sorted.
    pub fn files_under(&self, root: impl AsRef<Path>) -> Vec<PathBuf> {
        let root = root.as_ref();
        let files = self.lock();
        let mut out: Vec<PathBuf> = files
            .iter()
            .filter(|(path, entry)| {
                path.starts_with(root)
                    && path.as_path() != root
                    && !matches!(entry, MockEntry::Dir(_))
            })
            .map(|(path, _)| path.clone())
            .collect();
        out.sort();
        out
    }

    fn link_into_parent(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        // Ensure parent directories exist implicitly for simplicity in this mock
        let Some(parent) = parent_of(path) else {
            return;
        };
        if parent == path {
            return;
        }
        Self::ensure_dir_entry(files, parent);
        if let Some(MockEntry::Dir(children)) = files.get_mut(parent) {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if !children.iter().any(|c| c == name) {
                    children.push(name.to_string());
                }
            }
        }
    }

    fn ensure_dir_entry(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        if files.contains_key(path) {
            return;
        }
        files.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));
        Self::link_into_parent(files, path);
    }

    fn resolve<'a>(files: &'a HashMap<PathBuf, MockEntry>, path: &Path) -> Option<&'a MockEntry> {
        let mut current = path.to_path_buf();
        // Bounded to avoid looping on cyclic links.
        for _ in 0..16 {
            match files.get(&current) {
                Some(MockEntry::Symlink(target)) => current = target.clone(),
                other => return other,
            }
        }
        None
    }

    fn stats_of(entry: &MockEntry) -> EntryStats {
        match entry {
            MockEntry::File {
                content,
                modified,
                mode,
            } => EntryStats {
                kind: EntryKind::File,
                len: content.len() as u64,
                modified: Some(*modified),
                mode: Some(*mode),
            },
            MockEntry::Dir(_) => EntryStats {
                kind: EntryKind::Dir,
                len: 0,
                modified: None,
                mode: Some(0o755),
            },
            MockEntry::Symlink(_) => EntryStats {
                kind: EntryKind::Symlink,
                len: 0,
                modified: None,
                mode: None,
            },
        }
    }
}

impl FileSystem for MockFileSystem {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let files = self.lock();
        match Self::resolve(&files, path) {
            Some(MockEntry::File { content, .. }) => Ok(content.clone()),
            Some(_) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(not_found(path)),
        }
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.read(path)?)))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if matches!(self.lock().get(path), Some(MockEntry::Dir(_))) {
            return Err(anyhow!("Is a directory: {:?}", path));
        }
        self.add_file(path, contents);
        Ok(())
    }

    fn set_mode(&self, path: &Path, new_mode: u32) -> Result<()> {
        let mut files = self.lock();
        match files.get_mut(path) {
            Some(MockEntry::File { mode, .. }) => {
                *mode = new_mode;
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(not_found(path)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        let files = self.lock();
        Self::resolve(&files, path).is_some()
    }

    fn is_file(&self, path: &Path) -> bool {
        let files = self.lock();
        matches!(Self::resolve(&files, path), Some(MockEntry::File { .. }))
    }

    fn is_dir(&self, path: &Path) -> bool {
        let files = self.lock();
        matches!(Self::resolve(&files, path), Some(MockEntry::Dir(_)))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        // In mock, we just return the path as is, assuming absolute paths are used in tests
        Ok(path.to_path_buf())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let files = self.lock();
        match Self::resolve(&files, path) {
            Some(MockEntry::Dir(children)) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            Some(_) => Err(anyhow!("Not a directory: {:?}", path)),
            None => Err(not_found(path)),
        }
    }

    fn symlink_metadata(&self, path: &Path) -> Result<EntryStats> {
        let files = self.lock();
        files
            .get(path)
            .map(Self::stats_of)
            .ok_or_else(|| not_found(path))
    }

    fn metadata(&self, path: &Path) -> Result<EntryStats> {
        let files = self.lock();
        Self::resolve(&files, path)
            .map(Self::stats_of)
            .ok_or_else(|| not_found(path))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut files = self.lock();
        match files.get(path) {
            Some(MockEntry::Dir(_)) | None => {
                Self::ensure_dir_entry(&mut files, path);
                Ok(())
            }
            Some(_) => Err(anyhow!("Not a directory: {:?}", path)),
        }
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        let mut files = self.lock();
        if !files.contains_key(path) {
            return Err(not_found(path));
        }
        let is_dir = matches!(files.get(path), Some(MockEntry::Dir(_)));
        files.remove(path);
        if is_dir {
            files.retain(|p, _| !p.starts_with(path));
        }
        if let Some(parent) = parent_of(path) {
            if let Some(MockEntry::Dir(children)) = files.get_mut(parent) {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    children.retain(|c| c != name);
                }
            }
        }
        Ok(())
    }
}
