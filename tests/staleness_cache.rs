// tests/staleness_cache.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use transmirror::cache::{
    cache_file_path, content_fingerprint, file_key, fingerprint, FingerprintStore,
    MemoryFingerprintStore, StalenessCache, CACHE_NAMESPACE,
};
use transmirror::fs::mock::MockFileSystem;
use transmirror::fs::FileSystem;
use transmirror::types::{CacheStorageMode, FingerprintPolicy};

/// Shares a memory store with the test while the cache owns a box of it.
struct SharedStore(Arc<MemoryFingerprintStore>);

impl FingerprintStore for SharedStore {
    fn load(&self) -> anyhow::Result<HashMap<String, String>> {
        self.0.load()
    }

    fn save(&self, records: &HashMap<String, String>) -> anyhow::Result<()> {
        self.0.save(records)
    }
}

/// Fails the first `fail_first` saves.
struct FlakyStore {
    inner: MemoryFingerprintStore,
    remaining_failures: AtomicUsize,
    attempted: Arc<AtomicBool>,
}

impl FingerprintStore for FlakyStore {
    fn load(&self) -> anyhow::Result<HashMap<String, String>> {
        Ok(HashMap::new())
    }

    fn save(&self, records: &HashMap<String, String>) -> anyhow::Result<()> {
        self.attempted.store(true, Ordering::SeqCst);
        if self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            anyhow::bail!("disk full");
        }
        self.inner.save(records)
    }
}

#[tokio::test(start_paused = true)]
async fn burst_of_writes_coalesces_into_one_flush() {
    let store = Arc::new(MemoryFingerprintStore::new());
    let window = Duration::from_millis(1000);
    let cache = StalenessCache::with_store(Box::new(SharedStore(Arc::clone(&store))), false, window);

    for i in 0..10 {
        cache.set(format!("k{i}"), format!("v{i}"));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(store.save_count(), 0, "no flush while writes keep coming");

    tokio::time::sleep(window * 2).await;
    assert_eq!(store.save_count(), 1);
    assert_eq!(store.saved().len(), 10);
}

#[tokio::test(start_paused = true)]
async fn spaced_writes_flush_separately() {
    let store = Arc::new(MemoryFingerprintStore::new());
    let window = Duration::from_millis(200);
    let cache = StalenessCache::with_store(Box::new(SharedStore(Arc::clone(&store))), false, window);

    for i in 0..3 {
        cache.set("k", format!("v{i}"));
        tokio::time::sleep(window * 3).await;
    }

    assert_eq!(store.save_count(), 3);
    assert_eq!(store.saved().get("k").map(String::as_str), Some("v2"));
}

#[tokio::test]
async fn explicit_flush_writes_and_is_a_noop_when_clean() {
    let store = Arc::new(MemoryFingerprintStore::new());
    let cache = StalenessCache::with_store(
        Box::new(SharedStore(Arc::clone(&store))),
        false,
        Duration::from_secs(60),
    );

    cache.flush().await.unwrap();
    assert_eq!(store.save_count(), 0);

    cache.set("a", "1");
    cache.flush().await.unwrap();
    cache.flush().await.unwrap();
    assert_eq!(store.save_count(), 1);
    assert_eq!(store.saved().get("a").map(String::as_str), Some("1"));
}

#[tokio::test]
async fn reset_ignores_stored_records_but_still_persists() {
    let mut initial = HashMap::new();
    initial.insert("old".to_string(), "fp".to_string());
    let store = Arc::new(MemoryFingerprintStore::new());
    store.save(&initial).unwrap();

    let cache = StalenessCache::with_store(
        Box::new(SharedStore(Arc::clone(&store))),
        true,
        Duration::from_secs(60),
    );
    assert!(cache.get("old").is_none());
    assert!(cache.is_empty());

    cache.set("new", "fp2");
    cache.flush().await.unwrap();
    let saved = store.saved();
    assert!(!saved.contains_key("old"));
    assert_eq!(saved.get("new").map(String::as_str), Some("fp2"));
}

#[tokio::test]
async fn failed_flush_is_retried_by_the_next_flush() {
    let attempted = Arc::new(AtomicBool::new(false));
    let cache = StalenessCache::with_store(
        Box::new(FlakyStore {
            inner: MemoryFingerprintStore::new(),
            remaining_failures: AtomicUsize::new(1),
            attempted: Arc::clone(&attempted),
        }),
        false,
        Duration::from_secs(60),
    );

    cache.set("a", "1");
    assert!(cache.flush().await.is_err());
    assert!(attempted.load(Ordering::SeqCst));
    assert!(cache.flush().await.is_ok());
}

#[tokio::test]
async fn file_store_round_trips_across_opens() {
    let dir = tempfile::tempdir().unwrap();
    let identity = "/p/src|/p/lib|.js=>.js";

    {
        let cache = StalenessCache::open(identity, false, dir.path(), CacheStorageMode::File);
        cache.set("k1", "blake3:abc");
        cache.set("k2", "mtime:1.000000000");
        cache.flush().await.unwrap();
    }

    let path = cache_file_path(dir.path(), identity);
    assert!(path.starts_with(dir.path().join(CACHE_NAMESPACE)));
    assert!(path.is_file());

    let reopened = StalenessCache::open(identity, false, dir.path(), CacheStorageMode::File);
    assert_eq!(reopened.get("k1").as_deref(), Some("blake3:abc"));
    assert_eq!(reopened.get("k2").as_deref(), Some("mtime:1.000000000"));

    let other = StalenessCache::open("another tree", false, dir.path(), CacheStorageMode::File);
    assert!(other.is_empty());
}

#[tokio::test]
async fn corrupt_cache_file_degrades_to_empty() {
    let dir = tempfile::tempdir().unwrap();
    let identity = "corrupt";
    let path = cache_file_path(dir.path(), identity);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "this is not a cache file\n").unwrap();

    let cache = StalenessCache::open(identity, false, dir.path(), CacheStorageMode::File);
    assert!(cache.is_empty());

    // And it can still be written over.
    cache.set("k", "v");
    cache.flush().await.unwrap();
    let reopened = StalenessCache::open(identity, false, dir.path(), CacheStorageMode::File);
    assert_eq!(reopened.get("k").as_deref(), Some("v"));
}

#[tokio::test]
async fn memory_storage_never_touches_disk() {
    let dir = tempfile::tempdir().unwrap();
    let cache = StalenessCache::open("mem", false, dir.path(), CacheStorageMode::Memory);
    cache.set("k", "v");
    cache.flush().await.unwrap();

    assert!(!dir.path().join(CACHE_NAMESPACE).exists());
}

#[test]
fn fingerprints_follow_the_policy() {
    let fs = MockFileSystem::new();
    let path = PathBuf::from("/p/src/a.js");
    fs.add_file(&path, "hello");
    let stats = fs.metadata(&path).unwrap();

    let content = fingerprint(&fs, &path, &stats, FingerprintPolicy::Content).unwrap();
    assert_eq!(content, content_fingerprint(b"hello"));

    let mtime = fingerprint(&fs, &path, &stats, FingerprintPolicy::Mtime).unwrap();
    assert!(mtime.starts_with("mtime:"));

    // Touching changes the mtime fingerprint but not the content one.
    fs.touch(&path);
    let touched = fs.metadata(&path).unwrap();
    assert_ne!(
        fingerprint(&fs, &path, &touched, FingerprintPolicy::Mtime).unwrap(),
        mtime
    );
    assert_eq!(
        fingerprint(&fs, &path, &touched, FingerprintPolicy::Content).unwrap(),
        content
    );
}

#[test]
fn file_key_depends_on_path_only() {
    assert_eq!(file_key(Path::new("/p/src/a.js")), file_key(Path::new("/p/src/a.js")));
    assert_ne!(file_key(Path::new("/p/src/a.js")), file_key(Path::new("/p/src/b.js")));
}
