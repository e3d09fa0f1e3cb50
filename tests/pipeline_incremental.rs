// tests/pipeline_incremental.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use transmirror::config::MirrorConfig;
use transmirror::engine::Mirror;
use transmirror::fs::RealFileSystem;
use transmirror::types::{FingerprintPolicy, SourceMapMode};
use transmirror_test_utils::fake_transformer::TRANSFORMED_PREFIX;
use transmirror_test_utils::{init_tracing, with_timeout, FakeLauncher, FakeTransformer, MirrorConfigBuilder};

struct Project {
    _dir: TempDir,
    src: PathBuf,
    out: PathBuf,
    cache: PathBuf,
}

impl Project {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let src = root.join("src");
        fs::create_dir_all(&src).unwrap();
        Self {
            src,
            out: root.join("lib"),
            cache: root.join("cache"),
            _dir: dir,
        }
    }

    fn write(&self, rel: &str, contents: &str) {
        let path = self.src.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn output(&self, rel: &str) -> PathBuf {
        self.out.join(rel)
    }

    fn read_output(&self, rel: &str) -> String {
        fs::read_to_string(self.output(rel)).unwrap()
    }

    /// Builder with a persistent cache in the project's temp dir.
    fn builder(&self) -> MirrorConfigBuilder {
        MirrorConfigBuilder::new(&self.src, &self.out).cache_directory(&self.cache)
    }
}

fn mirror(config: MirrorConfig, transformer: &FakeTransformer) -> Mirror {
    Mirror::new(
        config,
        Arc::new(RealFileSystem),
        Arc::new(transformer.clone()),
        Arc::new(FakeLauncher::new()),
    )
    .unwrap()
}

async fn run_once(config: MirrorConfig, transformer: &FakeTransformer) -> transmirror::engine::RunSummary {
    with_timeout(mirror(config, transformer).run_once()).await.unwrap()
}

fn files_under(root: &Path) -> Vec<String> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<String>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(&path, root, out);
            } else {
                out.push(path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"));
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}

#[tokio::test]
async fn first_run_transforms_allow_listed_files() {
    init_tracing();
    let p = Project::new();
    p.write("a.js", "let a = 1;");
    p.write("b.txt", "not code");
    p.write("sub/c.js", "let c = 3;");

    let t = FakeTransformer::new();
    let summary = run_once(p.builder().build(), &t).await;

    assert_eq!(summary.transformed, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(files_under(&p.out), vec!["a.js", "sub/c.js"]);
    assert_eq!(p.read_output("a.js"), format!("{TRANSFORMED_PREFIX}let a = 1;"));
}

#[tokio::test]
async fn unchanged_rerun_does_no_work() {
    init_tracing();
    let p = Project::new();
    p.write("a.js", "let a = 1;");
    p.write("sub/c.js", "let c = 3;");

    let t = FakeTransformer::new();
    run_once(p.builder().build(), &t).await;
    assert_eq!(t.call_count(), 2);

    t.reset_calls();
    let summary = run_once(p.builder().build(), &t).await;
    assert_eq!(t.call_count(), 0);
    assert_eq!(summary.unchanged, 2);
    assert_eq!(summary.transformed, 0);
}

#[tokio::test]
async fn only_changed_files_are_retransformed() {
    init_tracing();
    let p = Project::new();
    p.write("a.js", "let a = 1;");
    p.write("b.js", "let b = 2;");

    let t = FakeTransformer::new();
    run_once(p.builder().build(), &t).await;

    p.write("a.js", "let a = 100;");
    t.reset_calls();
    run_once(p.builder().build(), &t).await;

    assert_eq!(t.calls_for("a.js"), 1);
    assert_eq!(t.calls_for("b.js"), 0);
    assert_eq!(p.read_output("a.js"), format!("{TRANSFORMED_PREFIX}let a = 100;"));
}

#[tokio::test]
async fn missing_output_is_regenerated_even_if_cached() {
    init_tracing();
    let p = Project::new();
    p.write("a.js", "let a = 1;");

    let t = FakeTransformer::new();
    run_once(p.builder().build(), &t).await;
    fs::remove_file(p.output("a.js")).unwrap();

    t.reset_calls();
    run_once(p.builder().build(), &t).await;
    assert_eq!(t.calls_for("a.js"), 1);
    assert!(p.output("a.js").is_file());
}

#[tokio::test]
async fn failed_transform_leaves_cache_untouched() {
    init_tracing();
    let p = Project::new();
    p.write("good.js", "ok");
    p.write("bad.js", "broken");

    let t = FakeTransformer::new();
    t.fail_on("bad");
    let summary = run_once(p.builder().build(), &t).await;
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.transformed, 1);
    assert!(!p.output("bad.js").exists());

    // Still failing: retried, not skipped.
    t.reset_calls();
    run_once(p.builder().build(), &t).await;
    assert_eq!(t.calls_for("bad.js"), 1);
    assert_eq!(t.calls_for("good.js"), 0);

    // Fixed: transformed once more and then cached.
    t.clear_failures();
    t.reset_calls();
    run_once(p.builder().build(), &t).await;
    assert_eq!(t.calls_for("bad.js"), 1);
    t.reset_calls();
    run_once(p.builder().build(), &t).await;
    assert_eq!(t.call_count(), 0);
}

#[tokio::test]
async fn reset_cache_transforms_everything_again() {
    init_tracing();
    let p = Project::new();
    p.write("a.js", "a");

    let t = FakeTransformer::new();
    run_once(p.builder().build(), &t).await;
    t.reset_calls();
    run_once(p.builder().reset_cache(true).build(), &t).await;
    assert_eq!(t.calls_for("a.js"), 1);
}

#[tokio::test]
async fn stray_output_is_removed_and_counted() {
    init_tracing();
    let p = Project::new();
    p.write("a.js", "a");
    fs::create_dir_all(&p.out).unwrap();
    fs::write(p.output("old.js"), "stale").unwrap();

    let t = FakeTransformer::new();
    let summary = run_once(p.builder().build(), &t).await;

    assert_eq!(summary.deleted, 1);
    assert_eq!(files_under(&p.out), vec!["a.js"]);
}

#[tokio::test]
async fn keep_extra_files_leaves_strays() {
    init_tracing();
    let p = Project::new();
    p.write("a.js", "a");
    fs::create_dir_all(&p.out).unwrap();
    fs::write(p.output("old.js"), "stale").unwrap();

    let t = FakeTransformer::new();
    run_once(p.builder().keep_extra_files(true).build(), &t).await;
    assert_eq!(files_under(&p.out), vec!["a.js", "old.js"]);
}

#[tokio::test]
async fn source_map_files_are_written_and_linked() {
    init_tracing();
    let p = Project::new();
    p.write("a.ts", "let a: number = 1;");

    let t = FakeTransformer::new().with_map();
    let config = p
        .builder()
        .extensions(&[".ts"])
        .output_extension(".js")
        .source_maps(SourceMapMode::File)
        .build();
    run_once(config, &t).await;

    assert_eq!(files_under(&p.out), vec!["a.js", "a.js.map"]);
    let code = p.read_output("a.js");
    assert!(code.ends_with("//# sourceMappingURL=a.js.map\n"), "{code}");

    // A second run keeps the sidecar.
    run_once(
        p.builder()
            .extensions(&[".ts"])
            .output_extension(".js")
            .source_maps(SourceMapMode::File)
            .build(),
        &t,
    )
    .await;
    assert!(p.output("a.js.map").is_file());
}

#[tokio::test]
async fn inline_mode_writes_no_sidecar() {
    init_tracing();
    let p = Project::new();
    p.write("a.js", "a");

    let t = FakeTransformer::new().with_map();
    run_once(p.builder().source_maps(SourceMapMode::Inline).build(), &t).await;
    assert_eq!(files_under(&p.out), vec!["a.js"]);
}

#[tokio::test]
async fn mtime_policy_detects_touch_without_content_change() {
    init_tracing();
    let p = Project::new();
    p.write("a.js", "a");

    let t = FakeTransformer::new();
    let build = || p.builder().fingerprint(FingerprintPolicy::Mtime).build();
    run_once(build(), &t).await;

    let file = fs::File::options().write(true).open(p.src.join("a.js")).unwrap();
    let later = std::time::SystemTime::now() + std::time::Duration::from_secs(10);
    file.set_modified(later).unwrap();
    drop(file);

    t.reset_calls();
    run_once(build(), &t).await;
    assert_eq!(t.calls_for("a.js"), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn output_keeps_source_permissions() {
    use std::os::unix::fs::PermissionsExt;

    init_tracing();
    let p = Project::new();
    p.write("bin.js", "#!/usr/bin/env node");
    fs::set_permissions(p.src.join("bin.js"), fs::Permissions::from_mode(0o755)).unwrap();

    let t = FakeTransformer::new();
    run_once(p.builder().build(), &t).await;

    let mode = fs::metadata(p.output("bin.js")).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o755);
}

#[tokio::test]
async fn remove_output_deletes_file_and_sidecar() {
    init_tracing();
    let p = Project::new();
    p.write("a.js", "a");
    p.write("dir/b.js", "b");

    let t = FakeTransformer::new().with_map();
    let m = mirror(p.builder().source_maps(SourceMapMode::File).build(), &t);
    with_timeout(m.run_once()).await.unwrap();
    assert!(p.output("a.js.map").is_file());

    fs::remove_file(p.src.join("a.js")).unwrap();
    let removed = m.pipeline().remove_output(&p.src.join("a.js")).await.unwrap();
    assert_eq!(removed.len(), 2);
    assert!(!p.output("a.js").exists());
    assert!(!p.output("a.js.map").exists());

    // Already gone: fine, nothing removed.
    let removed = m.pipeline().remove_output(&p.src.join("a.js")).await.unwrap();
    assert!(removed.is_empty());

    fs::remove_dir_all(p.src.join("dir")).unwrap();
    m.pipeline().remove_output(&p.src.join("dir")).await.unwrap();
    assert!(!p.output("dir").exists());
}

#[tokio::test]
async fn transforms_respect_the_concurrency_ceiling() {
    init_tracing();
    let p = Project::new();
    for i in 0..8 {
        p.write(&format!("f{i}.js"), "x");
    }

    let t = FakeTransformer::new().with_delay(std::time::Duration::from_millis(20));
    let summary = run_once(p.builder().concurrency(2).build(), &t).await;

    assert_eq!(summary.transformed, 8);
    assert_eq!(t.calls().len(), 8);
    assert!(t.max_in_flight() <= 2, "peak was {}", t.max_in_flight());
}

#[tokio::test]
async fn extension_map_overrides_the_output_extension() {
    init_tracing();
    let p = Project::new();
    p.write("a.ts", "a");
    p.write("b.mts", "b");
    p.write("c.d.ts", "c");

    let config = p
        .builder()
        .extensions(&[".ts", ".mts", ".d.ts"])
        .output_extension(".js")
        .map_extension(".mts", ".mjs")
        .map_extension(".d.ts", ".d.ts")
        .build();
    run_once(config, &FakeTransformer::new()).await;

    assert_eq!(files_under(&p.out), vec!["a.js", "b.mjs", "c.d.ts"]);
}

#[tokio::test]
async fn source_deleted_before_its_transform_is_skipped_quietly() {
    init_tracing();
    let p = Project::new();
    p.write("a.js", "a");
    let transformer = FakeTransformer::new();
    let m = mirror(p.builder().build(), &transformer);
    with_timeout(m.run_once()).await.unwrap();
    transformer.reset_calls();

    let gone = p.src.join("gone.js");
    let handle = m.pipeline().enqueue_file(gone);
    assert_eq!(with_timeout(handle.join()).await.unwrap(), None);

    m.pipeline().wait_idle().await;
    assert_eq!(transformer.call_count(), 0);
    assert_eq!(m.pipeline().summary().failed, 0);
    assert!(!p.output("gone.js").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn transforms_never_write_through_a_symlinked_output_directory() {
    init_tracing();
    let p = Project::new();
    p.write("a.js", "a");
    let transformer = FakeTransformer::new();
    let m = mirror(p.builder().build(), &transformer);
    with_timeout(m.run_once()).await.unwrap();

    let elsewhere = p.src.parent().unwrap().join("elsewhere");
    fs::create_dir_all(&elsewhere).unwrap();
    std::os::unix::fs::symlink(&elsewhere, p.output("sub")).unwrap();
    p.write("sub/b.js", "b");

    let handle = m.pipeline().enqueue_file(p.src.join("sub/b.js"));
    assert!(with_timeout(handle.join()).await.is_err());
    assert!(!elsewhere.join("b.js").exists());
}
