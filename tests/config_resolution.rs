// tests/config_resolution.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use tempfile::TempDir;

use transmirror::cli::CliArgs;
use transmirror::config::{load_from_path, resolve_with, MirrorConfig, CONFIG_FILE_NAME};
use transmirror::errors::MirrorError;
use transmirror::types::{CacheStorageMode, FingerprintPolicy, SourceMapMode};

struct Workspace {
    _dir: TempDir,
    root: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        Self { _dir: dir, root }
    }

    fn config_file(&self, contents: &str) {
        fs::write(self.root.join(CONFIG_FILE_NAME), contents).unwrap();
    }

    fn resolve(&self, argv: &[&str]) -> Result<MirrorConfig, MirrorError> {
        let mut full = vec!["transmirror"];
        full.extend_from_slice(argv);
        let args = CliArgs::try_parse_from(full).unwrap();
        resolve_with(&args, &self.root)
    }
}

fn parse(argv: &[&str]) -> CliArgs {
    let mut full = vec!["transmirror"];
    full.extend_from_slice(argv);
    CliArgs::try_parse_from(full).unwrap()
}

fn assert_config_error(result: Result<MirrorConfig, MirrorError>, needle: &str) {
    match result {
        Err(MirrorError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "expected {needle:?} in {msg:?}")
        }
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn defaults_when_only_source_and_output_are_given() {
    let ws = Workspace::new();
    let cfg = ws.resolve(&["src", "-o", "lib"]).unwrap();

    assert_eq!(cfg.root, ws.root);
    assert_eq!(cfg.source_dir, ws.root.join("src"));
    assert_eq!(cfg.output_dir, ws.root.join("lib"));
    assert!(!cfg.watch);
    assert_eq!(cfg.extensions, vec![".js"]);
    assert_eq!(cfg.source_maps, SourceMapMode::Off);
    assert_eq!(cfg.execute_delay, Duration::from_millis(250));
    assert_eq!(cfg.runtime.as_deref(), Some("node"));
    assert_eq!(cfg.fingerprint, FingerprintPolicy::Content);
    assert_eq!(cfg.cache_storage, CacheStorageMode::File);
    assert!(cfg.concurrency >= 1);
    assert!(cfg.launch_spec().is_none());
}

#[test]
fn config_file_fills_in_unset_flags() {
    let ws = Workspace::new();
    ws.config_file(
        r#"
source = "src"
output_directory = "build"
extensions = [".ts", ".tsx"]
output_extension = ".js"
ignored = ["**/__tests__/**"]
source_maps = "inline"
execute_delay = 100
fingerprint = "mtime"
cache_storage = "memory"

[extension_map]
".tsx" = ".jsx"
"#,
    );

    let cfg = ws.resolve(&[]).unwrap();
    assert_eq!(cfg.output_dir, ws.root.join("build"));
    assert_eq!(cfg.extensions, vec![".ts", ".tsx"]);
    assert_eq!(cfg.output_extension.as_deref(), Some(".js"));
    assert_eq!(cfg.ignored, vec!["**/__tests__/**"]);
    assert_eq!(cfg.source_maps, SourceMapMode::Inline);
    assert_eq!(cfg.execute_delay, Duration::from_millis(100));
    assert_eq!(cfg.fingerprint, FingerprintPolicy::Mtime);
    assert_eq!(cfg.cache_storage, CacheStorageMode::Memory);
    assert_eq!(cfg.mapping().map_name("App.tsx"), "App.jsx");
    assert_eq!(cfg.mapping().map_name("index.ts"), "index.js");
}

#[test]
fn flags_override_the_config_file() {
    let ws = Workspace::new();
    fs::create_dir_all(ws.root.join("other")).unwrap();
    ws.config_file(
        r#"
source = "src"
output_directory = "build"
extensions = [".ts"]
concurrency = 8
ignored = ["a"]
"#,
    );

    let cfg = ws
        .resolve(&["other", "-o", "out", "-e", ".mjs,.cjs", "--concurrency", "3", "--ignored", "b,c"])
        .unwrap();
    assert_eq!(cfg.source_dir, ws.root.join("other"));
    assert_eq!(cfg.output_dir, ws.root.join("out"));
    assert_eq!(cfg.extensions, vec![".mjs", ".cjs"]);
    assert_eq!(cfg.concurrency, 3);
    assert_eq!(cfg.ignored, vec!["b", "c"]);
}

#[test]
fn no_load_config_skips_the_file() {
    let ws = Workspace::new();
    ws.config_file("output_directory = \"build\"\nconcurrency = 8\n");

    let cfg = ws.resolve(&["src", "-o", "lib", "--no-load-config"]).unwrap();
    assert_eq!(cfg.output_dir, ws.root.join("lib"));
    assert_ne!(cfg.concurrency, 0);

    // Without the file there is no output directory at all.
    assert_config_error(ws.resolve(&["src", "--no-load-config"]), "output directory");
}

#[test]
fn config_file_paths_are_relative_to_root() {
    let ws = Workspace::new();
    let project = ws.root.join("project");
    fs::create_dir_all(project.join("src")).unwrap();
    fs::write(
        project.join(CONFIG_FILE_NAME),
        "source = \"src\"\noutput_directory = \"lib\"\n",
    )
    .unwrap();

    let args = parse(&["--root", "project"]);
    let cfg = resolve_with(&args, &ws.root).unwrap();
    assert_eq!(cfg.root, project);
    assert_eq!(cfg.source_dir, project.join("src"));
    assert_eq!(cfg.output_dir, project.join("lib"));
}

#[test]
fn unknown_key_in_config_file_is_rejected() {
    let ws = Workspace::new();
    ws.config_file("source = \"src\"\noutput_directory = \"lib\"\nwatchh = true\n");

    assert!(matches!(ws.resolve(&[]), Err(MirrorError::TomlError(_))));
    assert!(load_from_path(ws.root.join(CONFIG_FILE_NAME)).is_err());
}

#[test]
fn missing_source_is_an_error() {
    let ws = Workspace::new();
    assert_config_error(ws.resolve(&["-o", "lib"]), "source directory");
    assert_config_error(ws.resolve(&["nope", "-o", "lib"]), "does not exist");
}

#[test]
fn source_must_be_a_directory() {
    let ws = Workspace::new();
    fs::write(ws.root.join("file.js"), "").unwrap();
    assert_config_error(ws.resolve(&["file.js", "-o", "lib"]), "not a directory");
}

#[test]
fn output_must_not_be_or_contain_the_source() {
    let ws = Workspace::new();
    assert_config_error(ws.resolve(&["src", "-o", "src"]), "must differ");
    assert_config_error(ws.resolve(&["src", "-o", "."]), "must not contain");

    // The other way round is allowed.
    let cfg = ws.resolve(&["src", "-o", "src/out"]).unwrap();
    assert!(cfg.output_inside_source());
}

#[test]
fn execute_requires_watch() {
    let ws = Workspace::new();
    assert_config_error(ws.resolve(&["src", "-o", "lib", "-x", "lib/main.js"]), "--watch");

    let cfg = ws
        .resolve(&["src", "-o", "lib", "-w", "-x", "lib/main.js"])
        .unwrap();
    let spec = cfg.launch_spec().unwrap();
    assert_eq!(spec.program, PathBuf::from("node"));
    assert_eq!(spec.args, vec![ws.root.join("lib/main.js").to_string_lossy().into_owned()]);
    assert_eq!(spec.cwd, ws.root);
}

#[test]
fn runtime_args_and_program_args_end_up_on_the_command_line() {
    let ws = Workspace::new();
    let cfg = ws
        .resolve(&[
            "src",
            "-o",
            "lib",
            "-w",
            "-x",
            "lib/main.js",
            "--runtime-arg",
            "--enable-source-maps",
            "--",
            "--port",
            "80",
        ])
        .unwrap();

    let entry = ws.root.join("lib/main.js").to_string_lossy().into_owned();
    assert_eq!(cfg.runtime_args, vec!["--enable-source-maps"]);
    assert_eq!(cfg.program_args, vec!["--port", "80"]);
    assert_eq!(
        cfg.launch_spec().unwrap().args,
        vec!["--enable-source-maps".to_string(), entry, "--port".to_string(), "80".to_string()]
    );
}

#[test]
fn empty_runtime_runs_the_entry_directly() {
    let ws = Workspace::new();
    let cfg = ws
        .resolve(&["src", "-o", "lib", "-w", "-x", "lib/main.sh", "--runtime", ""])
        .unwrap();
    assert!(cfg.runtime.is_none());
    assert_eq!(cfg.launch_spec().unwrap().program, ws.root.join("lib/main.sh"));
}

#[test]
fn empty_transform_command_means_copy() {
    let ws = Workspace::new();
    ws.config_file("transform_command = \"  \"\n");
    let cfg = ws.resolve(&["src", "-o", "lib"]).unwrap();
    assert!(cfg.transform_command.is_none());
}

#[test]
fn extensions_must_look_like_extensions() {
    let ws = Workspace::new();
    assert_config_error(ws.resolve(&["src", "-o", "lib", "-e", "js"]), "invalid extension");
    assert_config_error(
        ws.resolve(&["src", "-o", "lib", "--output-extension", "a/b"]),
        "invalid extension",
    );
    assert_config_error(ws.resolve(&["src", "-o", "lib", "-e", ","]), "at least one extension");
}

#[test]
fn extension_map_keys_must_be_allow_listed() {
    let ws = Workspace::new();
    ws.config_file("[extension_map]\n\".ts\" = \".js\"\n");
    assert_config_error(ws.resolve(&["src", "-o", "lib"]), "extension_map");
}

#[test]
fn zero_concurrency_is_rejected() {
    let ws = Workspace::new();
    assert_config_error(ws.resolve(&["src", "-o", "lib", "--concurrency", "0"]), "concurrency");
}

#[test]
fn invalid_glob_is_a_config_error() {
    let ws = Workspace::new();
    assert_config_error(ws.resolve(&["src", "-o", "lib", "--ignored", "a[b"]), "ignored");
}

#[test]
fn source_maps_flag_forms() {
    let bare = parse(&["src", "-o", "lib", "--source-maps"]);
    assert_eq!(bare.source_maps, Some(SourceMapMode::File));

    let inline = parse(&["src", "-o", "lib", "--source-maps=inline"]);
    assert_eq!(inline.source_maps, Some(SourceMapMode::Inline));

    let off = parse(&["src", "-o", "lib", "--source-maps", "false"]);
    assert_eq!(off.source_maps, Some(SourceMapMode::Off));

    let absent = parse(&["src", "-o", "lib"]);
    assert_eq!(absent.source_maps, None);

    let bad = CliArgs::try_parse_from(["transmirror", "src", "--source-maps=sometimes"]);
    assert!(bad.is_err());
}

#[test]
fn source_maps_in_toml_accept_booleans() {
    let ws = Workspace::new();
    ws.config_file("source_maps = true\n");
    assert_eq!(ws.resolve(&["src", "-o", "lib"]).unwrap().source_maps, SourceMapMode::File);

    ws.config_file("source_maps = false\n");
    assert_eq!(ws.resolve(&["src", "-o", "lib"]).unwrap().source_maps, SourceMapMode::Off);
}

#[test]
fn cache_identity_differs_per_output_scheme() {
    let ws = Workspace::new();
    let a = ws.resolve(&["src", "-o", "lib"]).unwrap();
    let b = ws.resolve(&["src", "-o", "lib", "--output-extension", ".mjs"]).unwrap();
    let c = ws.resolve(&["src", "-o", "dist"]).unwrap();

    assert_ne!(a.cache_identity(), b.cache_identity());
    assert_ne!(a.cache_identity(), c.cache_identity());
    assert_eq!(a.cache_identity(), ws.resolve(&["src", "-o", "lib"]).unwrap().cache_identity());
}

#[test]
fn absolute_cli_paths_are_kept() {
    let ws = Workspace::new();
    let out = ws.root.join("abs-out");
    let src = ws.root.join("src");
    let args = parse(&[src.to_str().unwrap(), "-o", out.to_str().unwrap()]);
    let cfg = resolve_with(&args, Path::new("/")).unwrap();
    assert_eq!(cfg.source_dir, src);
    assert_eq!(cfg.output_dir, out);
    assert_eq!(cfg.root, PathBuf::from("/").canonicalize().unwrap());
}

#[test]
fn log_level_flag_sets_the_filter() {
    use tracing::level_filters::LevelFilter;
    use transmirror::cli::LogLevel;
    use transmirror::logging::log_filter;

    let args = parse(&["src", "-o", "lib", "--log-level", "debug"]);
    assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    assert_eq!(log_filter(args.log_level).max_level_hint(), Some(LevelFilter::DEBUG));
    assert_eq!(log_filter(Some(LogLevel::Error)).max_level_hint(), Some(LevelFilter::ERROR));
}
