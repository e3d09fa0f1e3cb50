// src/lib.rs

pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod mirror;
pub mod transform;
pub mod types;
pub mod watch;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::MirrorConfig;
use crate::engine::Mirror;
use crate::exec::RealLauncher;
use crate::fs::RealFileSystem;
use crate::transform::{CommandTransformer, PassthroughTransformer, Transformer};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config resolution (flags, `Transmirror.toml`, defaults)
/// - the transformer
/// - cache / queue / pipeline
/// - (optional) file watcher and supervised program
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config = config::resolve(&args)?;

    if args.print_config {
        print_config(&config);
        return Ok(());
    }

    let transformer: Arc<dyn Transformer> = match &config.transform_command {
        Some(command) => {
            debug!(command = %command, "using transform command");
            Arc::new(CommandTransformer::new(command.clone()))
        }
        None => Arc::new(PassthroughTransformer),
    };

    let watch = config.watch;
    let mirror = Mirror::new(
        config,
        Arc::new(RealFileSystem),
        transformer,
        Arc::new(RealLauncher),
    )?;

    if watch {
        // Ctrl-C → graceful shutdown.
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        };
        let summary = mirror.run_watch(shutdown, true).await?;
        info!("stopped: {summary}");
    } else {
        let summary = mirror.run_once().await?;
        if summary.failed > 0 {
            info!(failed = summary.failed, "finished with failures");
        }
    }

    Ok(())
}

/// `--print-config` output: every resolved setting, one per line.
fn print_config(cfg: &MirrorConfig) {
    println!("transmirror configuration");
    println!("  root = {}", cfg.root.display());
    println!("  source = {}", cfg.source_dir.display());
    println!("  output_directory = {}", cfg.output_dir.display());
    println!("  watch = {}", cfg.watch);
    println!("  extensions = {:?}", cfg.extensions);
    if let Some(ext) = &cfg.output_extension {
        println!("  output_extension = {ext}");
    }
    for (from, to) in cfg.extension_map.iter() {
        println!("  extension_map.{from} = {to}");
    }
    println!("  mapping = {}", cfg.mapping().describe());
    if !cfg.ignored.is_empty() {
        println!("  ignored = {:?}", cfg.ignored);
    }
    if !cfg.ignored_for_restart.is_empty() {
        println!("  ignored_for_restart = {:?}", cfg.ignored_for_restart);
    }
    println!("  source_maps = {}", cfg.source_maps);
    println!("  keep_extra_files = {}", cfg.keep_extra_files);
    println!("  reset_cache = {}", cfg.reset_cache);
    match &cfg.transform_command {
        Some(cmd) => println!("  transform_command = {cmd}"),
        None => println!("  transform_command = (copy)"),
    }
    if let Some(spec) = cfg.launch_spec() {
        println!("  execute = {spec}");
        println!("  execute_delay = {}ms", cfg.execute_delay.as_millis());
    }
    println!("  concurrency = {}", cfg.concurrency);
    println!("  fingerprint = {:?}", cfg.fingerprint);
    println!("  cache_directory = {}", cfg.cache_directory.display());
    println!("  cache_storage = {:?}", cfg.cache_storage);

    debug!("print-config complete (no work done)");
}
