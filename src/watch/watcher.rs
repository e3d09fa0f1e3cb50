// src/watch/watcher.rs

use std::path::Path;

use anyhow::Result;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info};

use crate::watch::event_handler::{is_relevant, WatchHandler};

/// Handle for the filesystem watcher.
///
/// This exists mainly so the underlying `RecommendedWatcher` is kept alive for
/// as long as needed. Dropping this handle stops file watching, which in turn
/// ends the event loop once queued events are handled.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Watch `source_dir` recursively and feed every changed path to `handler`.
///
/// Paths are handled one at a time in arrival order; the work they cause
/// (transforms) runs concurrently on the queue.
pub fn spawn_watcher(source_dir: &Path, handler: WatchHandler) -> Result<WatcherHandle> {
    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<Event>();

    // Closure called synchronously by notify whenever an event arrives.
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(err) = event_tx.send(event) {
                    // The event loop is gone; we're shutting down.
                    eprintln!("transmirror: failed to forward notify event: {err}");
                }
            }
            Err(err) => {
                eprintln!("transmirror: file watch error: {err}");
            }
        },
        Config::default(),
    )?;

    watcher.watch(source_dir, RecursiveMode::Recursive)?;

    info!("watching {:?}", source_dir);

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            debug!(?event, "received notify event");

            if !is_relevant(&event.kind) {
                continue;
            }
            for path in event.paths {
                let action = handler.handle_path(&path).await;
                debug!(?action, "handled change");
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle { _inner: watcher })
}
