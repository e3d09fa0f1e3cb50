// src/watch/mod.rs

//! File watching.
//!
//! This module is responsible for:
//! - Wiring up a cross-platform filesystem watcher (`notify`).
//! - Turning each changed path into pipeline work: transform, mirror a new
//!   directory, or remove output, plus a restart signal for the supervisor.
//!
//! It does not decide output names or staleness itself; that all goes
//! through the same [`Pipeline`](crate::engine::Pipeline) as the full pass.

pub mod event_handler;
pub mod path_utils;
pub mod watcher;

pub use event_handler::{is_relevant, WatchAction, WatchHandler};
pub use watcher::{spawn_watcher, WatcherHandle};
