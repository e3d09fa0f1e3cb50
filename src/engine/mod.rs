// src/engine/mod.rs

//! Orchestration engine for transmirror.
//!
//! This module ties together:
//! - the bounded transform queue ([`queue`])
//! - the per-file pipeline shared by the full pass and the watcher
//!   ([`pipeline`])
//! - the top-level run loop for one-shot and watch mode ([`runtime`])

pub mod pipeline;
pub mod queue;
pub mod runtime;

pub use pipeline::{Pipeline, RunSummary};
pub use queue::{QueueStats, TaskHandle, TransformQueue};
pub use runtime::Mirror;
