// src/exec/mod.rs

//! Supervision of the executed program.
//!
//! - [`backend`] provides the `ProcessLauncher` / `ProcessHandle` traits and
//!   the `RealLauncher` used in production, which tests replace with a fake.
//! - [`supervisor`] owns the debounce state and the running child process.
//! - [`stdin`] turns `rs` typed on the terminal into manual restarts.

pub mod backend;
pub mod stdin;
pub mod supervisor;

pub use backend::{LaunchSpec, ProcessHandle, ProcessLauncher, RealLauncher};
pub use stdin::{is_restart_command, spawn_stdin_reader};
pub use supervisor::{RestartState, Supervisor, SupervisorHandle, SupervisorPhase};
