// src/exec/stdin.rs

//! Manual restarts from the terminal: typing `rs` and Enter restarts the
//! supervised program.

use std::io::{self, BufRead};
use std::thread;

use tracing::debug;

use super::supervisor::SupervisorHandle;

pub const RESTART_COMMAND: &str = "rs";

/// True if `line` asks for a manual restart.
pub fn is_restart_command(line: &str) -> bool {
    line.trim() == RESTART_COMMAND
}

/// Read stdin on a plain thread and forward `rs` lines to the supervisor.
///
/// A blocking read on stdin cannot be cancelled, so it stays off the Tokio
/// runtime; the thread just ends with the process.
pub fn spawn_stdin_reader(supervisor: SupervisorHandle) -> io::Result<()> {
    supervisor.announce_manual_restart();
    thread::Builder::new()
        .name("transmirror-stdin".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) if is_restart_command(&line) => supervisor.manual_restart(),
                    Ok(_) => {}
                    Err(err) => {
                        debug!(error = %err, "stopped reading stdin");
                        break;
                    }
                }
            }
        })?;
    Ok(())
}
