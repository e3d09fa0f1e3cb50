// src/exec/backend.rs

//! Pluggable process backend.
//!
//! The supervisor talks to a [`ProcessLauncher`] instead of spawning
//! `tokio::process::Command`s directly. Production uses [`RealLauncher`];
//! tests provide a launcher whose processes never touch the OS.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::errors::{MirrorError, Result};

/// Fully resolved command line of the supervised program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl LaunchSpec {
    /// `runtime [runtime_args..] entry [program_args..]`, or
    /// `entry [program_args..]` without a runtime.
    pub fn new(
        runtime: Option<&str>,
        runtime_args: &[String],
        entry: &Path,
        program_args: &[String],
        cwd: &Path,
    ) -> Self {
        match runtime {
            Some(runtime) => {
                let mut args = runtime_args.to_vec();
                args.push(entry.to_string_lossy().into_owned());
                args.extend(program_args.iter().cloned());
                Self {
                    program: PathBuf::from(runtime),
                    args,
                    cwd: cwd.to_path_buf(),
                }
            }
            None => Self {
                program: entry.to_path_buf(),
                args: program_args.to_vec(),
                cwd: cwd.to_path_buf(),
            },
        }
    }
}

impl fmt::Display for LaunchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// A running supervised process.
pub trait ProcessHandle: Send {
    fn id(&self) -> Option<u32>;

    /// Ask the process to stop (SIGINT on unix).
    fn interrupt(&mut self) -> Result<()>;

    /// Stop the process forcefully.
    fn kill(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Wait for the process to exit. Resolves to the exit code, `None` if
    /// it was terminated by a signal.
    fn wait(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<i32>>> + Send + '_>>;
}

/// Starts supervised processes.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ProcessHandle>>;
}

/// Launcher used in production: real child processes with inherited stdio.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealLauncher;

impl ProcessLauncher for RealLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ProcessHandle>> {
        let child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MirrorError::LaunchError(format!("{spec}: {e}")))?;
        debug!(pid = ?child.id(), command = %spec, "spawned child process");
        Ok(Box::new(ChildHandle { child }))
    }
}

struct ChildHandle {
    child: Child,
}

impl ProcessHandle for ChildHandle {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    #[cfg(unix)]
    fn interrupt(&mut self) -> Result<()> {
        // Already reaped.
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn interrupt(&mut self) -> Result<()> {
        self.child
            .start_kill()
            .context("terminating child process")
            .map_err(MirrorError::from)
    }

    fn kill(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.child
                .kill()
                .await
                .context("killing child process")?;
            Ok(())
        })
    }

    fn wait(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<i32>>> + Send + '_>> {
        Box::pin(async move {
            let status = self
                .child
                .wait()
                .await
                .context("waiting for child process")?;
            Ok(status.code())
        })
    }
}
