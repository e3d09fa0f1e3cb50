// src/transform/command.rs

//! Transformer backed by an external shell command.
//!
//! The command receives the source file on stdin and must print the
//! transformed code on stdout. It also sees:
//!
//! - `TRANSMIRROR_FILE`: absolute path of the source file
//! - `TRANSMIRROR_ROOT`: project root
//! - `TRANSMIRROR_SOURCE_MAPS`: `false`, `true` or `inline`
//! - `TRANSMIRROR_MAP_FILE`: (source maps `true` only) a scratch path; if the
//!   command writes a source map there it is picked up as the file's map
//!
//! A non-zero exit fails the file with whatever the command wrote to stderr.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::{MirrorError, Result};

use super::{TransformOptions, Transformed, Transformer};

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct CommandTransformer {
    command: String,
}

impl CommandTransformer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn shell(&self) -> Command {
        if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.command);
            c
        }
    }

    async fn run(
        &self,
        path: &Path,
        contents: Vec<u8>,
        options: &TransformOptions,
    ) -> Result<Transformed> {
        let map_file = options
            .source_maps
            .writes_sidecar()
            .then(scratch_map_path);

        let mut cmd = self.shell();
        cmd.current_dir(&options.root)
            .env("TRANSMIRROR_FILE", path)
            .env("TRANSMIRROR_ROOT", &options.root)
            .env("TRANSMIRROR_SOURCE_MAPS", options.source_maps.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(map_file) = &map_file {
            cmd.env("TRANSMIRROR_MAP_FILE", map_file);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning transform command `{}`", self.command))?;

        // Feed stdin from a separate task so a command that writes a lot
        // before reading everything cannot deadlock against us.
        if let Some(mut stdin) = child.stdin.take() {
            let file = path.to_path_buf();
            tokio::spawn(async move {
                if let Err(err) = stdin.write_all(&contents).await {
                    debug!(file = ?file, error = %err, "transform command closed stdin early");
                }
            });
        }

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("waiting for transform command `{}`", self.command))?;

        if !output.status.success() {
            if let Some(map_file) = &map_file {
                discard_scratch(map_file).await;
            }
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            let message = if stderr.is_empty() {
                format!("command exited with status {code}")
            } else {
                format!("command exited with status {code}: {stderr}")
            };
            return Err(MirrorError::transform(path, message));
        }

        let mut transformed = Transformed::code(output.stdout);
        if let Some(map_file) = &map_file {
            match tokio::fs::read(map_file).await {
                Ok(map) => {
                    transformed.map = Some(map);
                    discard_scratch(map_file).await;
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(file = ?path, error = %err, "failed to read source map written by transform command");
                }
            }
        }
        Ok(transformed)
    }
}

impl Transformer for CommandTransformer {
    fn transform<'a>(
        &'a self,
        path: &'a Path,
        contents: Vec<u8>,
        options: &'a TransformOptions,
    ) -> Pin<Box<dyn Future<Output = Result<Transformed>> + Send + 'a>> {
        Box::pin(self.run(path, contents, options))
    }
}

fn scratch_map_path() -> PathBuf {
    let n = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("transmirror-{}-{n}.map", std::process::id()))
}

async fn discard_scratch(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            debug!(path = ?path, error = %err, "failed to remove scratch map file");
        }
    }
}
