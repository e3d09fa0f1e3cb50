// src/exec/supervisor.rs

//! Debounced supervision of the executed program.
//!
//! The decision of *when* to restart lives in [`RestartState`], a plain
//! struct with no IO. [`Supervisor`] is the async shell around it: a single
//! actor task that owns the child process and reacts to commands, the
//! debounce deadline and child exit. Everything else talks to it through a
//! [`SupervisorHandle`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::backend::{LaunchSpec, ProcessHandle, ProcessLauncher};
use super::stdin::RESTART_COMMAND;

/// Epochs wrap at this bound.
pub const EPOCH_WRAP: u32 = 1 << 16;

/// How long a stopping process gets after SIGINT before it is killed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Pure debounce bookkeeping.
///
/// Every signal bumps the epoch and pushes the deadline out to
/// `now + delay`. When the deadline passes, the restart fires unless the
/// current epoch already fired.
#[derive(Debug, Clone)]
pub struct RestartState {
    epoch: u32,
    last_fired: Option<u32>,
    deadline: Option<Instant>,
    delay: Duration,
}

impl RestartState {
    pub fn new(delay: Duration) -> Self {
        Self {
            epoch: 0,
            last_fired: None,
            deadline: None,
            delay,
        }
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn last_fired(&self) -> Option<u32> {
        self.last_fired
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn record_signal(&mut self, now: Instant) {
        self.epoch = (self.epoch + 1) % EPOCH_WRAP;
        self.deadline = Some(now + self.delay);
    }

    /// Mark the current epoch as handled, e.g. after a launch that did not
    /// go through the debounce.
    pub fn mark_fired(&mut self) {
        self.last_fired = Some(self.epoch);
    }

    /// Called when the deadline may have passed. Returns true if a restart
    /// should happen now.
    pub fn take_fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                if self.last_fired == Some(self.epoch) {
                    debug!(epoch = self.epoch, "restart already handled for this epoch");
                    return false;
                }
                self.last_fired = Some(self.epoch);
                true
            }
            _ => false,
        }
    }
}

/// Lifecycle of the supervised program, as published on the phase channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorPhase {
    /// No process running (not started yet, exited, or failed to launch).
    Idle,
    Running,
    /// Stopping the old process before starting a new one.
    Restarting,
}

#[derive(Debug)]
enum Command {
    Signal,
    ManualRestart,
    ManualRestartAvailable,
    Start,
    Shutdown(oneshot::Sender<()>),
}

/// Cheap-to-clone handle to the supervisor actor. Methods are synchronous
/// and never block, so they can be called from any thread.
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::UnboundedSender<Command>,
    phase: watch::Receiver<SupervisorPhase>,
}

impl fmt::Debug for SupervisorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisorHandle")
            .field("phase", &*self.phase.borrow())
            .finish()
    }
}

impl SupervisorHandle {
    /// Something relevant changed; restart once things settle.
    pub fn signal(&self) {
        self.send(Command::Signal);
    }

    /// Restart requested by the user. Goes through the same debounce as
    /// [`signal`](Self::signal).
    pub fn manual_restart(&self) {
        self.send(Command::ManualRestart);
    }

    /// `rs` on stdin is being listened for; the first launch tells the user.
    pub fn announce_manual_restart(&self) {
        self.send(Command::ManualRestartAvailable);
    }

    /// Launch the program right away, without waiting for the debounce.
    pub fn start(&self) {
        self.send(Command::Start);
    }

    pub fn phase(&self) -> SupervisorPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisorPhase> {
        self.phase.clone()
    }

    /// Stop the program and the actor. Resolves once the process is gone.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            debug!("supervisor already stopped; dropping command");
        }
    }
}

/// The actor. Owns the child process exclusively.
pub struct Supervisor {
    spec: LaunchSpec,
    launcher: Arc<dyn ProcessLauncher>,
    state: RestartState,
    grace: Duration,
    child: Option<Box<dyn ProcessHandle>>,
    announce_manual_restart: bool,
    launched: bool,
    commands: mpsc::UnboundedReceiver<Command>,
    phase: watch::Sender<SupervisorPhase>,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("spec", &self.spec)
            .field("state", &self.state)
            .field("running", &self.child.is_some())
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Spawn the actor task and return a handle to it.
    pub fn spawn(
        spec: LaunchSpec,
        launcher: Arc<dyn ProcessLauncher>,
        delay: Duration,
    ) -> (SupervisorHandle, JoinHandle<()>) {
        Self::spawn_with_grace(spec, launcher, delay, DEFAULT_GRACE_PERIOD)
    }

    pub fn spawn_with_grace(
        spec: LaunchSpec,
        launcher: Arc<dyn ProcessLauncher>,
        delay: Duration,
        grace: Duration,
    ) -> (SupervisorHandle, JoinHandle<()>) {
        let (tx, commands) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(SupervisorPhase::Idle);

        let actor = Supervisor {
            spec,
            launcher,
            state: RestartState::new(delay),
            grace,
            child: None,
            announce_manual_restart: false,
            launched: false,
            commands,
            phase: phase_tx,
        };
        let join = tokio::spawn(actor.run());

        (
            SupervisorHandle {
                tx,
                phase: phase_rx,
            },
            join,
        )
    }

    async fn run(mut self) {
        debug!(command = %self.spec, "supervisor started");

        loop {
            let deadline = self.state.deadline();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Signal) => {
                        self.state.record_signal(Instant::now());
                        debug!(epoch = self.state.epoch(), "restart signal");
                    }
                    Some(Command::ManualRestart) => {
                        info!("manual restart requested");
                        self.state.record_signal(Instant::now());
                    }
                    Some(Command::ManualRestartAvailable) => {
                        self.announce_manual_restart = true;
                    }
                    Some(Command::Start) => {
                        self.state.mark_fired();
                        self.restart().await;
                    }
                    Some(Command::Shutdown(done)) => {
                        self.stop_child().await;
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        self.stop_child().await;
                        break;
                    }
                },

                _ = sleep_until_opt(deadline) => {
                    if self.state.take_fire(Instant::now()) {
                        self.restart().await;
                    }
                }

                status = wait_child(&mut self.child) => {
                    match status {
                        Ok(code) => info!(exit_code = ?code, command = %self.spec, "program exited"),
                        Err(err) => warn!(error = %err, "failed to wait for program"),
                    }
                    self.child = None;
                    self.set_phase(SupervisorPhase::Idle);
                }
            }
        }

        self.set_phase(SupervisorPhase::Idle);
        debug!("supervisor finished");
    }

    async fn restart(&mut self) {
        if self.child.is_some() {
            self.set_phase(SupervisorPhase::Restarting);
            info!(command = %self.spec, "restarting program");
            self.stop_child().await;
        }

        match self.launcher.launch(&self.spec) {
            Ok(child) => {
                info!(pid = ?child.id(), command = %self.spec, "program started");
                self.child = Some(child);
                self.set_phase(SupervisorPhase::Running);
                if !self.launched && self.announce_manual_restart {
                    info!("to restart at any time, enter `{RESTART_COMMAND}`");
                }
                self.launched = true;
            }
            Err(err) => {
                // Stay ready: the next signal tries again.
                error!(command = %self.spec, error = %err, "failed to start program");
                self.set_phase(SupervisorPhase::Idle);
            }
        }
    }

    /// SIGINT, then a grace period, then kill.
    async fn stop_child(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        if let Err(err) = child.interrupt() {
            warn!(error = %err, "failed to interrupt program");
        }

        match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(Ok(code)) => debug!(exit_code = ?code, "program stopped"),
            Ok(Err(err)) => warn!(error = %err, "failed to wait for program"),
            Err(_) => {
                warn!(grace = ?self.grace, "program didn't stop gracefully, force killing");
                if let Err(err) = child.kill().await {
                    warn!(error = %err, "failed to kill program");
                }
            }
        }
    }

    fn set_phase(&self, phase: SupervisorPhase) {
        self.phase.send_replace(phase);
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn wait_child(
    child: &mut Option<Box<dyn ProcessHandle>>,
) -> crate::errors::Result<Option<i32>> {
    match child {
        Some(child) => child.wait().await,
        None => std::future::pending().await,
    }
}
