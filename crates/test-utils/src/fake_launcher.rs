use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use transmirror::errors::{MirrorError, Result};
use transmirror::exec::{LaunchSpec, ProcessHandle, ProcessLauncher};

/// A fake launcher that:
/// - records every launch
/// - hands out processes that run until interrupted or killed
/// - can be switched to fail launches, or to hand out processes that
///   ignore interrupts and only stop when killed
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
    launches: Arc<Mutex<Vec<LaunchSpec>>>,
    interrupts: Arc<AtomicUsize>,
    kills: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
    stubborn: Arc<AtomicBool>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_stubborn(&self, stubborn: bool) {
        self.stubborn.store(stubborn, Ordering::SeqCst);
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }

    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.launches.lock().unwrap().clone()
    }

    /// How many running processes were asked to stop.
    pub fn interrupt_count(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }

    /// How many processes had to be killed.
    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ProcessHandle>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MirrorError::LaunchError(format!("{spec}: fake launch failure")));
        }
        let mut launches = self.launches.lock().unwrap();
        launches.push(spec.clone());
        Ok(Box::new(FakeProcess {
            pid: launches.len() as u32,
            stopped: false,
            stubborn: self.stubborn.load(Ordering::SeqCst),
            interrupts: Arc::clone(&self.interrupts),
            kills: Arc::clone(&self.kills),
        }))
    }
}

struct FakeProcess {
    pid: u32,
    stopped: bool,
    stubborn: bool,
    interrupts: Arc<AtomicUsize>,
    kills: Arc<AtomicUsize>,
}

impl ProcessHandle for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn interrupt(&mut self) -> Result<()> {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        if !self.stubborn {
            self.stopped = true;
        }
        Ok(())
    }

    fn kill(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.stopped = true;
        Box::pin(async { Ok(()) })
    }

    fn wait(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<i32>>> + Send + '_>> {
        let stopped = self.stopped;
        Box::pin(async move {
            if stopped {
                Ok(None)
            } else {
                std::future::pending().await
            }
        })
    }
}
