// src/engine/queue.rs

//! Bounded-concurrency task queue for transforms.
//!
//! Every enqueued future runs on its own Tokio task but must hold a semaphore
//! permit while it executes, so at most `limit` transforms are in flight.
//! Failures are logged here and never affect sibling tasks. The number of
//! unsettled tasks is published on a watch channel, which is what
//! [`TransformQueue::wait_idle`] waits on.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;
use tokio::runtime::Handle;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::errors::{MirrorError, Result};

/// Counters since the queue was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: usize,
    pub succeeded: usize,
    pub failed: usize,
}

struct QueueInner {
    permits: Arc<Semaphore>,
    limit: usize,
    pending: watch::Sender<usize>,
    enqueued: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    handle: Handle,
}

/// Cheap to clone; all clones feed the same pool.
#[derive(Clone)]
pub struct TransformQueue {
    inner: Arc<QueueInner>,
}

impl fmt::Debug for TransformQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformQueue")
            .field("limit", &self.inner.limit)
            .field("pending", &self.pending())
            .finish()
    }
}

/// Handle to a single enqueued task.
///
/// Dropping it does not cancel the task.
pub struct TaskHandle<T> {
    label: String,
    join: JoinHandle<Result<T>>,
}

impl<T> TaskHandle<T> {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Wait for the task to settle.
    pub async fn join(self) -> Result<T> {
        match self.join.await {
            Ok(res) => res,
            Err(err) => Err(MirrorError::Other(anyhow!(
                "task `{}` did not complete: {err}",
                self.label
            ))),
        }
    }
}

/// Decrements the pending count when a task settles, including on panic.
struct PendingGuard(Arc<QueueInner>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.pending.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl TransformQueue {
    /// Create a queue running at most `limit` tasks at once.
    ///
    /// Must be called from inside a Tokio runtime; tasks are spawned on that
    /// runtime even when enqueued from a blocking thread.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        let (pending, _) = watch::channel(0usize);
        Self {
            inner: Arc::new(QueueInner {
                permits: Arc::new(Semaphore::new(limit)),
                limit,
                pending,
                enqueued: AtomicUsize::new(0),
                succeeded: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
                handle: Handle::current(),
            }),
        }
    }

    pub fn limit(&self) -> usize {
        self.inner.limit
    }

    /// Tasks enqueued but not yet settled.
    pub fn pending(&self) -> usize {
        *self.inner.pending.borrow()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.inner.enqueued.load(Ordering::SeqCst),
            succeeded: self.inner.succeeded.load(Ordering::SeqCst),
            failed: self.inner.failed.load(Ordering::SeqCst),
        }
    }

    /// Schedule `task`. It starts as soon as a permit is free.
    pub fn enqueue<F, T>(&self, label: impl Into<String>, task: F) -> TaskHandle<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let label = label.into();
        let inner = Arc::clone(&self.inner);

        inner.enqueued.fetch_add(1, Ordering::SeqCst);
        inner.pending.send_modify(|n| *n += 1);
        let guard = PendingGuard(Arc::clone(&inner));

        let task_label = label.clone();
        let join = self.inner.handle.spawn(async move {
            let _guard = guard;
            let _permit = Arc::clone(&inner.permits)
                .acquire_owned()
                .await
                .map_err(|e| MirrorError::Other(anyhow!("transform queue closed: {e}")))?;

            debug!(task = %task_label, "transform task started");
            let res = task.await;
            match &res {
                Ok(_) => {
                    inner.succeeded.fetch_add(1, Ordering::SeqCst);
                }
                Err(err) => {
                    inner.failed.fetch_add(1, Ordering::SeqCst);
                    error!(task = %task_label, error = %err, "transform task failed");
                }
            }
            res
        });

        TaskHandle { label, join }
    }

    /// Resolve once nothing is pending. Returns immediately on an idle
    /// queue.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.pending.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}
