// ABOUTME: Lifecycle control for pump/forwarder workers: cancellation token and spawn helpers
// ABOUTME: stop() is eventually-observed, never preemptive; a worker parked mid-syscall finishes that call first

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// A shutdown flag shareable across every worker in a pump or bridge.
/// Cloning a `CancelToken` shares the same underlying flag; calling
/// [`CancelToken::cancel`] on any clone is observed by all of them.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and wakes any worker currently parked in an I/O
    /// primitive so it observes cancellation immediately rather than only
    /// at the next readiness event.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Resolves once [`CancelToken::cancel`] has been called. Best-effort:
    /// a `cancel()` racing with the first poll of this future is still
    /// caught by the `is_cancelled()` check every I/O primitive makes
    /// before awaiting readiness, so no cancellation is ever missed for
    /// longer than one loop iteration.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

/// A handle to a worker spawned with [`start_detached`].
pub struct WorkerHandle<T> {
    join: JoinHandle<T>,
    cancel: CancelToken,
}

impl<T> WorkerHandle<T> {
    /// Signals the worker to stop and waits for it to exit.
    pub async fn stop(self) -> Result<T, tokio::task::JoinError> {
        self.cancel.cancel();
        self.join.await
    }

    /// Signals the worker to stop without waiting for it to exit.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the worker to exit on its own (e.g. a fatal I/O error)
    /// without requesting cancellation.
    pub async fn join(self) -> Result<T, tokio::task::JoinError> {
        self.join.await
    }
}

/// Spawns `worker` on its own tokio task and returns immediately.
pub fn start_detached<F, T>(cancel: CancelToken, worker: F) -> WorkerHandle<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let join = tokio::spawn(worker);
    WorkerHandle { join, cancel }
}

/// Runs `worker` on the calling task instead of spawning it separately.
pub async fn start_inplace<F, T>(worker: F) -> T
where
    F: Future<Output = T>,
{
    worker.await
}
