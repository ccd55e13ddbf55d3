//! Task management for the Wayfare node runner.
//!
//! - [`TaskManager`] - Owns the shutdown token and tracks every spawned task
//! - [`TaskExecutor`] - Cheap handle for spawning tasks onto the runtime
//! - [`Shutdown`] - Cooperative cancellation signal handed to long-running loops
//!
//! Tasks spawned through the executor are tracked, so shutdown can wait for
//! them to drain within a bounded timeout instead of abandoning them.

mod metrics;

use std::future::{Future, IntoFuture};
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

pub use metrics::{IncCounterOnDrop, TaskExecutorMetrics};

/// Cooperative shutdown signal.
///
/// Cloned into every long-running loop; loops check it each iteration
/// (usually as a `tokio::select!` branch). Awaiting it resolves once
/// shutdown has been requested.
#[derive(Debug, Clone)]
pub struct Shutdown(CancellationToken);

impl Shutdown {
    /// Resolves when shutdown has been requested.
    pub async fn cancelled(&self) {
        self.0.cancelled().await
    }

    /// Whether shutdown has already been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

impl IntoFuture for Shutdown {
    type Output = ();
    type IntoFuture = WaitForCancellationFutureOwned;

    fn into_future(self) -> Self::IntoFuture {
        self.0.cancelled_owned()
    }
}

/// Owns the task lifecycle of the node process.
#[derive(Debug)]
pub struct TaskManager {
    handle: Handle,
    token: CancellationToken,
    tracker: TaskTracker,
    metrics: TaskExecutorMetrics,
}

impl TaskManager {
    /// Create a task manager spawning onto the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
            metrics: TaskExecutorMetrics::default(),
        }
    }

    /// Create a task manager for the runtime we are currently running on.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Returns a new executor that spawns onto this manager.
    pub fn executor(&self) -> TaskExecutor {
        TaskExecutor {
            handle: self.handle.clone(),
            token: self.token.clone(),
            tracker: self.tracker.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// Signal that resolves once shutdown is requested.
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown(self.token.clone())
    }

    /// Request shutdown of every task spawned through this manager.
    pub fn fire_shutdown(&self) {
        self.token.cancel();
    }

    /// Request shutdown and wait for tracked tasks to finish.
    ///
    /// Returns `false` if tasks were still running when `timeout` elapsed.
    pub async fn graceful_shutdown_with_timeout(self, timeout: Duration) -> bool {
        self.token.cancel();
        self.tracker.close();

        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => {
                debug!("All tasks finished");
                true
            }
            Err(_) => {
                warn!(
                    remaining = self.tracker.len(),
                    ?timeout,
                    "Tasks still running after shutdown timeout"
                );
                false
            }
        }
    }
}

/// Spawns tracked tasks. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    handle: Handle,
    token: CancellationToken,
    tracker: TaskTracker,
    metrics: TaskExecutorMetrics,
}

impl TaskExecutor {
    /// Spawn a regular task. It is dropped when shutdown is requested.
    pub fn spawn<F>(&self, name: &'static str, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.metrics.inc_regular_tasks();
        let finished = IncCounterOnDrop::new(self.metrics.finished_regular_tasks_total.clone());
        let token = self.token.clone();

        let task = async move {
            let _finished = finished;
            tokio::select! {
                _ = token.cancelled() => debug!(task = name, "Task cancelled"),
                _ = fut => debug!(task = name, "Task finished"),
            }
        };

        self.tracker.spawn_on(task, &self.handle)
    }

    /// Spawn a task that must never panic.
    ///
    /// A panic is logged and fires shutdown for the whole process.
    pub fn spawn_critical<F>(&self, name: &'static str, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.metrics.inc_critical_tasks();
        let finished = IncCounterOnDrop::new(self.metrics.finished_critical_tasks_total.clone());
        let token = self.token.clone();

        let task = async move {
            let _finished = finished;
            let guarded = AssertUnwindSafe(fut).catch_unwind();
            tokio::select! {
                _ = token.cancelled() => debug!(task = name, "Critical task cancelled"),
                result = guarded => {
                    if result.is_err() {
                        error!(task = name, "Critical task panicked, shutting down");
                        token.cancel();
                    }
                }
            }
        };

        self.tracker.spawn_on(task, &self.handle)
    }

    /// Spawn a task that receives the [`Shutdown`] signal and winds down itself.
    ///
    /// Unlike [`spawn`](Self::spawn), the task is not dropped on shutdown;
    /// it is awaited (within the manager's timeout) so it can finish in-flight work.
    pub fn spawn_with_graceful_shutdown<F, Fut>(&self, name: &'static str, f: F) -> JoinHandle<()>
    where
        F: FnOnce(Shutdown) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.metrics.inc_regular_tasks();
        let finished = IncCounterOnDrop::new(self.metrics.finished_regular_tasks_total.clone());
        let fut = f(Shutdown(self.token.clone()));

        let task = async move {
            let _finished = finished;
            fut.await;
            debug!(task = name, "Task finished");
        };

        self.tracker.spawn_on(task, &self.handle)
    }

    /// Signal that resolves once shutdown is requested.
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown(self.token.clone())
    }

    /// Request shutdown from inside a task.
    pub fn fire_shutdown(&self) {
        self.token.cancel();
    }
}
