//! Bounded worker pool for short background tasks.
//!
//! Plugins and API handlers submit fire-and-forget units of work here instead
//! of spawning unbounded tasks. A fixed set of worker tasks drains a shared
//! queue; success and error callbacks run on the worker that executed the
//! task. On shutdown the pool refuses new submissions and drains in-flight
//! work within a bounded budget, then abandons stragglers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Errors surfaced by the runner itself (not by submitted tasks).
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The runner is shutting down and no longer accepts work.
    #[error("runner is closed")]
    Closed,

    /// The task was abandoned before producing a result.
    #[error("task abandoned during shutdown")]
    Abandoned,
}

type BoxedTask = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

struct Job {
    task: BoxedTask,
    on_success: Option<Box<dyn FnOnce() + Send>>,
    on_error: Option<Box<dyn FnOnce(String) + Send>>,
    done: oneshot::Sender<Result<(), String>>,
}

/// Handle returned by [`BackgroundRunner::submit`], awaitable for join.
pub struct TaskHandle {
    done: oneshot::Receiver<Result<(), String>>,
}

impl TaskHandle {
    /// Wait for the task to finish. Returns the task's own result, or
    /// [`RunnerError::Abandoned`] if shutdown dropped it first.
    pub async fn join(self) -> Result<Result<(), String>, RunnerError> {
        self.done.await.map_err(|_| RunnerError::Abandoned)
    }
}

/// Fixed-size pool of worker tasks fed by an mpsc queue.
pub struct BackgroundRunner {
    /// Taken (dropped) on shutdown so workers observe a closed queue.
    tx: std::sync::Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    drain_budget: Duration,
}

impl BackgroundRunner {
    pub const DEFAULT_WORKERS: usize = 4;
    pub const DEFAULT_DRAIN_BUDGET: Duration = Duration::from_secs(5);

    #[must_use]
    pub fn new(workers: usize) -> Arc<Self> {
        Self::with_drain_budget(workers, Self::DEFAULT_DRAIN_BUDGET)
    }

    #[must_use]
    pub fn with_drain_budget(workers: usize, drain_budget: Duration) -> Arc<Self> {
        let workers = workers.max(1);
        // Queue depth scales with the pool so submissions rarely block.
        let (tx, rx) = mpsc::channel::<Job>(workers * 16);
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers)
            .map(|index| {
                let rx = Arc::clone(&rx);
                tokio::spawn(async move {
                    loop {
                        let job = {
                            let mut rx = rx.lock().await;
                            rx.recv().await
                        };
                        let Some(job) = job else {
                            debug!(worker = index, "runner worker exiting");
                            break;
                        };
                        run_job(job).await;
                    }
                })
            })
            .collect();

        Arc::new(Self {
            tx: std::sync::Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
            drain_budget,
        })
    }

    /// Schedule a unit of work. `on_success`/`on_error` run on the worker
    /// after the task completes. The returned handle may be awaited to join
    /// the task; dropping it is fine for fire-and-forget use.
    pub async fn submit<F>(
        &self,
        task: F,
        on_success: Option<Box<dyn FnOnce() + Send>>,
        on_error: Option<Box<dyn FnOnce(String) + Send>>,
    ) -> Result<TaskHandle, RunnerError>
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        let tx = {
            let guard = self.tx.lock().expect("runner lock poisoned");
            guard.clone().ok_or(RunnerError::Closed)?
        };

        let (done_tx, done_rx) = oneshot::channel();
        let job = Job {
            task: Box::pin(task),
            on_success,
            on_error,
            done: done_tx,
        };

        tx.send(job).await.map_err(|_| RunnerError::Closed)?;
        Ok(TaskHandle { done: done_rx })
    }

    /// Stop accepting work and drain in-flight tasks. Dropping the sender
    /// closes the queue; each worker finishes what is queued and exits. Every
    /// worker gets the drain budget to do so; workers still running after
    /// that are abandoned. Idempotent.
    pub async fn shutdown(&self) {
        let closed = {
            let mut guard = self.tx.lock().expect("runner lock poisoned");
            guard.take().is_none()
        };
        if closed {
            return;
        }
        info!("background runner shutting down");

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().await;
            workers.drain(..).collect()
        };

        for (index, handle) in handles.into_iter().enumerate() {
            match tokio::time::timeout(self.drain_budget, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(worker = index, error = %e, "runner worker panicked"),
                Err(_) => {
                    warn!(worker = index, "runner worker exceeded drain budget, abandoning");
                }
            }
        }
        info!("background runner stopped");
    }
}

async fn run_job(job: Job) {
    let result = job.task.await;
    match &result {
        Ok(()) => {
            if let Some(cb) = job.on_success {
                cb();
            }
        }
        Err(e) => {
            error!(error = %e, "background task failed");
            if let Some(cb) = job.on_error {
                cb(e.clone());
            }
        }
    }
    // Receiver may have been dropped by a fire-and-forget caller.
    let _ = job.done.send(result);
}
