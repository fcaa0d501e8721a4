//! Worker Pool (spec.md §4.7): a fixed set of workers pulling tasks from a
//! bounded channel, each task wrapped in a per-task timeout. No priority, no
//! affinity, plain FIFO delivery order.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Per-task timeout (spec.md §4.7: "wrap in a 30-second timeout context").
pub const TASK_TIMEOUT: Duration = Duration::from_secs(30);

/// A unit of work submitted to the pool.
#[async_trait]
pub trait Task: Send + Sync {
    async fn execute(&self) -> Result<()>;
    fn id(&self) -> String;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PoolStats {
    pub active_workers: usize,
    pub queued_tasks: usize,
    pub completed: u64,
    pub failed: u64,
    pub average_task_wall_time: Duration,
}

struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    total_wall_time_micros: AtomicU64,
}

struct RunningHandles {
    workers: Vec<JoinHandle<()>>,
    sender: mpsc::Sender<Arc<dyn Task>>,
}

/// Fixed-size pool of N workers sharing one bounded task channel (capacity
/// `2*N`, spec.md §4.7).
pub struct WorkerPool {
    worker_count: usize,
    channel_capacity: usize,
    counters: Arc<Counters>,
    running: Mutex<Option<RunningHandles>>,
}

impl WorkerPool {
    /// `worker_count` defaults to `std::thread::available_parallelism()`,
    /// clamped to >= 1, when `None` is supplied.
    pub fn new(worker_count: Option<usize>) -> Self {
        let worker_count = worker_count
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1);
        Self {
            worker_count,
            channel_capacity: worker_count * 2,
            counters: Arc::new(Counters {
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                total_wall_time_micros: AtomicU64::new(0),
            }),
            running: Mutex::new(None),
        }
    }

    /// Spawns `worker_count` worker loops, each waiting on the shared
    /// channel. Fails with `AlreadyRunning`.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let (sender, receiver) = mpsc::channel::<Arc<dyn Task>>(self.channel_capacity);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(self.worker_count);
        for worker_id in 0..self.worker_count {
            let receiver = receiver.clone();
            let counters = self.counters.clone();
            workers.push(tokio::spawn(async move {
                worker_loop(worker_id, receiver, counters).await;
            }));
        }

        *running = Some(RunningHandles { workers, sender });
        Ok(())
    }

    /// Non-blocking submit; fails with `QueueFull` if the channel is at
    /// capacity, `NotRunning` before start or after stop.
    pub async fn submit(&self, task: Arc<dyn Task>) -> Result<()> {
        let running = self.running.lock().await;
        let handles = running.as_ref().ok_or(Error::NotRunning)?;
        handles
            .sender
            .try_send(task)
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => Error::QueueFull,
                mpsc::error::TrySendError::Closed(_) => Error::NotRunning,
            })
    }

    /// Closes the task channel; in-flight tasks run to completion under
    /// their own timeout, then the pool is marked stopped.
    pub async fn stop(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        let Some(handles) = running.take() else {
            return Err(Error::NotRunning);
        };
        drop(handles.sender);
        for worker in handles.workers {
            let _ = worker.await;
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub async fn stats(&self) -> PoolStats {
        let running = self.running.lock().await;
        let active_workers = running.as_ref().map_or(0, |h| h.workers.len());
        let queued_tasks = running
            .as_ref()
            .map_or(0, |h| self.channel_capacity - h.sender.capacity());
        let completed = self.counters.completed.load(Ordering::Relaxed);
        let failed = self.counters.failed.load(Ordering::Relaxed);
        let total = completed + failed;
        let average = if total > 0 {
            Duration::from_micros(
                self.counters.total_wall_time_micros.load(Ordering::Relaxed) / total,
            )
        } else {
            Duration::ZERO
        };
        PoolStats {
            active_workers,
            queued_tasks,
            completed,
            failed,
            average_task_wall_time: average,
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Arc<dyn Task>>>>,
    counters: Arc<Counters>,
) {
    loop {
        let task = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        let Some(task) = task else {
            debug!(worker_id, "task channel closed, worker exiting");
            break;
        };

        let started = Instant::now();
        let result = tokio::time::timeout(TASK_TIMEOUT, task.execute()).await;
        let elapsed = started.elapsed();
        counters
            .total_wall_time_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);

        match result {
            Ok(Ok(())) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
                debug!(worker_id, task_id = %task.id(), ?elapsed, "task completed");
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(worker_id, task_id = %task.id(), error = %e, "task failed");
            }
            Err(_) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(worker_id, task_id = %task.id(), "task timed out after {TASK_TIMEOUT:?}");
            }
        }
        // A task failure or timeout never terminates the worker.
    }
}
