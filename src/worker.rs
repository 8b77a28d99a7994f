//! Lease-renewing execution of a single dequeued task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::processor::{ProcessorError, TaskProcessor};
use crate::queue::{Task, TaskQueue};

/// Renewal cadence fallback for a queue that reports a zero-length lease.
const MIN_RENEWAL_DELAY: Duration = Duration::from_millis(500);

/// Owns exactly one dequeued task: keeps its lease alive while the processor
/// runs, deletes it on success, and otherwise leaves it for the queue's
/// natural redelivery.
///
/// Lifecycle: `new` → `initialize` (renewal timer armed) → `run` → done.
pub struct Worker {
    task: Task,
    queue: Arc<dyn TaskQueue>,
    processor: Arc<dyn TaskProcessor>,
    done: Arc<AtomicBool>,
    started: bool,
    initialized: bool,
    renewal: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn new(task: Task, queue: Arc<dyn TaskQueue>, processor: Arc<dyn TaskProcessor>) -> Self {
        debug!("new worker created for task: payload={}", task.payload);
        Self {
            task,
            queue,
            processor,
            done: Arc::new(AtomicBool::new(false)),
            started: false,
            initialized: false,
            renewal: None,
        }
    }

    /// Arms the lease renewal timer. Must be called before `run`: there may
    /// be a significant delay between construction and execution, and the
    /// lease must not lapse in between.
    ///
    /// The first renewal fires at half the current lease duration; each
    /// successful extension re-arms at half the lease the queue reports, so
    /// the lease outlives processing of any length without the worker
    /// knowing that length in advance.
    pub fn initialize(&mut self) {
        let queue = self.queue.clone();
        let task = self.task.clone();
        let done = self.done.clone();
        let handle = tokio::spawn(async move {
            let mut lease = task.visibility_timeout;
            loop {
                let delay = if lease.is_zero() {
                    MIN_RENEWAL_DELAY
                } else {
                    lease / 2
                };
                sleep(delay).await;
                // completion races with a pending renewal; the flag check
                // keeps a stray firing from extending a finished task
                if done.load(Ordering::SeqCst) {
                    break;
                }
                match queue.extend_visibility(&task, lease).await {
                    Ok(granted) => {
                        debug!(
                            "lease extended: payload={} lease_secs={}",
                            task.payload,
                            granted.as_secs()
                        );
                        lease = granted;
                    }
                    Err(err) => {
                        // logged only: the task may already have been
                        // reclaimed by another worker at a lease boundary
                        warn!(
                            "lease renewal failed: payload={} error={}",
                            task.payload, err
                        );
                        break;
                    }
                }
            }
        });
        self.renewal = Some(handle);
        self.initialized = true;
        debug!("worker initialized for task: payload={}", self.task.payload);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Executes the processor at most once. A repeated call is a no-op with
    /// a warning.
    pub async fn run(&mut self) {
        if !self.initialized {
            error!("worker must be initialized before it can be run");
            return;
        }
        if self.started || self.is_done() {
            warn!(
                "worker for task can only be run once: payload={} started={} done={}; ignoring",
                self.task.payload,
                self.started,
                self.is_done()
            );
            return;
        }
        self.started = true;
        let start = Instant::now();

        match self.processor.execute(&self.task).await {
            Ok(()) => {
                if let Err(err) = self.queue.delete_task(&self.task).await {
                    error!(
                        "failed to delete completed task: payload={} error={}",
                        self.task.payload, err
                    );
                }
                info!(
                    "completed task: payload={} attempts={} result=success elapsed_ms={}",
                    self.task.payload,
                    self.task.attempts,
                    start.elapsed().as_millis()
                );
            }
            Err(ProcessorError::Domain(reason)) => {
                // no explicit requeue: the task stays claimed until its
                // lease lapses, and redelivery is the retry path
                warn!(
                    "task failed: payload={} attempts={} result=failure elapsed_ms={} reason={}",
                    self.task.payload,
                    self.task.attempts,
                    start.elapsed().as_millis(),
                    reason
                );
            }
            Err(ProcessorError::Unexpected(err)) => {
                error!(
                    "unexpected error processing task: payload={} attempts={} elapsed_ms={} error={:?}",
                    self.task.payload,
                    self.task.attempts,
                    start.elapsed().as_millis(),
                    err
                );
            }
        }

        self.done.store(true, Ordering::SeqCst);
        if let Some(handle) = self.renewal.take() {
            handle.abort();
        }
        debug!("worker finished task: payload={}", self.task.payload);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        if let Some(handle) = self.renewal.take() {
            handle.abort();
        }
    }
}
