//! In-memory task queue with lease tracking, for tests and dry runs.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::queue::{QueueError, Task, TaskQueue};

struct Lease {
    task: Task,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    pending: VecDeque<Task>,
    /// Leased tasks keyed by payload; not visible to `take` until the lease
    /// lapses.
    leased: HashMap<String, Lease>,
    completed: u64,
    /// Receipt counter, bumped on every take. The receipt stamped on a
    /// delivered task must match the current lease for extend/delete to act.
    next_receipt: u64,
}

/// A single-process [`TaskQueue`] that emulates lease semantics: a taken
/// task stays invisible until its visibility timeout passes, after which it
/// is redelivered with the attempt counter bumped.
pub struct LocalTaskQueue {
    name: String,
    visibility_timeout: Duration,
    inner: Mutex<Inner>,
}

impl LocalTaskQueue {
    pub fn new(name: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            visibility_timeout,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub async fn completed_count(&self) -> u64 {
        self.inner.lock().await.completed
    }

    pub async fn in_flight_count(&self) -> usize {
        let mut inner = self.inner.lock().await;
        Self::reclaim_expired(&mut inner);
        inner.leased.len()
    }

    /// Moves tasks with lapsed leases back to the pending queue.
    fn reclaim_expired(inner: &mut Inner) {
        let now = Instant::now();
        let expired: Vec<String> = inner
            .leased
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            if let Some(lease) = inner.leased.remove(&key) {
                let mut task = lease.task;
                task.attempts += 1;
                warn!(
                    "lease expired, redelivering task: payload={} attempts={}",
                    task.payload, task.attempts
                );
                inner.pending.push_back(task);
            }
        }
    }
}

#[async_trait]
impl TaskQueue for LocalTaskQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, task: Task) -> Result<(), QueueError> {
        self.inner.lock().await.pending.push_back(task);
        Ok(())
    }

    async fn put_many(&self, tasks: Vec<Task>) -> Result<(), QueueError> {
        self.inner.lock().await.pending.extend(tasks);
        Ok(())
    }

    async fn size(&self) -> Result<usize, QueueError> {
        let mut inner = self.inner.lock().await;
        Self::reclaim_expired(&mut inner);
        Ok(inner.pending.len())
    }

    async fn take(&self) -> Result<Task, QueueError> {
        let mut inner = self.inner.lock().await;
        Self::reclaim_expired(&mut inner);
        match inner.pending.pop_front() {
            Some(mut task) => {
                task.visibility_timeout = self.visibility_timeout;
                inner.next_receipt += 1;
                task.receipt = inner.next_receipt;
                inner.leased.insert(
                    task.payload.clone(),
                    Lease {
                        task: task.clone(),
                        expires_at: Instant::now() + self.visibility_timeout,
                    },
                );
                Ok(task)
            }
            None => Err(QueueError::Timeout(format!(
                "no tasks available from queue {}",
                self.name
            ))),
        }
    }

    async fn extend_visibility(
        &self,
        task: &Task,
        timeout: Duration,
    ) -> Result<Duration, QueueError> {
        let mut inner = self.inner.lock().await;
        Self::reclaim_expired(&mut inner);
        match inner.leased.get_mut(&task.payload) {
            Some(lease) if lease.task.receipt == task.receipt => {
                lease.expires_at = Instant::now() + timeout;
                debug!("extended lease on task: payload={}", task.payload);
                Ok(timeout)
            }
            // a lease exists but under a newer receipt: the caller's lease
            // lapsed and the task was redelivered elsewhere
            _ => Err(QueueError::TaskNotFound(task.payload.clone())),
        }
    }

    async fn delete_task(&self, task: &Task) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        let owns_lease = inner
            .leased
            .get(&task.payload)
            .is_some_and(|lease| lease.task.receipt == task.receipt);
        if owns_lease {
            inner.leased.remove(&task.payload);
            inner.completed += 1;
            debug!("task complete: payload={}", task.payload);
        } else {
            debug!(
                "delete for task no longer held (already removed or redelivered): payload={}",
                task.payload
            );
        }
        Ok(())
    }
}
