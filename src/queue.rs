//! The task-queue contract connecting producers and workers.

use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A queued unit of work.
///
/// Equality and hashing cover only the payload, so duplicate submissions
/// within one producer run collapse to a single task. The lease window and
/// attempt counter are queue-assigned delivery metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub payload: String,
    /// Lease window assigned by the queue at dequeue time.
    #[serde(default)]
    pub visibility_timeout: Duration,
    /// Redelivery attempt counter, incremented by the queue when a lease
    /// lapses and the task becomes visible again.
    #[serde(default)]
    pub attempts: u32,
    /// Delivery receipt identifying one lease generation, assigned by the
    /// queue at dequeue time. Extend and delete calls are validated against
    /// the receipt of the lease currently in effect, so a worker holding a
    /// lapsed lease cannot touch a redelivered copy of the same task.
    #[serde(default)]
    pub receipt: u64,
}

impl Task {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            visibility_timeout: Duration::ZERO,
            attempts: 0,
            receipt: 0,
        }
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
    }
}

impl Eq for Task {}

impl Hash for Task {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.payload.hash(state);
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    /// The task is no longer owned: already deleted, or its lease expired
    /// and it was redelivered elsewhere.
    #[error("task not found: {0}")]
    TaskNotFound(String),
    /// No task became available within the take window.
    #[error("take timed out: {0}")]
    Timeout(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Durable, at-least-once work-item transport.
///
/// Implementations must support concurrent producers and consumers across
/// processes. A dequeued task is never delivered twice while its lease is
/// active; redelivery after lease expiry is the retry mechanism.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    fn name(&self) -> &str;

    /// At-least-once enqueue; safe to call from multiple producers.
    async fn put(&self, task: Task) -> Result<(), QueueError>;

    async fn put_many(&self, tasks: Vec<Task>) -> Result<(), QueueError> {
        for task in tasks {
            self.put(task).await?;
        }
        Ok(())
    }

    /// Cheap, approximate pending count; used only for backpressure gating,
    /// never for exact accounting.
    async fn size(&self) -> Result<usize, QueueError>;

    /// Dequeue one task under a fresh lease. `Timeout` when nothing is
    /// available.
    async fn take(&self) -> Result<Task, QueueError>;

    /// Idempotent lease renewal; returns the lease window now in effect.
    /// Fails with `TaskNotFound` when `task` no longer holds the active
    /// lease: already deleted, or lapsed and redelivered under a newer
    /// receipt.
    async fn extend_visibility(
        &self,
        task: &Task,
        timeout: Duration,
    ) -> Result<Duration, QueueError>;

    /// Idempotent completion acknowledgment. A stale call (the lease has
    /// since lapsed and the task was redelivered) succeeds without touching
    /// the new owner's lease.
    async fn delete_task(&self, task: &Task) -> Result<(), QueueError>;
}
