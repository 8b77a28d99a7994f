//! Pluggable task-type business logic invoked by workers.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

use crate::queue::Task;

#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The processor understood the task but could not complete it. The task
    /// stays leased and retries via the queue's redelivery mechanism.
    #[error("task processing failed: {0}")]
    Domain(String),
    /// Anything else that escaped the processor.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// Executes one task. Implementations must tolerate duplicate execution
/// across redeliveries.
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    async fn execute(&self, task: &Task) -> Result<(), ProcessorError>;
}

/// Accepts every task after an optional simulated delay. Used for queue
/// round-trip smoke testing.
#[derive(Debug, Default)]
pub struct NoopTaskProcessor {
    delay: Duration,
}

impl NoopTaskProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl TaskProcessor for NoopTaskProcessor {
    async fn execute(&self, task: &Task) -> Result<(), ProcessorError> {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        debug!("noop processed task: payload={}", task.payload);
        Ok(())
    }
}
