//! Bounded-concurrency task consumer.
//!
//! A single puller blocks on the queue and hands each task to a freshly
//! initialized [`Worker`] on the shared runtime, holding a semaphore permit
//! per in-flight worker so memory stays O(max_workers) regardless of
//! producer rate.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::processor::TaskProcessor;
use crate::queue::{QueueError, TaskQueue};
use crate::worker::Worker;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Max concurrently executing workers.
    pub max_workers: usize,
    /// Initial wait after an empty take; doubles up to `max_take_wait`.
    pub min_take_wait: Duration,
    pub max_take_wait: Duration,
    /// Sleep when all worker slots are occupied.
    pub saturation_backoff: Duration,
    pub status_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            min_take_wait: Duration::from_secs(1),
            max_take_wait: Duration::from_secs(30),
            saturation_backoff: Duration::from_secs(1),
            status_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Pulls tasks and runs them on at most `max_workers` concurrent workers,
/// backing off when the queue is empty or the pool is saturated.
pub struct WorkerPool {
    queue: Arc<dyn TaskQueue>,
    processor: Arc<dyn TaskProcessor>,
    cfg: WorkerPoolConfig,
    permits: Arc<Semaphore>,
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicU64>,
    puller: Option<JoinHandle<()>>,
    status: Option<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        processor: Arc<dyn TaskProcessor>,
        cfg: WorkerPoolConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(cfg.max_workers));
        Self {
            queue,
            processor,
            cfg,
            permits,
            stop: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicU64::new(0)),
            puller: None,
            status: None,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.cfg.max_workers
    }

    pub fn active_workers(&self) -> usize {
        self.cfg.max_workers - self.permits.available_permits()
    }

    /// Workers that have finished running, successfully or not.
    pub fn finished_count(&self) -> u64 {
        self.finished.load(Ordering::SeqCst)
    }

    /// Starts the puller and the periodic status log.
    pub fn start(&mut self) {
        let puller = tokio::spawn(Self::pull_loop(
            self.queue.clone(),
            self.processor.clone(),
            self.permits.clone(),
            self.stop.clone(),
            self.finished.clone(),
            self.cfg.clone(),
        ));
        let status = tokio::spawn(Self::status_loop(
            self.queue.clone(),
            self.permits.clone(),
            self.finished.clone(),
            self.cfg.clone(),
        ));
        self.puller = Some(puller);
        self.status = Some(status);
        info!("worker pool started: max_workers={}", self.cfg.max_workers);
    }

    async fn pull_loop(
        queue: Arc<dyn TaskQueue>,
        processor: Arc<dyn TaskProcessor>,
        permits: Arc<Semaphore>,
        stop: Arc<AtomicBool>,
        finished: Arc<AtomicU64>,
        cfg: WorkerPoolConfig,
    ) {
        let mut wait = cfg.min_take_wait;
        while !stop.load(Ordering::SeqCst) {
            let permit = match permits.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    debug!("pool saturated, backing off");
                    sleep(cfg.saturation_backoff).await;
                    continue;
                }
            };
            match queue.take().await {
                Ok(task) => {
                    wait = cfg.min_take_wait;
                    let mut worker = Worker::new(task, queue.clone(), processor.clone());
                    worker.initialize();
                    let finished = finished.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        worker.run().await;
                        finished.fetch_add(1, Ordering::SeqCst);
                    });
                }
                Err(QueueError::Timeout(_)) => {
                    drop(permit);
                    debug!("queue {} is empty, waiting {:?}", queue.name(), wait);
                    sleep(wait).await;
                    wait = (wait * 2).min(cfg.max_take_wait);
                }
                Err(err) => {
                    drop(permit);
                    error!("unexpected failure pulling from queue: {err}");
                    sleep(wait).await;
                }
            }
        }
    }

    async fn status_loop(
        queue: Arc<dyn TaskQueue>,
        permits: Arc<Semaphore>,
        finished: Arc<AtomicU64>,
        cfg: WorkerPoolConfig,
    ) {
        let mut ticker = interval(cfg.status_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let size = match queue.size().await {
                Ok(size) => size.to_string(),
                Err(_) => "unknown".to_string(),
            };
            info!(
                "status: max_workers={} active_workers={} finished_workers={} {}_q_size={}",
                cfg.max_workers,
                cfg.max_workers - permits.available_permits(),
                finished.load(Ordering::SeqCst),
                queue.name(),
                size
            );
        }
    }

    /// Cooperative shutdown: stop pulling new work, then wait for in-flight
    /// workers to finish. Nothing is interrupted.
    pub async fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.puller.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.status.take() {
            handle.abort();
        }
        info!("terminating... waiting for workers to complete processing");
        while self.permits.available_permits() < self.cfg.max_workers {
            sleep(Duration::from_millis(100)).await;
        }
        info!("terminated");
    }
}
