//! Looping scan-and-produce scheduler.
//!
//! Fills the task queue by sweeping all morsels discovered from a live
//! policy source, one bounded nibble at a time, checkpointing durable state
//! after every nibble. The producer respects a maximum task queue size: once
//! the ceiling is reached it stops and the next invocation resumes where it
//! left off. If the whole sweep completes within one invocation, the next
//! run is scheduled one frequency interval out.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::frequency::Frequency;
use crate::morsel::{Morsel, MorselQueue};
use crate::path_filter::PathFilter;
use crate::queue::{QueueError, Task, TaskQueue};
use crate::state::StateManager;
use crate::stats::{RunStats, StatsRegistry};

/// Result of one bounded unit of scanning work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NibbleOutcome {
    /// Nothing left in this morsel; it is dropped from the working set.
    Exhausted,
    /// More remains; the next nibble resumes from `marker`.
    Partial { marker: String },
}

/// How a producer invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The next run is not yet due; nothing was done.
    NotDue,
    /// The sweep finished and the next run was scheduled.
    Completed,
    /// The queue ceiling was reached mid-sweep; state was left resumable.
    Backpressured,
}

#[derive(Debug, Error)]
pub enum RunError {
    /// Discovery or scan failure. The whole run fails loudly; silently
    /// skipping an account's scan is worse than a visible failure.
    #[error("run aborted: {0}")]
    Aborted(#[source] anyhow::Error),
    #[error("task queue error: {0}")]
    Queue(#[from] QueueError),
    /// State could not be flushed; continuing would compromise resumability.
    #[error("state persistence failed: {0}")]
    State(#[source] anyhow::Error),
}

/// The two domain-specific halves of a concrete producer: enumerating live
/// scan targets and performing one bounded unit of work against a morsel.
#[async_trait]
pub trait ScanStrategy: Send + Sync {
    /// Enumerate the live account/space/policy source.
    async fn discover(&self) -> anyhow::Result<HashSet<Morsel>>;

    /// Perform one bounded unit of work, emitting tasks through `sink`.
    ///
    /// Expected absences (a space deleted since discovery) are handled here
    /// by emitting a compensating task and reporting `Exhausted`, not by
    /// returning an error. A nibble whose every task was suppressed as a
    /// run-scoped duplicate counts as no new work and should also report
    /// `Exhausted`.
    async fn nibble(
        &self,
        morsel: &mut Morsel,
        sink: &mut TaskSink<'_>,
        stats: &mut RunStats,
    ) -> anyhow::Result<NibbleOutcome>;

    /// Whether the account backing a morsel is still active. Inactive
    /// accounts are abandoned before their first nibble; started morsels
    /// are allowed to finish.
    async fn account_active(&self, _account_id: &str) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Run-scoped deduplicating front to the task queue: payloads already
/// enqueued in the current run are suppressed.
pub struct TaskSink<'a> {
    queue: &'a dyn TaskQueue,
    seen: &'a mut HashSet<String>,
}

impl TaskSink<'_> {
    /// Enqueues the tasks not yet seen this run; returns how many were
    /// actually enqueued.
    pub async fn put_all(&mut self, tasks: Vec<Task>) -> Result<usize, QueueError> {
        let mut fresh = Vec::new();
        for task in tasks {
            if self.seen.insert(task.payload.clone()) {
                fresh.push(task);
            }
        }
        let added = fresh.len();
        if !fresh.is_empty() {
            self.queue.put_many(fresh).await?;
        }
        Ok(added)
    }

    pub async fn put(&mut self, task: Task) -> Result<usize, QueueError> {
        self.put_all(vec![task]).await
    }
}

enum Gate {
    NotDue,
    Resume,
    Fresh,
}

/// Generic scan-and-produce scheduler; single-threaded per run, with
/// checkpointed state substituting for concurrency-driven throughput.
pub struct LoopingProducer<S: ScanStrategy> {
    strategy: S,
    queue: Arc<dyn TaskQueue>,
    state: StateManager,
    max_task_queue_size: usize,
    frequency: Frequency,
    path_filter: PathFilter,
    stats: StatsRegistry,
}

impl<S: ScanStrategy> LoopingProducer<S> {
    pub fn new(
        strategy: S,
        queue: Arc<dyn TaskQueue>,
        state: StateManager,
        max_task_queue_size: usize,
        frequency: Frequency,
    ) -> Self {
        Self {
            strategy,
            queue,
            state,
            max_task_queue_size,
            frequency,
            path_filter: PathFilter::default(),
            stats: StatsRegistry::new(),
        }
    }

    /// Restricts the sweep to paths the filter includes; excluded morsels
    /// are dropped from the working set without being nibbled.
    pub fn with_path_filter(mut self, filter: PathFilter) -> Self {
        self.path_filter = filter;
        self
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn cumulative_stats(&self) -> RunStats {
        self.stats.cumulative()
    }

    /// One producer invocation: gate, sweep until done or the queue ceiling
    /// is hit, and schedule the next run on completion.
    pub async fn run(&mut self) -> Result<RunOutcome, RunError> {
        let mut working = match self.gate()? {
            Gate::NotDue => return Ok(RunOutcome::NotDue),
            Gate::Resume => {
                // resume mid-sweep from persisted morsels only; the live
                // source is not re-consulted until the next fresh run
                let mut working = MorselQueue::new();
                working.extend(self.state.morsels());
                working
            }
            Gate::Fresh => {
                let working = self.seed_working_queue().await?;
                // persisted before the first nibble so a fresh run that hits
                // the queue ceiling immediately is still resumable
                self.persist(&working, &[])?;
                working
            }
        };

        let mut reload: Vec<Morsel> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        loop {
            if working.is_empty() {
                if reload.is_empty() {
                    break;
                }
                working.extend(reload.drain(..));
            }

            // soft ceiling, checked before each nibble; a single nibble
            // batch may push the queue past it before the next check
            let queue_size = self.queue.size().await?;
            if queue_size >= self.max_task_queue_size {
                info!(
                    "task queue size ({}) has reached or exceeded max size ({}); pausing sweep",
                    queue_size, self.max_task_queue_size
                );
                break;
            }

            let mut morsel = match working.pop() {
                Some(morsel) => morsel,
                None => continue,
            };

            if self
                .path_filter
                .is_excluded(&morsel.account_id, &morsel.space_id, &morsel.policy_ref)
            {
                info!(
                    "path /{}/{}/{} is excluded by the path filter; skipping morsel",
                    morsel.account_id, morsel.space_id, morsel.policy_ref
                );
                self.persist(&working, &reload)?;
                continue;
            }

            match self.strategy.account_active(&morsel.account_id).await {
                Ok(true) => {}
                Ok(false) if morsel.started() => {
                    warn!(
                        "account {} became inactive in the middle of processing {}/{}; \
                         allowing this morsel to finish",
                        morsel.account_id, morsel.space_id, morsel.policy_ref
                    );
                }
                Ok(false) => {
                    info!(
                        "account {} has become inactive; abandoning morsel {}/{}",
                        morsel.account_id, morsel.space_id, morsel.policy_ref
                    );
                    self.persist(&working, &reload)?;
                    continue;
                }
                Err(err) => return Err(RunError::Aborted(err)),
            }

            let mut sink = TaskSink {
                queue: self.queue.as_ref(),
                seen: &mut seen,
            };
            let stats = self.stats.account(&morsel.account_id);
            match self.strategy.nibble(&mut morsel, &mut sink, stats).await {
                Ok(NibbleOutcome::Exhausted) => {
                    info!(
                        "morsel completely nibbled: account={} space={} policy={}",
                        morsel.account_id, morsel.space_id, morsel.policy_ref
                    );
                }
                Ok(NibbleOutcome::Partial { marker }) => {
                    morsel.marker = Some(marker);
                    reload.push(morsel);
                }
                Err(err) => return Err(RunError::Aborted(err)),
            }

            // the sole durability checkpoint: a crash between nibbles loses
            // at most one bounded unit of work
            self.persist(&working, &reload)?;
        }

        self.stats.log_session();

        if working.is_empty() && reload.is_empty() {
            // a zero frequency disables scheduling: the run that is in
            // progress finishes, and no future run is ever queued up
            let next = if self.frequency.value() > 0 {
                Some(self.frequency.next_from(Utc::now()))
            } else {
                None
            };
            self.state
                .set_current_run_start(None)
                .map_err(RunError::State)?;
            self.state
                .set_next_run_start(next)
                .map_err(RunError::State)?;
            match next {
                Some(next) => info!("run complete; next run scheduled for {}", next),
                None => info!(
                    "run complete; the frequency is {}: no future runs will be scheduled",
                    self.frequency
                ),
            }
            Ok(RunOutcome::Completed)
        } else {
            Ok(RunOutcome::Backpressured)
        }
    }

    fn gate(&mut self) -> Result<Gate, RunError> {
        if let Some(started) = self.state.current_run_start() {
            info!("continuing the current run, which started on {}", started);
            return Ok(Gate::Resume);
        }
        if self.frequency.value() == 0 {
            if self.state.next_run_start().is_some() {
                info!(
                    "the frequency is {}: all scheduled runs will be cancelled",
                    self.frequency
                );
                self.state
                    .set_next_run_start(None)
                    .map_err(RunError::State)?;
            } else {
                info!(
                    "the frequency is {}: no future runs will be scheduled",
                    self.frequency
                );
            }
            return Ok(Gate::NotDue);
        }
        let now = Utc::now();
        if let Some(next) = self.state.next_run_start() {
            if now < next {
                info!(
                    "not yet time to start a new run: the next run is scheduled for {}",
                    next
                );
                return Ok(Gate::NotDue);
            }
        }
        self.state
            .set_current_run_start(Some(now))
            .map_err(RunError::State)?;
        self.state
            .set_next_run_start(None)
            .map_err(RunError::State)?;
        info!("starting a new run at {}", now);
        Ok(Gate::Fresh)
    }

    /// Seeds a fresh run: the live source merged with leftover persisted
    /// morsels by identity. Persisted morsels win, since they carry markers.
    async fn seed_working_queue(&mut self) -> Result<MorselQueue, RunError> {
        let discovered = self.strategy.discover().await.map_err(RunError::Aborted)?;
        let mut merged = self.state.morsels();
        for morsel in discovered {
            if !merged.contains(&morsel) {
                merged.insert(morsel);
            }
        }
        let mut working = MorselQueue::new();
        working.extend(merged);
        Ok(working)
    }

    fn persist(&mut self, working: &MorselQueue, reload: &[Morsel]) -> Result<(), RunError> {
        let mut morsels: HashSet<Morsel> = working.iter().cloned().collect();
        morsels.extend(reload.iter().cloned());
        self.state.set_morsels(morsels).map_err(RunError::State)
    }
}
