//! Per-account run counters, purely observational.

use std::collections::HashMap;

use tracing::info;

/// Counters accumulated across nibbles and reset per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub items_added: u64,
    pub deletions_found: u64,
    pub duplicates_suppressed: u64,
}

impl RunStats {
    pub fn add(&mut self, other: &RunStats) {
        self.items_added += other.items_added;
        self.deletions_found += other.deletions_found;
        self.duplicates_suppressed += other.duplicates_suppressed;
    }

    pub fn reset(&mut self) {
        *self = RunStats::default();
    }
}

/// Tracks incremental per-account stats plus cumulative session totals.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    by_account: HashMap<String, RunStats>,
    cumulative: RunStats,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(&mut self, account_id: &str) -> &mut RunStats {
        self.by_account.entry(account_id.to_string()).or_default()
    }

    pub fn cumulative(&self) -> RunStats {
        self.cumulative
    }

    /// Logs incremental per-account stats and cumulative totals, then resets
    /// the incremental counters.
    pub fn log_session(&mut self) {
        let mut incremental = RunStats::default();
        for (account, stats) in &self.by_account {
            info!(
                "session stats by account (incremental): account={} added={} deletions={} duplicates_suppressed={}",
                account, stats.items_added, stats.deletions_found, stats.duplicates_suppressed
            );
            incremental.add(stats);
        }
        self.cumulative.add(&incremental);
        info!(
            "session stats (global cumulative): accounts={} added={} deletions={} duplicates_suppressed={}",
            self.by_account.len(),
            self.cumulative.items_added,
            self.cumulative.deletions_found,
            self.cumulative.duplicates_suppressed
        );
        for stats in self.by_account.values_mut() {
            stats.reset();
        }
    }
}
