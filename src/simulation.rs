//! Synthetic sharded content source for dry runs and tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::morsel::Morsel;
use crate::producer::{NibbleOutcome, ScanStrategy, TaskSink};
use crate::queue::Task;
use crate::stats::RunStats;

type SpaceKey = (String, String);

/// In-memory stand-in for a sharded content store: accounts holding spaces
/// holding sorted content ids. Spaces can be removed and accounts
/// deactivated between runs to exercise the absence paths.
#[derive(Debug, Default)]
pub struct SimulatedStore {
    spaces: HashMap<SpaceKey, Vec<String>>,
    /// Content present only on the replica side; the pre-pass turns these
    /// into deletion tasks.
    replica_orphans: HashMap<SpaceKey, Vec<String>>,
    removed: HashSet<SpaceKey>,
    inactive_accounts: HashSet<String>,
}

impl SimulatedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_space(
        &mut self,
        account_id: impl Into<String>,
        space_id: impl Into<String>,
        mut content_ids: Vec<String>,
    ) {
        content_ids.sort();
        self.spaces
            .insert((account_id.into(), space_id.into()), content_ids);
    }

    pub fn add_replica_orphans(
        &mut self,
        account_id: impl Into<String>,
        space_id: impl Into<String>,
        content_ids: Vec<String>,
    ) {
        self.replica_orphans
            .insert((account_id.into(), space_id.into()), content_ids);
    }

    pub fn replica_orphans(&self, account_id: &str, space_id: &str) -> Vec<String> {
        self.replica_orphans
            .get(&(account_id.to_string(), space_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Marks a space deleted; it stays discoverable from persisted state but
    /// listing it reports absence.
    pub fn remove_space(&mut self, account_id: &str, space_id: &str) {
        self.removed
            .insert((account_id.to_string(), space_id.to_string()));
    }

    pub fn deactivate_account(&mut self, account_id: &str) {
        self.inactive_accounts.insert(account_id.to_string());
    }

    pub fn is_account_active(&self, account_id: &str) -> bool {
        !self.inactive_accounts.contains(account_id)
    }

    pub fn space_keys(&self) -> impl Iterator<Item = &SpaceKey> {
        self.spaces.keys()
    }

    /// Lists up to `limit` content ids after `marker` in listing order.
    /// `None` means the space does not exist (or was removed).
    pub fn list_chunk(
        &self,
        account_id: &str,
        space_id: &str,
        marker: Option<&str>,
        limit: usize,
    ) -> Option<Vec<String>> {
        let key = (account_id.to_string(), space_id.to_string());
        if self.removed.contains(&key) {
            return None;
        }
        let ids = self.spaces.get(&key)?;
        let start = match marker {
            Some(marker) => ids.partition_point(|id| id.as_str() <= marker),
            None => 0,
        };
        let end = (start + limit).min(ids.len());
        Some(ids[start..end].to_vec())
    }
}

/// Scan strategy over a [`SimulatedStore`]: discovery enumerates active
/// spaces under a fixed replication policy, and each nibble lists one
/// bounded chunk of content ids and derives one copy task per id.
pub struct SimulatedScanStrategy {
    store: Arc<RwLock<SimulatedStore>>,
    batch_size: usize,
    policy_ref: String,
}

impl SimulatedScanStrategy {
    pub fn new(store: Arc<RwLock<SimulatedStore>>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size,
            policy_ref: "primary->replica".to_string(),
        }
    }

    fn copy_task(&self, morsel: &Morsel, content_id: &str) -> Task {
        Task::new(format!(
            "copy:{}:{}:{}:{}",
            morsel.account_id, morsel.space_id, morsel.policy_ref, content_id
        ))
    }

    fn cleanup_task(&self, morsel: &Morsel) -> Task {
        Task::new(format!(
            "cleanup:{}:{}:{}",
            morsel.account_id, morsel.space_id, morsel.policy_ref
        ))
    }

    fn delete_task(&self, morsel: &Morsel, content_id: &str) -> Task {
        Task::new(format!(
            "delete:{}:{}:{}:{}",
            morsel.account_id, morsel.space_id, morsel.policy_ref, content_id
        ))
    }
}

#[async_trait]
impl ScanStrategy for SimulatedScanStrategy {
    async fn discover(&self) -> anyhow::Result<HashSet<Morsel>> {
        let store = self.store.read().await;
        Ok(store
            .space_keys()
            .filter(|(account_id, _)| store.is_account_active(account_id))
            .map(|(account_id, space_id)| Morsel::new(account_id, space_id, &self.policy_ref))
            .collect())
    }

    async fn account_active(&self, account_id: &str) -> anyhow::Result<bool> {
        Ok(self.store.read().await.is_account_active(account_id))
    }

    async fn nibble(
        &self,
        morsel: &mut Morsel,
        sink: &mut TaskSink<'_>,
        stats: &mut RunStats,
    ) -> anyhow::Result<NibbleOutcome> {
        let chunk = {
            let store = self.store.read().await;
            store.list_chunk(
                &morsel.account_id,
                &morsel.space_id,
                morsel.marker.as_deref(),
                self.batch_size,
            )
        };

        let chunk = match chunk {
            Some(chunk) => chunk,
            None => {
                // space gone since discovery: emit a destination-cleanup
                // task instead of treating this as an error
                info!(
                    "space not found on source: account={} space={}",
                    morsel.account_id, morsel.space_id
                );
                let added = sink.put_all(vec![self.cleanup_task(morsel)]).await?;
                stats.deletions_found += added as u64;
                return Ok(NibbleOutcome::Exhausted);
            }
        };

        // one-shot pre-pass: replica-only content becomes deletion tasks
        if !morsel.delete_performed {
            let orphans = {
                let store = self.store.read().await;
                store.replica_orphans(&morsel.account_id, &morsel.space_id)
            };
            if !orphans.is_empty() {
                let tasks: Vec<Task> = orphans
                    .iter()
                    .map(|id| self.delete_task(morsel, id))
                    .collect();
                let added = sink.put_all(tasks).await?;
                stats.deletions_found += added as u64;
            }
            morsel.delete_performed = true;
        }

        if chunk.is_empty() {
            return Ok(NibbleOutcome::Exhausted);
        }

        let last = chunk[chunk.len() - 1].clone();
        let submitted = chunk.len();
        let tasks: Vec<Task> = chunk.iter().map(|id| self.copy_task(morsel, id)).collect();
        let added = sink.put_all(tasks).await?;
        stats.items_added += added as u64;
        stats.duplicates_suppressed += (submitted - added) as u64;

        if added == 0 {
            // every id in this chunk was already queued this run
            return Ok(NibbleOutcome::Exhausted);
        }
        Ok(NibbleOutcome::Partial { marker: last })
    }
}
