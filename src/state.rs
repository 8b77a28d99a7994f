//! Durable producer state: outstanding morsels and run timestamps.

use std::collections::HashSet;
use std::{fs, io, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::morsel::Morsel;

/// Snapshot of everything a producer needs to resume after a restart.
///
/// At most one of the two timestamps is meaningfully active: a run is either
/// in progress (`current_run_start` set) or waiting for its next scheduled
/// start (`next_run_start` set).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct State {
    pub morsels: HashSet<Morsel>,
    pub current_run_start: Option<DateTime<Utc>>,
    pub next_run_start: Option<DateTime<Utc>>,
}

/// Loads and persists [`State`], flushing synchronously after every mutation.
/// Unflushed progress would mean duplicate or lost work on restart, so flush
/// failures propagate to the caller.
pub struct StateManager {
    path: PathBuf,
    state: State,
}

impl StateManager {
    /// A missing file starts with empty state; a file that exists but cannot
    /// be parsed is a fatal startup error, since state is load-bearing for
    /// resumability.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match fs::read(&path) {
            Ok(data) => serde_json::from_slice(&data).context("parsing state file")?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => State::default(),
            Err(err) => return Err(err).context("reading state file"),
        };
        Ok(Self { path, state })
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("creating state directory")?;
        }
        // write-then-rename keeps the previous state intact if the write dies
        let tmp = self.path.with_extension("tmp");
        let data = serde_json::to_vec_pretty(&self.state).context("serializing state")?;
        fs::write(&tmp, data).context("writing temp state file")?;
        fs::rename(&tmp, &self.path).context("replacing state file")?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot copy; mutating the returned set does not affect stored state
    /// until `set_morsels` is called again.
    pub fn morsels(&self) -> HashSet<Morsel> {
        self.state.morsels.clone()
    }

    pub fn set_morsels(&mut self, morsels: HashSet<Morsel>) -> Result<()> {
        self.state.morsels = morsels;
        self.flush()
    }

    pub fn current_run_start(&self) -> Option<DateTime<Utc>> {
        self.state.current_run_start
    }

    pub fn set_current_run_start(&mut self, time: Option<DateTime<Utc>>) -> Result<()> {
        self.state.current_run_start = time;
        self.flush()
    }

    pub fn next_run_start(&self) -> Option<DateTime<Utc>> {
        self.state.next_run_start
    }

    pub fn set_next_run_start(&mut self, time: Option<DateTime<Utc>>) -> Result<()> {
        self.state.next_run_start = time;
        self.flush()
    }
}
