//! Tests for durable producer state persistence.

use std::collections::HashSet;
use std::fs;

use chrono::{TimeZone, Utc};
use taskmill::morsel::Morsel;
use taskmill::state::StateManager;
use tempfile::TempDir;

fn morsel(account: &str, space: &str, marker: Option<&str>) -> Morsel {
    let mut m = Morsel::new(account, space, "primary->replica");
    m.marker = marker.map(str::to_string);
    m
}

// ============================================================================
// Load Tests
// ============================================================================

#[test]
fn test_missing_file_starts_empty() {
    let dir = TempDir::new().unwrap();
    let mgr = StateManager::load(dir.path().join("state.json")).unwrap();
    assert!(mgr.morsels().is_empty());
    assert!(mgr.current_run_start().is_none());
    assert!(mgr.next_run_start().is_none());
}

#[test]
fn test_malformed_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    fs::write(&path, "{ this is not json").unwrap();
    assert!(StateManager::load(path).is_err());
}

#[test]
fn test_missing_optional_fields_default() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    // a morsel written before the cursor fields existed still loads
    fs::write(
        &path,
        r#"{"morsels":[{"account_id":"alpha","space_id":"images","policy_ref":"p"}],"current_run_start":null,"next_run_start":null}"#,
    )
    .unwrap();
    let mgr = StateManager::load(path).unwrap();
    let morsels = mgr.morsels();
    assert_eq!(morsels.len(), 1);
    let m = morsels.iter().next().unwrap();
    assert!(m.marker.is_none());
    assert!(!m.delete_performed);
}

// ============================================================================
// Flush Round-Trip Tests
// ============================================================================

#[test]
fn test_morsels_survive_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");

    let mut mgr = StateManager::load(&path).unwrap();
    let mut morsels = HashSet::new();
    morsels.insert(morsel("alpha", "images", Some("content-001000")));
    morsels.insert(morsel("beta", "archive", None));
    mgr.set_morsels(morsels.clone()).unwrap();

    let reloaded = StateManager::load(&path).unwrap();
    assert_eq!(reloaded.morsels(), morsels);
    let advanced = reloaded
        .morsels()
        .into_iter()
        .find(|m| m.account_id == "alpha")
        .unwrap();
    assert_eq!(advanced.marker.as_deref(), Some("content-001000"));
}

#[test]
fn test_timestamps_survive_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let started = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let next = Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap();

    let mut mgr = StateManager::load(&path).unwrap();
    mgr.set_current_run_start(Some(started)).unwrap();
    mgr.set_next_run_start(Some(next)).unwrap();

    let reloaded = StateManager::load(&path).unwrap();
    assert_eq!(reloaded.current_run_start(), Some(started));
    assert_eq!(reloaded.next_run_start(), Some(next));
}

#[test]
fn test_clearing_timestamps_persists() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");

    let mut mgr = StateManager::load(&path).unwrap();
    mgr.set_current_run_start(Some(Utc::now())).unwrap();
    mgr.set_current_run_start(None).unwrap();

    let reloaded = StateManager::load(&path).unwrap();
    assert!(reloaded.current_run_start().is_none());
}

#[test]
fn test_flush_creates_parent_dirs() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("deeper").join("state.json");
    let mut mgr = StateManager::load(&path).unwrap();
    mgr.set_morsels(HashSet::new()).unwrap();
    assert!(path.exists());
}

#[test]
fn test_no_leftover_temp_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let mut mgr = StateManager::load(&path).unwrap();
    mgr.set_next_run_start(Some(Utc::now())).unwrap();
    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());
}

// ============================================================================
// Snapshot Isolation Tests
// ============================================================================

#[test]
fn test_morsels_returns_snapshot() {
    let dir = TempDir::new().unwrap();
    let mut mgr = StateManager::load(dir.path().join("state.json")).unwrap();
    let mut set = HashSet::new();
    set.insert(morsel("alpha", "images", None));
    mgr.set_morsels(set).unwrap();

    let mut snapshot = mgr.morsels();
    snapshot.clear();
    assert_eq!(mgr.morsels().len(), 1);
}
