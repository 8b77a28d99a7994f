//! Tests for morsel identity and working-queue priority order.

use std::collections::HashSet;

use taskmill::morsel::{priority_cmp, Morsel, MorselQueue};

fn started(account: &str, space: &str, marker: &str) -> Morsel {
    let mut m = Morsel::new(account, space, "primary->replica");
    m.marker = Some(marker.to_string());
    m
}

// ============================================================================
// Identity Tests
// ============================================================================

#[test]
fn test_identity_ignores_marker() {
    let fresh = Morsel::new("alpha", "images", "primary->replica");
    let advanced = started("alpha", "images", "content-004999");
    assert_eq!(fresh, advanced);
}

#[test]
fn test_identity_ignores_delete_performed() {
    let mut a = Morsel::new("alpha", "images", "primary->replica");
    let b = a.clone();
    a.delete_performed = true;
    assert_eq!(a, b);
}

#[test]
fn test_identity_distinguishes_policy_ref() {
    let a = Morsel::new("alpha", "images", "primary->replica");
    let b = Morsel::new("alpha", "images", "primary->archive");
    assert_ne!(a, b);
}

#[test]
fn test_set_merge_dedups_by_identity() {
    let mut set: HashSet<Morsel> = HashSet::new();
    set.insert(started("alpha", "images", "content-001000"));

    // a rediscovered copy of the same unit must not displace the one
    // carrying a marker
    let inserted = set.insert(Morsel::new("alpha", "images", "primary->replica"));
    assert!(!inserted);
    assert_eq!(set.len(), 1);
    let survivor = set.iter().next().unwrap();
    assert_eq!(survivor.marker.as_deref(), Some("content-001000"));
}

#[test]
fn test_started_tracks_marker() {
    let mut m = Morsel::new("alpha", "images", "primary->replica");
    assert!(!m.started());
    m.marker = Some("content-000999".into());
    assert!(m.started());
}

// ============================================================================
// Priority Order Tests
// ============================================================================

#[test]
fn test_started_sorts_before_unstarted() {
    let s = started("zeta", "zz-space", "m");
    let u = Morsel::new("alpha", "aa-space", "primary->replica");
    assert_eq!(priority_cmp(&s, &u), std::cmp::Ordering::Less);
    assert_eq!(priority_cmp(&u, &s), std::cmp::Ordering::Greater);
}

#[test]
fn test_space_id_breaks_ties_before_account() {
    let a = Morsel::new("zeta", "aardvark", "p");
    let b = Morsel::new("alpha", "beta-space", "p");
    assert_eq!(priority_cmp(&a, &b), std::cmp::Ordering::Less);
}

#[test]
fn test_account_breaks_equal_space_ties() {
    let a = Morsel::new("alpha", "images", "p");
    let b = Morsel::new("beta", "images", "p");
    assert_eq!(priority_cmp(&a, &b), std::cmp::Ordering::Less);
}

#[test]
fn test_distinct_morsels_never_compare_equal() {
    let a = Morsel::new("alpha", "images", "primary->replica");
    let b = Morsel::new("alpha", "images", "primary->archive");
    assert_ne!(priority_cmp(&a, &b), std::cmp::Ordering::Equal);
}

#[test]
fn test_queue_pops_in_priority_order() {
    let mut queue = MorselQueue::new();
    queue.push(Morsel::new("beta", "images", "p"));
    queue.push(Morsel::new("alpha", "archive", "p"));
    queue.push(started("gamma", "zz-last", "content-000100"));
    queue.push(Morsel::new("alpha", "images", "p"));

    // started first, then space ascending, then account ascending
    let order: Vec<(String, String)> = std::iter::from_fn(|| queue.pop())
        .map(|m| (m.account_id, m.space_id))
        .collect();
    assert_eq!(
        order,
        vec![
            ("gamma".to_string(), "zz-last".to_string()),
            ("alpha".to_string(), "archive".to_string()),
            ("alpha".to_string(), "images".to_string()),
            ("beta".to_string(), "images".to_string()),
        ]
    );
}

#[test]
fn test_queue_extend_and_len() {
    let mut queue = MorselQueue::new();
    assert!(queue.is_empty());
    queue.extend(vec![
        Morsel::new("alpha", "images", "p"),
        Morsel::new("beta", "archive", "p"),
    ]);
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.iter().count(), 2);
}
