//! Morsels: resumable units of scan progress, and their priority ordering.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// One account/space/policy scan unit plus its cursor into the content
/// listing.
///
/// Identity (equality and hashing) covers only `account_id`, `space_id` and
/// `policy_ref`. The cursor fields are excluded so a morsel rediscovered from
/// the live policy source is recognized as the same unit already present in
/// persisted state, however far its marker has advanced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Morsel {
    pub account_id: String,
    pub space_id: String,
    /// Opaque description of the work to derive, e.g. a source/destination
    /// store pair.
    pub policy_ref: String,
    /// Cursor into the content listing; `None` until the first nibble.
    #[serde(default)]
    pub marker: Option<String>,
    /// One-shot flag for the pre-pass reconciliation step.
    #[serde(default)]
    pub delete_performed: bool,
}

impl Morsel {
    pub fn new(
        account_id: impl Into<String>,
        space_id: impl Into<String>,
        policy_ref: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            space_id: space_id.into(),
            policy_ref: policy_ref.into(),
            marker: None,
            delete_performed: false,
        }
    }

    /// A morsel is started once its first nibble has advanced the marker.
    pub fn started(&self) -> bool {
        self.marker.is_some()
    }
}

impl PartialEq for Morsel {
    fn eq(&self, other: &Self) -> bool {
        self.account_id == other.account_id
            && self.space_id == other.space_id
            && self.policy_ref == other.policy_ref
    }
}

impl Eq for Morsel {}

impl Hash for Morsel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.account_id.hash(state);
        self.space_id.hash(state);
        self.policy_ref.hash(state);
    }
}

/// Priority order for the working queue. `Less` pops first.
///
/// Started morsels sort before unstarted ones (finishing started work beats
/// starting new work), then space_id and account_id ascending. policy_ref
/// breaks remaining ties so the order is total: distinct morsels never
/// compare equal.
pub fn priority_cmp(a: &Morsel, b: &Morsel) -> Ordering {
    match (a.started(), b.started()) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }
    a.space_id
        .cmp(&b.space_id)
        .then_with(|| a.account_id.cmp(&b.account_id))
        .then_with(|| a.policy_ref.cmp(&b.policy_ref))
}

#[derive(Debug, Clone)]
struct Prioritized(Morsel);

impl PartialEq for Prioritized {
    fn eq(&self, other: &Self) -> bool {
        priority_cmp(&self.0, &other.0) == Ordering::Equal
    }
}

impl Eq for Prioritized {}

impl PartialOrd for Prioritized {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Prioritized {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the highest-priority
        // (smallest) morsel pops first.
        priority_cmp(&other.0, &self.0)
    }
}

/// Working priority queue of morsels, ordered by [`priority_cmp`].
#[derive(Debug, Default)]
pub struct MorselQueue {
    heap: BinaryHeap<Prioritized>,
}

impl MorselQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, morsel: Morsel) {
        self.heap.push(Prioritized(morsel));
    }

    pub fn pop(&mut self) -> Option<Morsel> {
        self.heap.pop().map(|p| p.0)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Unordered view of the queued morsels.
    pub fn iter(&self) -> impl Iterator<Item = &Morsel> {
        self.heap.iter().map(|p| &p.0)
    }
}

impl Extend<Morsel> for MorselQueue {
    fn extend<T: IntoIterator<Item = Morsel>>(&mut self, iter: T) {
        self.heap.extend(iter.into_iter().map(Prioritized));
    }
}
