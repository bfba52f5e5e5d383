use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Last-observed mapping of resource id to resource state
pub type Snapshot<S> = BTreeMap<String, S>;

/// State record of one remote resource.
///
/// Each resource kind decides what counts as a change. There is no blanket
/// implementation based on `PartialEq`.
pub trait ResourceState: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn same_as(
        &self,
        other: &Self,
    ) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotDiff<S> {
    /// New states of ids only present in the new snapshot
    pub additions: Vec<S>,
    /// New states of ids present in both snapshots but not the same
    pub modifications: Vec<S>,
    /// Old states of ids only present in the old snapshot
    pub removals: Vec<S>,
    /// Ids present in both snapshots and the same
    pub unchanged: Vec<String>,
}

impl<S> Default for SnapshotDiff<S> {
    fn default() -> Self {
        Self {
            additions: Vec::new(),
            modifications: Vec::new(),
            removals: Vec::new(),
            unchanged: Vec::new(),
        }
    }
}

impl<S> SnapshotDiff<S> {
    pub fn change_count(&self) -> usize {
        self.additions.len() + self.modifications.len() + self.removals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.change_count() == 0
    }
}

/// Compares two snapshots with a resource-specific equality predicate.
///
/// Every id of `old ∪ new` lands in exactly one of the four partitions.
pub fn diff<S, F>(
    old: &Snapshot<S>,
    new: &Snapshot<S>,
    same: F,
) -> SnapshotDiff<S>
where
    S: Clone,
    F: Fn(&S, &S) -> bool,
{
    let mut result = SnapshotDiff::default();

    for (id, current) in new {
        match old.get(id) {
            Some(previous) if same(previous, current) => result.unchanged.push(id.clone()),
            Some(_) => result.modifications.push(current.clone()),
            None => result.additions.push(current.clone()),
        }
    }

    for (id, previous) in old {
        if !new.contains_key(id) {
            result.removals.push(previous.clone());
        }
    }

    result
}

/// [`diff`] using the kind's own [`ResourceState::same_as`]
pub fn diff_states<S: ResourceState>(
    old: &Snapshot<S>,
    new: &Snapshot<S>,
) -> SnapshotDiff<S> {
    diff(old, new, |a, b| a.same_as(b))
}
