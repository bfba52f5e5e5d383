use std::marker::PhantomData;

use tracing::debug;

use super::diff_states;
use super::ResourceState;
use super::Snapshot;
use super::SnapshotDiff;
use crate::Result;
use crate::ScopedStore;
use crate::ValidationError;

/// Result of replacing the persisted snapshot with a fresh one
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<S> {
    /// Nothing was persisted before: no diff is computed
    Initialized(Snapshot<S>),
    /// The fresh snapshot differs from the persisted one
    Changed {
        previous: Snapshot<S>,
        snapshot: Snapshot<S>,
        diff: SnapshotDiff<S>,
    },
    Unchanged(Snapshot<S>),
}

impl<S> PollOutcome<S> {
    pub fn snapshot(&self) -> &Snapshot<S> {
        match self {
            PollOutcome::Initialized(s) => s,
            PollOutcome::Changed { snapshot, .. } => snapshot,
            PollOutcome::Unchanged(s) => s,
        }
    }
}

/// Keeps the last observed snapshot of one watcher under a single key.
///
/// `observe` swaps the persisted snapshot for the fresh one inside one atomic
/// update and diffs against exactly what was replaced, so overlapping ticks
/// never compare against a stale baseline.
#[derive(Debug, Clone)]
pub struct SnapshotTracker<S> {
    store: ScopedStore,
    key: String,
    _state: PhantomData<fn() -> S>,
}

impl<S: ResourceState> SnapshotTracker<S> {
    pub fn new(
        store: ScopedStore,
        key: impl Into<String>,
    ) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(ValidationError::InvalidKey(key).into());
        }
        Ok(Self {
            store,
            key,
            _state: PhantomData,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Persisted snapshot, if any tick completed before
    pub fn current(&self) -> Result<Option<Snapshot<S>>> {
        self.store.get_typed(&self.key)
    }

    /// Persists `fresh` unconditionally and reports how it relates to the
    /// snapshot it replaced.
    pub fn observe(
        &self,
        fresh: Snapshot<S>,
    ) -> Result<PollOutcome<S>> {
        let (old, new) = self
            .store
            .update_typed(&self.key, None, |_| Ok(fresh.clone()))?;

        let outcome = match old {
            None => PollOutcome::Initialized(new),
            Some(old) => {
                let diff = diff_states(&old, &new);
                if diff.is_empty() {
                    PollOutcome::Unchanged(new)
                } else {
                    PollOutcome::Changed {
                        previous: old,
                        snapshot: new,
                        diff,
                    }
                }
            }
        };

        debug!(
            key = %self.key,
            initialized = matches!(outcome, PollOutcome::Initialized(_)),
            changed = matches!(outcome, PollOutcome::Changed { .. }),
            "snapshot observed"
        );
        Ok(outcome)
    }

    /// Inserts or replaces one entry of the persisted snapshot
    pub fn merge(
        &self,
        id: &str,
        state: S,
    ) -> Result<()> {
        self.store
            .update_typed(&self.key, Some(Snapshot::new()), |current| {
                let mut snapshot = current.unwrap_or_default();
                snapshot.insert(id.to_string(), state.clone());
                Ok(snapshot)
            })?;
        Ok(())
    }
}
