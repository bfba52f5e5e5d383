use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::constants::KV_TREE;
use crate::Error;
use crate::KvStore;
use crate::Result;
use crate::StorageError;
use crate::Updater;

/// Bound on compare-and-swap rounds for one `update` call
const MAX_CAS_ATTEMPTS: usize = 1024;

/// Sled-backed key-value store
///
/// Values are stored as JSON bytes. `update` runs a compare-and-swap loop:
/// the updater is re-applied to the freshly read value whenever a concurrent
/// writer won the race, so no update is ever lost.
#[derive(Clone)]
pub struct SledKvStore {
    db: Arc<sled::Db>,
    tree: Arc<sled::Tree>,
}

impl std::fmt::Debug for SledKvStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledKvStore").field("tree_len", &self.tree.len()).finish()
    }
}

impl SledKvStore {
    pub fn new(db: Arc<sled::Db>) -> Result<Self> {
        let tree = db.open_tree(KV_TREE)?;
        debug!(tree = KV_TREE, len = tree.len(), "opened sled kv tree");
        Ok(SledKvStore {
            db,
            tree: Arc::new(tree),
        })
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    fn decode(
        key: &str,
        bytes: &[u8],
    ) -> Result<Value> {
        serde_json::from_slice(bytes).map_err(|e| {
            StorageError::DataCorruption {
                key: key.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

impl KvStore for SledKvStore {
    fn get(
        &self,
        key: &str,
    ) -> Result<Option<Value>> {
        match self.tree.get(key)? {
            Some(ivec) => Ok(Some(Self::decode(key, &ivec)?)),
            None => Ok(None),
        }
    }

    fn set(
        &self,
        key: &str,
        value: Value,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(&value)?;
        self.tree.insert(key, bytes)?;
        Ok(())
    }

    fn del(
        &self,
        key: &str,
    ) -> Result<()> {
        self.tree.remove(key)?;
        Ok(())
    }

    fn list(
        &self,
        prefix: &str,
    ) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for item in self.tree.scan_prefix(prefix) {
            let (k, _) = item?;
            keys.push(String::from_utf8_lossy(&k).into_owned());
        }
        Ok(keys)
    }

    fn update(
        &self,
        key: &str,
        default: Option<Value>,
        updater: &mut Updater<'_>,
    ) -> Result<(Option<Value>, Value)> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self.tree.get(key)?;
            let old = match &current {
                Some(ivec) => Some(Self::decode(key, ivec)?),
                None => None,
            };

            let new = updater(old.clone().or_else(|| default.clone()))?;
            let bytes = serde_json::to_vec(&new)?;

            match self.tree.compare_and_swap(key, current, Some(bytes))? {
                Ok(()) => {
                    trace!(key, attempt, "sled kv updated");
                    return Ok((old, new));
                }
                Err(_) => {
                    trace!(key, attempt, "compare_and_swap lost the race, retrying");
                }
            }
        }

        warn!(key, "update did not converge after {} attempts", MAX_CAS_ATTEMPTS);
        Err(Error::from(StorageError::UpdateContention(key.to_string())))
    }

    fn flush(&self) -> Result<usize> {
        Ok(self.db.flush()?)
    }
}
