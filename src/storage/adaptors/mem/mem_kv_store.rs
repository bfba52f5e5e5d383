use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

use crate::KvStore;
use crate::Result;
use crate::Updater;

/// In-memory key-value store
///
/// `update` holds the map lock for the whole read-transform-write, which makes
/// it atomic with respect to every other operation on the store.
#[derive(Debug, Default)]
pub struct MemKvStore {
    data: Mutex<BTreeMap<String, Value>>,
}

impl MemKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemKvStore {
    fn get(
        &self,
        key: &str,
    ) -> Result<Option<Value>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn set(
        &self,
        key: &str,
        value: Value,
    ) -> Result<()> {
        self.data.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn del(
        &self,
        key: &str,
    ) -> Result<()> {
        self.data.lock().remove(key);
        Ok(())
    }

    fn list(
        &self,
        prefix: &str,
    ) -> Result<Vec<String>> {
        let data = self.data.lock();
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn update(
        &self,
        key: &str,
        default: Option<Value>,
        updater: &mut Updater<'_>,
    ) -> Result<(Option<Value>, Value)> {
        let mut data = self.data.lock();
        let old = data.get(key).cloned();
        let new = updater(old.clone().or(default))?;
        data.insert(key.to_string(), new.clone());
        trace!(key, "mem store updated");
        Ok((old, new))
    }
}
