use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::Error;
use crate::KvStore;
use crate::MemKvStore;
use crate::Result;
use crate::StorageError;
use crate::Updater;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

pub fn mem_store() -> Arc<dyn KvStore> {
    Arc::new(MemKvStore::new())
}

/// Store whose every write fails; reads see an empty store
#[derive(Debug, Default)]
pub struct FailingStore;

impl KvStore for FailingStore {
    fn get(
        &self,
        _key: &str,
    ) -> Result<Option<serde_json::Value>> {
        Ok(None)
    }

    fn set(
        &self,
        key: &str,
        _value: serde_json::Value,
    ) -> Result<()> {
        Err(Error::from(StorageError::DbError(format!("write to {key} refused"))))
    }

    fn del(
        &self,
        _key: &str,
    ) -> Result<()> {
        Ok(())
    }

    fn list(
        &self,
        _prefix: &str,
    ) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn update(
        &self,
        key: &str,
        _default: Option<serde_json::Value>,
        _updater: &mut Updater<'_>,
    ) -> Result<(Option<serde_json::Value>, serde_json::Value)> {
        Err(Error::from(StorageError::DbError(format!("update of {key} refused"))))
    }
}

/// In-memory store whose atomic updates fail for a window of calls.
///
/// The first `skip` updates succeed, the next `failures` fail, and every
/// later one succeeds again.
#[derive(Debug)]
pub struct FlakyStore {
    inner: MemKvStore,
    skip: usize,
    failures: usize,
    updates: AtomicUsize,
}

impl FlakyStore {
    pub fn new(
        skip: usize,
        failures: usize,
    ) -> Self {
        Self {
            inner: MemKvStore::new(),
            skip,
            failures,
            updates: AtomicUsize::new(0),
        }
    }

    /// Number of update calls seen so far, failed ones included
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

impl KvStore for FlakyStore {
    fn get(
        &self,
        key: &str,
    ) -> Result<Option<serde_json::Value>> {
        self.inner.get(key)
    }

    fn set(
        &self,
        key: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        self.inner.set(key, value)
    }

    fn del(
        &self,
        key: &str,
    ) -> Result<()> {
        self.inner.del(key)
    }

    fn list(
        &self,
        prefix: &str,
    ) -> Result<Vec<String>> {
        self.inner.list(prefix)
    }

    fn update(
        &self,
        key: &str,
        default: Option<serde_json::Value>,
        updater: &mut Updater<'_>,
    ) -> Result<(Option<serde_json::Value>, serde_json::Value)> {
        let call = self.updates.fetch_add(1, Ordering::SeqCst);
        if call >= self.skip && call < self.skip + self.failures {
            return Err(Error::from(StorageError::DbError(format!("update {call} of {key} refused"))));
        }
        self.inner.update(key, default, updater)
    }
}
