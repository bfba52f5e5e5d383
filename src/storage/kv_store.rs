//! Core persistence capability: a key-value store with an atomic
//! read-transform-write primitive.
//!
//! Every piece of shared mutable state in the engine (watcher snapshots and
//! dispatch queues) is mutated through [`KvStore::update`]. It is the only
//! mutual-exclusion mechanism: implementations must make it atomic per key.

use serde_json::Value;

use crate::Result;

/// Transform applied by [`KvStore::update`].
///
/// Receives the current value (or the caller-supplied default when the key is
/// absent) and returns the value to store. It may be invoked more than once for
/// a single `update` call and must not have externally observable side effects.
/// Returning an error aborts the update without writing anything.
pub type Updater<'a> = dyn FnMut(Option<Value>) -> Result<Value> + 'a;

pub trait KvStore: Send + Sync + 'static {
    fn get(
        &self,
        key: &str,
    ) -> Result<Option<Value>>;

    fn set(
        &self,
        key: &str,
        value: Value,
    ) -> Result<()>;

    /// Removes `key`; deleting an absent key is not an error
    fn del(
        &self,
        key: &str,
    ) -> Result<()>;

    /// Lists every stored key starting with `prefix`
    fn list(
        &self,
        prefix: &str,
    ) -> Result<Vec<String>>;

    /// Atomically reads `key`, applies `updater` and writes the result.
    ///
    /// Returns `(old, new)` where `old` is the stored value before the update
    /// (`None` when the key was absent, even if a default was supplied).
    fn update(
        &self,
        key: &str,
        default: Option<Value>,
        updater: &mut Updater<'_>,
    ) -> Result<(Option<Value>, Value)>;

    /// Flushes buffered writes, returning the number of bytes written when known
    fn flush(&self) -> Result<usize> {
        Ok(0)
    }
}
