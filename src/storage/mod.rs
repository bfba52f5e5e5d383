//! Persistence layer: the [`KvStore`] capability, its memory and sled
//! backends, and the namespaced [`ScopedStore`] view used by every watcher
//! and dispatcher.
mod adaptors;
mod kv_store;
mod scoped_store;

pub use adaptors::*;
pub use kv_store::*;
pub use scoped_store::*;


use std::sync::Arc;

use tracing::info;

use crate::Result;
use crate::StorageBackend;
use crate::StorageConfig;

/// Builds the backend selected by `config.backend`
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn KvStore>> {
    info!(backend = ?config.backend, "opening kv store");
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemKvStore::new())),
        StorageBackend::Sled => {
            let db = init_sled_kv_db(config)?;
            Ok(Arc::new(SledKvStore::new(Arc::new(db))?))
        }
    }
}
