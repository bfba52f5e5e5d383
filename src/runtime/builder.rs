//! A builder for [`Runtime`].
//!
//! ## Example
//! ```ignore
//! let runtime = Runtime::builder(Settings::new()?)
//!     .store(Arc::new(MemKvStore::new())) // Optional override
//!     .build()?;
//! let watcher = runtime.bucket_watcher("uploads", "media-bucket", lister)?;
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::Runtime;
use crate::open_store;
use crate::KvStore;
use crate::Result;
use crate::Settings;

pub struct RuntimeBuilder {
    settings: Settings,
    store: Option<Arc<dyn KvStore>>,
    shutdown: Option<CancellationToken>,
}

impl RuntimeBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            store: None,
            shutdown: None,
        }
    }

    /// Uses `store` instead of opening the configured backend
    pub fn store(
        mut self,
        store: Arc<dyn KvStore>,
    ) -> Self {
        self.store = Some(store);
        self
    }

    /// Ties the runtime to an existing token; cancelling it shuts the runtime down
    pub fn shutdown_token(
        mut self,
        token: CancellationToken,
    ) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Validates the settings and assembles the [`Runtime`].
    pub fn build(self) -> Result<Runtime> {
        let settings = self.settings.validate()?;
        let store = match self.store {
            Some(store) => store,
            None => open_store(&settings.storage)?,
        };
        let shutdown = self.shutdown.unwrap_or_default();

        info!(
            namespace = %settings.storage.namespace,
            interval_ms = settings.poller.interval_ms,
            "runtime built"
        );
        Ok(Runtime::new(settings, store, shutdown))
    }
}
