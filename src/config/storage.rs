use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_NAMESPACE;
use crate::Error;
use crate::Result;

/// Which `KvStore` implementation backs the engine
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-process map, lost on restart
    #[default]
    Memory,
    /// Embedded sled database under `db_path`
    Sled,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Directory of the sled database (ignored by the memory backend)
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Prefix shared by every key written by this process
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Sled page cache size in bytes
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    /// Sled background flush period
    #[serde(default = "default_flush_every_ms")]
    pub flush_every_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            db_path: default_db_path(),
            namespace: default_namespace(),
            cache_capacity: default_cache_capacity(),
            flush_every_ms: default_flush_every_ms(),
        }
    }
}

impl StorageConfig {
    pub(super) fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "storage.namespace cannot be empty".into(),
            )));
        }

        if self.backend == StorageBackend::Sled && self.db_path.as_os_str().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "storage.db_path cannot be empty with the sled backend".into(),
            )));
        }

        Ok(())
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./db")
}
fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}
fn default_cache_capacity() -> u64 {
    10 * 1024 * 1024 //10MB
}
fn default_flush_every_ms() -> u64 {
    3
}
