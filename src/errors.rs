//! Polling and Dispatch Error Hierarchy
//!
//! Defines the error types surfaced by watchers, the event registry, the queue
//! dispatcher and the persistence layer, categorized by the layer that raised them.

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (storage, serialization, background tasks)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Settings loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Bad input rejected synchronously by the receiving call
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Failures reported by a remote service or an invocation
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// One or more subscriber handlers failed during `fire`
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Persistence keys must be non-empty
    #[error("PersistentStore: Invalid key: {0:?}")]
    InvalidKey(String),

    /// Descriptor shape rejected at subscribe time
    #[error("Invalid event descriptor: {0}")]
    InvalidDescriptor(String),

    /// Event type string outside the enumerated set of a watcher
    #[error("Invalid event type: {0}")]
    InvalidEventType(String),

    /// Requested concurrency outside [1, limit]
    #[error("Invalid max concurrent: {value} (allowed: 1..={limit})")]
    InvalidConcurrency { value: usize, limit: usize },

    /// Remote target (function) name
    #[error("Invalid target name: {0:?}")]
    InvalidTargetName(String),

    #[error("Invalid bucket: {0:?}")]
    InvalidBucket(String),

    #[error("Invalid region: {0:?}")]
    InvalidRegion(String),

    #[error("Invalid pipeline ID: {0:?}")]
    InvalidPipelineId(String),

    #[error("Invalid object URL: {0:?}")]
    InvalidObjectUrl(String),

    /// A remote listing returned an entry that cannot be turned into state
    #[error("Invalid remote entry: {0}")]
    InvalidRemoteEntry(String),

    /// A different watcher is already scheduled under this name
    #[error("Watcher {0:?} is already scheduled")]
    DuplicateWatcher(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Transport status differs from the single success code
    #[error("Error {status} invoking function: {target}")]
    TransportStatus { target: String, status: i64 },

    /// Inner status outside the success band, or an embedded error message
    #[error("Error {detail} invoking function: {target}")]
    InvocationFailed { target: String, detail: String },

    /// The invocation layer gave up waiting for a response
    #[error("Invocation of {target} timed out after {timeout_ms}ms")]
    Timeout { target: String, timeout_ms: u64 },

    /// Network or service failure reported by a collaborator
    #[error("Remote service failure: {0}")]
    Service(String),
}

/// A single handler failure, tagged with the subscription it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub subscription_id: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
#[error("{} handler(s) failed: {}", .failures.len(), summary(.failures))]
pub struct HandlerError {
    pub failures: Vec<HandlerFailure>,
}

fn summary(failures: &[HandlerFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("[{}] {}", f.subscription_id, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Embedded database errors
    #[error("Embedded database error: {0}")]
    DbError(String),

    /// Stored bytes that do not decode into the expected record
    #[error("Corrupted record at {key}: {reason}")]
    DataCorruption { key: String, reason: String },

    /// Lock or compare-and-swap contention that could not be resolved
    #[error("Atomic update of {0} did not converge")]
    UpdateContention(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    // Storage layer
    #[error("Storage operation failed: {0}")]
    Storage(#[from] StorageError),

    // Serialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("Runtime is shut down")]
    ShutDown,
}

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

// ============== Conversion Implementations ============== //
impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}

impl From<SerializationError> for Error {
    fn from(e: SerializationError) -> Self {
        Error::System(SystemError::Serialization(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        SerializationError::Json(e).into()
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        StorageError::DbError(err.to_string()).into()
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        Error::System(SystemError::TaskFailed(err))
    }
}
