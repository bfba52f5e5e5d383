// -
// Persistence layout

/// Default namespace prepended to every persisted key
pub(crate) const DEFAULT_NAMESPACE: &str = "dpoll";

/// Sled tree holding all key-value records
pub(crate) const KV_TREE: &str = "_dpoll_kv";

/// Record holding every in-flight dispatch queue, keyed by queue id
pub(crate) const QUEUES_KEY: &str = "queues";

/// Record holding the pipeline -> jobs snapshot of the pipeline watcher
pub(crate) const PIPELINES_KEY: &str = "pipelines";

/// Record holding the job snapshot of the media job watcher
pub(crate) const JOBS_KEY: &str = "jobs";

// -
// Dispatch limits

/// Upper bound on concurrent invocations for a single queue
pub const QUEUE_CONCURRENCY_LIMIT: usize = 100;

/// Length of generated queue ids
pub(crate) const QUEUE_ID_LEN: usize = 16;

/// The only transport status accepted from a remote invocation
pub(crate) const INVOKE_SUCCESS_STATUS: i64 = 200;

/// Retries of a failed job-result write before the result is parked
pub(crate) const DEFAULT_RECORD_MAX_RETRIES: usize = 5;

/// Backoff bounds between job-result write retries
pub(crate) const DEFAULT_RECORD_BASE_DELAY_MS: u64 = 20;
pub(crate) const DEFAULT_RECORD_MAX_DELAY_MS: u64 = 1_000;

/// Inner status success band: [lower, upper)
pub(crate) const INNER_STATUS_SUCCESS_LOWER: i64 = 200;
pub(crate) const INNER_STATUS_SUCCESS_UPPER: i64 = 300;

// -
// Polling

/// Default delay between two ticks of one watcher
pub(crate) const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;

/// Default per-invocation timeout enforced by `TimeoutInvoker`
pub(crate) const DEFAULT_INVOKE_TIMEOUT_MS: u64 = 300_000;

/// Number of hex chars of the descriptor digest kept in ids and prefixes
pub(crate) const DESCRIPTOR_HASH_LEN: usize = 16;
