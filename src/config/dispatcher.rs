use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_INVOKE_TIMEOUT_MS;
use crate::constants::DEFAULT_RECORD_BASE_DELAY_MS;
use crate::constants::DEFAULT_RECORD_MAX_DELAY_MS;
use crate::constants::DEFAULT_RECORD_MAX_RETRIES;
use crate::constants::QUEUE_CONCURRENCY_LIMIT;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DispatcherConfig {
    /// Ceiling used when `enqueue` is called without an explicit one
    #[serde(default = "default_max_concurrent")]
    pub default_max_concurrent: usize,

    /// Upper bound applied by `TimeoutInvoker` to a single invocation
    #[serde(default = "default_invoke_timeout_ms")]
    pub invoke_timeout_ms: u64,

    /// Retries of a failed job-result write. Results still unwritten after
    /// that are applied by the next drain cycle.
    #[serde(default = "default_record_max_retries")]
    pub record_max_retries: usize,

    /// Backoff base between job-result write retries (unit: milliseconds)
    #[serde(default = "default_record_base_delay_ms")]
    pub record_base_delay_ms: u64,

    /// Maximum backoff between job-result write retries (unit: milliseconds)
    #[serde(default = "default_record_max_delay_ms")]
    pub record_max_delay_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_max_concurrent: default_max_concurrent(),
            invoke_timeout_ms: default_invoke_timeout_ms(),
            record_max_retries: default_record_max_retries(),
            record_base_delay_ms: default_record_base_delay_ms(),
            record_max_delay_ms: default_record_max_delay_ms(),
        }
    }
}

impl DispatcherConfig {
    pub(super) fn validate(&self) -> Result<()> {
        if self.default_max_concurrent == 0 || self.default_max_concurrent > QUEUE_CONCURRENCY_LIMIT {
            return Err(Error::Config(ConfigError::Message(format!(
                "dispatcher.default_max_concurrent must be within 1..={}, got {}",
                QUEUE_CONCURRENCY_LIMIT, self.default_max_concurrent
            ))));
        }

        if self.invoke_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "dispatcher.invoke_timeout_ms must be at least 1ms".into(),
            )));
        }

        if self.record_base_delay_ms > self.record_max_delay_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "dispatcher.record_base_delay_ms ({}) exceeds dispatcher.record_max_delay_ms ({})",
                self.record_base_delay_ms, self.record_max_delay_ms
            ))));
        }

        Ok(())
    }

    /// Backoff before retry number `attempt` (0-based) of a job-result write
    pub(crate) fn record_backoff(
        &self,
        attempt: usize,
    ) -> Duration {
        let factor = 1u64.checked_shl(attempt as u32).unwrap_or(u64::MAX);
        let delay = self.record_base_delay_ms.saturating_mul(factor).min(self.record_max_delay_ms);
        Duration::from_millis(delay)
    }
}

fn default_max_concurrent() -> usize {
    QUEUE_CONCURRENCY_LIMIT
}
fn default_invoke_timeout_ms() -> u64 {
    DEFAULT_INVOKE_TIMEOUT_MS
}
fn default_record_max_retries() -> usize {
    DEFAULT_RECORD_MAX_RETRIES
}
fn default_record_base_delay_ms() -> u64 {
    DEFAULT_RECORD_BASE_DELAY_MS
}
fn default_record_max_delay_ms() -> u64 {
    DEFAULT_RECORD_MAX_DELAY_MS
}
