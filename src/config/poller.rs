use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_POLL_INTERVAL_MS;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PollerConfig {
    /// Delay between two ticks of the same watcher
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Run the first tick immediately instead of after one interval
    #[serde(default)]
    pub tick_on_start: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            tick_on_start: false,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub(super) fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "poller.interval_ms must be at least 1ms".into(),
            )));
        }
        Ok(())
    }
}

fn default_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
