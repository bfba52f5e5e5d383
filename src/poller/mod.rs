//! Independent fixed-interval timers driving each watcher's poll tick.
mod scheduler;

pub use scheduler::*;


use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::Result;

/// Anything with a periodic `on_poll` hook
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Pollable: Send + Sync + 'static {
    /// Stable identity, used as the timer name and in logs
    fn name(&self) -> String;

    /// Runs one tick. An error aborts this tick only.
    async fn on_poll(&self) -> Result<()>;
}
