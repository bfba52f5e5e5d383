//! Polling-diff event engine and bounded-concurrency job-queue dispatcher.
//!
//! Watchers turn periodic listings of remote resources into change events:
//! each tick swaps the persisted snapshot for a fresh one inside one atomic
//! store update and fires the diff to matching subscriptions. The
//! [`QueueDispatcher`] fans batches of payloads out to a remote function
//! under a concurrency ceiling and fires one completion event per batch.
//!
//! ```ignore
//! let runtime = Runtime::builder(Settings::new()?).build()?;
//! let dispatcher = runtime.dispatcher("thumbnails", invoker)?;
//! dispatcher.on_event_type("QueueComplete", handler_fn(|e: &QueueCompleteEvent| { ... }), None)?;
//! dispatcher.enqueue("resize", payloads, Some(10)).await?;
//! ```
mod config;
mod connectors;
pub(crate) mod constants;
mod dispatcher;
mod errors;
mod event;
pub mod metrics;
mod poller;
mod runtime;
mod snapshot;
mod storage;
pub mod utils;

pub use self::config::*;
pub use connectors::*;
pub use dispatcher::*;
pub use errors::*;
pub use event::*;
pub use poller::*;
pub use runtime::*;
pub use snapshot::*;
pub use storage::*;
pub use utils::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
