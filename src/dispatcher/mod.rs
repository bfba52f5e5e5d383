//! Bounded-concurrency bulk invocation of a remote target.
mod invoker;
mod queue;
mod queue_dispatcher;

pub use invoker::*;
pub use queue::*;
pub use queue_dispatcher::*;
