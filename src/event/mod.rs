//! Subscription registry shared by every watcher and the queue dispatcher.
mod handler;
mod registry;

pub use handler::*;
pub use registry::*;
