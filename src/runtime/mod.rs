//! Process-level glue: one shared store, one poll scheduler and one shutdown
//! token for every watcher and dispatcher of the application.
mod builder;
#[allow(clippy::module_inception)]
mod runtime;

pub use builder::*;
pub use runtime::*;
