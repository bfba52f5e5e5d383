//! Snapshot diffing and the poll-and-snapshot protocol shared by watchers.
mod differ;
mod tracker;

pub use differ::*;
pub use tracker::*;
