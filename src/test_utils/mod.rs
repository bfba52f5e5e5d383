//! the test_utils folder here will share utils or test components between unit
//! tests
mod common;
mod handlers;
mod invokers;

pub use common::*;
pub use handlers::*;
pub use invokers::*;
