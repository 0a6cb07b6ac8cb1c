//! Helpers shared by the unit tests of every module
mod common;
mod fake_source;

pub use common::*;
pub use fake_source::*;
