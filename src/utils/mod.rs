//! Utils Module - Shared Helpers

pub mod cache;

pub use cache::*;
