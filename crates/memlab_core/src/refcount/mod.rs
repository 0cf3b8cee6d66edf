//! # Reference Counting
//!
//! Ownership handles for resources that count their own references.

mod handle;

pub use handle::{RefCounted, RefHandle};
