//! # Memory Management
//!
//! Allocators that make hand-managed lifetimes checkable.
//!
//! ## Design Philosophy
//!
//! Misuse is reported, not tolerated:
//! - A full pool refuses to construct
//! - Releasing a foreign or already-released object is an error
//! - Every tracked byte is accounted for until it is released

mod pool;
mod tracking;

pub use pool::{PoolAllocator, PoolHandle, PoolId};
pub use tracking::{TrackedBox, TrackingAllocator, TrackingStats};
