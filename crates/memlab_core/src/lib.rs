//! # MEMLAB Core
//!
//! Hand-managed memory with the bookkeeping made explicit:
//! - A fixed-capacity pool that verifies every release
//! - A tracking allocator that knows how much heap it has handed out
//! - A handle that keeps an external reference count in step
//!
//! ## Architecture Rules
//!
//! 1. **No hidden allocations** - Pools allocate their slots once, up front
//! 2. **Misuse is an error value** - Double release, foreign handles and full pools return `Err`
//! 3. **Single-threaded by default** - Components carry no locks
//!
//! ## Example
//!
//! ```rust
//! use memlab_core::{PoolAllocator, TrackingAllocator};
//!
//! let mut pool: PoolAllocator<u64, 16> = PoolAllocator::new();
//! let h = pool.construct(7)?;
//! assert_eq!(pool.get(h), Some(&7));
//!
//! let mut tracker: TrackingAllocator<u64> = TrackingAllocator::new();
//! let block = tracker.allocate(16)?;
//! // SAFETY: released once, by the tracker that allocated it.
//! unsafe { tracker.deallocate(block.as_ptr()) };
//! assert_eq!(tracker.allocation_count(), 0);
//! # Ok::<(), memlab_core::MemoryError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod memory;
pub mod refcount;

pub use config::{MemlabConfig, PoolConfig, TrackingConfig};
pub use error::{MemoryError, MemoryResult, ReleaseFault};
pub use memory::{PoolAllocator, PoolHandle, PoolId, TrackedBox, TrackingAllocator, TrackingStats};
pub use refcount::{RefCounted, RefHandle};
