//! # Tracking Allocator
//!
//! Thin instrumentation over the system allocator. Counts live allocations and
//! the bytes they occupy, without any side table.
//!
//! ## Safety Note
//!
//! This module hands out raw memory and walks back from user pointers to their
//! headers. Every unsafe block states the invariant it relies on.

#![allow(unsafe_code)]
//!
//! ## Block Layout
//!
//! ```text
//!   ┌──────────────┬──────────┬──────────────────────────────┐
//!   │   padding    │ size:u64 │   count * size_of::<T>()     │
//!   └──────────────┴──────────┴──────────────────────────────┘
//!   ◄──────── HEADER_SIZE ────►▲
//!                              └── pointer returned to caller
//! ```
//!
//! The recorded size is the whole block, header included, so releasing a
//! block needs nothing but the pointer.

use std::alloc::{self, Layout};
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};

use parking_lot::Mutex;

use crate::config::TrackingConfig;
use crate::error::{MemoryError, MemoryResult};

/// Snapshot of a tracking allocator's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TrackingStats {
    /// Number of blocks currently allocated.
    pub allocation_count: usize,
    /// Bytes currently allocated, headers included.
    pub total_bytes: usize,
}

/// An allocator that routes to the system heap and tracks what it hands out.
///
/// # Thread Safety
///
/// The counters are plain integers. Share a tracker between threads only
/// behind a lock, as [`TrackedBox`] does.
///
/// # Example
///
/// ```rust
/// use memlab_core::TrackingAllocator;
///
/// let mut tracker: TrackingAllocator<u32> = TrackingAllocator::new();
/// let block = tracker.allocate(4)?;
/// assert_eq!(tracker.allocation_count(), 1);
/// assert_eq!(tracker.total_bytes(), tracker.header_size() + 16);
///
/// // SAFETY: `block` came from this tracker and is released once.
/// unsafe { tracker.deallocate(block.as_ptr()) };
/// assert_eq!(tracker.total_bytes(), 0);
/// # Ok::<(), memlab_core::MemoryError>(())
/// ```
pub struct TrackingAllocator<T = u8> {
    allocation_count: usize,
    total_bytes: usize,
    config: TrackingConfig,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TrackingAllocator<T> {
    /// Alignment of every block: strict enough for both the header and `T`.
    const BLOCK_ALIGN: usize = if mem::align_of::<T>() > mem::align_of::<u64>() {
        mem::align_of::<T>()
    } else {
        mem::align_of::<u64>()
    };

    /// Bytes reserved in front of the user memory.
    ///
    /// At least one `u64`, widened to `T`'s alignment so the user pointer
    /// stays aligned.
    pub const HEADER_SIZE: usize = if mem::align_of::<T>() > mem::size_of::<u64>() {
        mem::align_of::<T>()
    } else {
        mem::size_of::<u64>()
    };

    /// Creates a tracker with zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            allocation_count: 0,
            total_bytes: 0,
            config: TrackingConfig { trace_events: false },
            _marker: PhantomData,
        }
    }

    /// Creates a tracker with the given configuration.
    #[must_use]
    pub const fn with_config(config: TrackingConfig) -> Self {
        Self {
            allocation_count: 0,
            total_bytes: 0,
            config,
            _marker: PhantomData,
        }
    }

    /// Returns the number of live allocations.
    #[inline]
    #[must_use]
    pub const fn allocation_count(&self) -> usize {
        self.allocation_count
    }

    /// Returns the bytes held by live allocations, headers included.
    #[inline]
    #[must_use]
    pub const fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Returns both counters at once.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> TrackingStats {
        TrackingStats {
            allocation_count: self.allocation_count,
            total_bytes: self.total_bytes,
        }
    }

    /// Returns the per-allocation header overhead in bytes.
    #[inline]
    #[must_use]
    pub const fn header_size(&self) -> usize {
        Self::HEADER_SIZE
    }

    fn block_layout(count: usize) -> MemoryResult<Layout> {
        let overflow = MemoryError::SizeOverflow {
            count,
            element_size: mem::size_of::<T>(),
        };
        let size = count
            .checked_mul(mem::size_of::<T>())
            .and_then(|bytes| bytes.checked_add(Self::HEADER_SIZE))
            .ok_or_else(|| overflow.clone())?;
        Layout::from_size_align(size, Self::BLOCK_ALIGN).map_err(|_| overflow)
    }

    /// Allocates uninitialized memory for `count` values of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::SizeOverflow`] if the block size is not
    /// representable, or [`MemoryError::OutOfMemory`] if the system
    /// allocator fails. Counters are unchanged on error.
    pub fn allocate(&mut self, count: usize) -> MemoryResult<NonNull<T>> {
        let layout = Self::block_layout(count)?;
        let size = layout.size();

        // SAFETY: `layout` has a non-zero size, it always includes the header.
        let block = unsafe { alloc::alloc(layout) };
        if block.is_null() {
            return Err(MemoryError::OutOfMemory { bytes: size });
        }

        // SAFETY: the block is at least HEADER_SIZE bytes long. HEADER_SIZE is
        // a multiple of 8 and the block is 8-aligned, so the u64 slot right
        // before the user pointer is in bounds and aligned.
        let user = unsafe {
            let user = block.add(Self::HEADER_SIZE);
            user.sub(mem::size_of::<u64>()).cast::<u64>().write(size as u64);
            user.cast::<T>()
        };

        self.allocation_count += 1;
        self.total_bytes += size;

        if self.config.trace_events {
            tracing::trace!(
                bytes = size,
                live = self.allocation_count,
                total_bytes = self.total_bytes,
                "tracked allocate"
            );
        }

        // SAFETY: offset from a non-null allocation.
        Ok(unsafe { NonNull::new_unchecked(user) })
    }

    /// Releases a block previously returned by [`allocate`](Self::allocate).
    ///
    /// Releasing a null pointer does nothing. Values stored in the block are
    /// not dropped.
    ///
    /// # Safety
    ///
    /// `ptr` must be null, or a pointer returned by `allocate` on a
    /// `TrackingAllocator<T>` whose counters include it, not yet released.
    pub unsafe fn deallocate(&mut self, ptr: *mut T) {
        if ptr.is_null() {
            return;
        }

        // SAFETY: per the caller contract, `ptr` sits HEADER_SIZE bytes into a
        // live block whose size header was written by `allocate`.
        let (block, size) = unsafe {
            let user = ptr.cast::<u8>();
            let size = user.sub(mem::size_of::<u64>()).cast::<u64>().read();
            (user.sub(Self::HEADER_SIZE), size as usize)
        };

        self.allocation_count -= 1;
        self.total_bytes -= size;

        if self.config.trace_events {
            tracing::trace!(
                bytes = size,
                live = self.allocation_count,
                total_bytes = self.total_bytes,
                "tracked deallocate"
            );
        }

        // SAFETY: the block was allocated with exactly this size and alignment.
        unsafe { alloc::dealloc(block, Layout::from_size_align_unchecked(size, Self::BLOCK_ALIGN)) };
    }
}

impl<T> Default for TrackingAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TrackingAllocator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingAllocator")
            .field("allocation_count", &self.allocation_count)
            .field("total_bytes", &self.total_bytes)
            .field("header_size", &Self::HEADER_SIZE)
            .finish()
    }
}

/// An owning box whose storage comes from a shared [`TrackingAllocator`].
///
/// This is the Rust counterpart of overloading `new`/`delete` for a single
/// type: every box of a type routes through one tracker, typically a
/// `static`.
///
/// ```rust
/// use memlab_core::{TrackedBox, TrackingAllocator};
/// use parking_lot::Mutex;
///
/// static VECTORS: Mutex<TrackingAllocator<(i32, i32)>> = Mutex::new(TrackingAllocator::new());
///
/// let v = TrackedBox::new_in((3, 4), &VECTORS)?;
/// assert_eq!(v.0 + v.1, 7);
/// assert_eq!(VECTORS.lock().allocation_count(), 1);
/// drop(v);
/// assert_eq!(VECTORS.lock().allocation_count(), 0);
/// # Ok::<(), memlab_core::MemoryError>(())
/// ```
pub struct TrackedBox<'t, T> {
    ptr: NonNull<T>,
    tracker: &'t Mutex<TrackingAllocator<T>>,
}

impl<'t, T> TrackedBox<'t, T> {
    /// Moves `value` into memory allocated from `tracker`.
    ///
    /// # Errors
    ///
    /// Propagates the tracker's allocation error; `value` is dropped.
    pub fn new_in(value: T, tracker: &'t Mutex<TrackingAllocator<T>>) -> MemoryResult<Self> {
        let ptr = tracker.lock().allocate(1)?;
        // SAFETY: fresh allocation sized and aligned for one `T`.
        unsafe { ptr.as_ptr().write(value) };
        Ok(Self { ptr, tracker })
    }

    /// Returns the tracker this box allocates from.
    #[must_use]
    pub fn tracker(this: &Self) -> &'t Mutex<TrackingAllocator<T>> {
        this.tracker
    }
}

impl<T> Deref for TrackedBox<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: `ptr` holds an initialized `T` until drop.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for TrackedBox<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: `ptr` holds an initialized `T` until drop, and `&mut self`
        // is the only path to it.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T: fmt::Debug> fmt::Debug for TrackedBox<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T> Drop for TrackedBox<'_, T> {
    fn drop(&mut self) {
        // SAFETY: the value is initialized and dropped exactly once here; the
        // block came from `self.tracker` and is released exactly once.
        unsafe {
            ptr::drop_in_place(self.ptr.as_ptr());
            self.tracker.lock().deallocate(self.ptr.as_ptr());
        }
    }
}

// SAFETY: a TrackedBox owns its `T` like a Box does; the tracker is behind a Mutex.
unsafe impl<T: Send> Send for TrackedBox<'_, T> {}
// SAFETY: shared access only yields `&T`.
unsafe impl<T: Sync> Sync for TrackedBox<'_, T> {}
