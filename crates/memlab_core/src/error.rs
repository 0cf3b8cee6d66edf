//! # Memory Error Types
//!
//! All errors that can occur in the memlab components.

use thiserror::Error;

/// Why a pool refused to release a handle.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReleaseFault {
    /// The handle was issued by a different pool.
    #[error("allocation is not within this pool")]
    ForeignPool,
    /// The slot is free, e.g. the handle was already released.
    #[error("allocation already appears to have been destructed")]
    NotOccupied,
    /// The slot was released and handed out again since this handle was issued.
    #[error("slot has been reused since the handle was issued")]
    StaleGeneration,
}

/// Errors that can occur in the memlab components.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The pool has no free slot left.
    #[error("pool capacity exhausted: all {capacity} slots are in use")]
    CapacityExhausted {
        /// Total number of slots in the pool.
        capacity: usize,
    },

    /// A release request named an allocation this pool does not own.
    #[error("invalid release: {0}")]
    InvalidRelease(ReleaseFault),

    /// The system allocator could not satisfy the request.
    #[error("out of memory: failed to allocate {bytes} bytes")]
    OutOfMemory {
        /// Total block size that was requested, header included.
        bytes: usize,
    },

    /// The requested allocation size does not fit in the address space.
    #[error("allocation size overflow: {count} elements of {element_size} bytes")]
    SizeOverflow {
        /// Number of elements requested.
        count: usize,
        /// Size of one element in bytes.
        element_size: usize,
    },

    /// A raw initialization slot was requested from a handle that is already bound.
    #[error("unsafe access to resource: handle is already bound")]
    UnsafeAccess,

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MemoryError {
    /// Returns true if the error reports an exhausted pool.
    #[inline]
    #[must_use]
    pub const fn is_capacity_exhausted(&self) -> bool {
        matches!(self, Self::CapacityExhausted { .. })
    }

    /// Returns true if the error reports a foreign, stale or double release.
    #[inline]
    #[must_use]
    pub const fn is_invalid_release(&self) -> bool {
        matches!(self, Self::InvalidRelease(_))
    }
}

/// Result type for memlab operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
