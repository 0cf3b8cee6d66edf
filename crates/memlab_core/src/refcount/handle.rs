//! # Reference-Counted Handle
//!
//! RAII wrapper for resources that keep their own reference count.
//!
//! ```text
//!   State machine:
//!
//!            from_raw (no +1)          clone (+1)
//!   ┌───────┐ ───────────────► ┌───────────────┐ ──────────► Bound (other handle)
//!   │ Empty │                  │ Bound(res)    │
//!   └───────┘ ◄─────────────── └───────────────┘
//!              reset / drop (-1)      │ take()
//!                                     ▼
//!                         new handle Bound, source Empty (no change)
//! ```

use std::fmt;

use crate::error::{MemoryError, MemoryResult};

/// A resource that owns its reference count.
///
/// Implementors decide what happens when the count reaches zero; handles only
/// ever call these two methods.
pub trait RefCounted {
    /// Takes one additional reference.
    fn add_ref(&self);

    /// Gives up one reference.
    fn release(&self);
}

/// Handle to an externally reference-counted resource.
///
/// The handle holds at most one reference. Cloning takes another reference,
/// dropping gives one back, moving transfers it untouched. Wrapping a raw
/// reference adopts the reference the caller already holds, the way factory
/// functions hand out objects at count one.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use memlab_core::{RefCounted, RefHandle};
///
/// struct Texture { refs: Cell<u32> }
///
/// impl RefCounted for Texture {
///     fn add_ref(&self) { self.refs.set(self.refs.get() + 1); }
///     fn release(&self) { self.refs.set(self.refs.get() - 1); }
/// }
///
/// let texture = Texture { refs: Cell::new(1) };
/// let first = RefHandle::from_raw(&texture);
/// let second = first.clone();
/// assert_eq!(texture.refs.get(), 2);
/// assert_eq!(first, second);
///
/// drop(second);
/// assert_eq!(texture.refs.get(), 1);
/// ```
pub struct RefHandle<'r, R: RefCounted + ?Sized> {
    resource: Option<&'r R>,
}

impl<'r, R: RefCounted + ?Sized> RefHandle<'r, R> {
    /// Creates an empty handle.
    #[inline]
    #[must_use]
    pub const fn null() -> Self {
        Self { resource: None }
    }

    /// Wraps a reference the caller already holds. The count is not touched.
    #[inline]
    #[must_use]
    pub const fn from_raw(resource: &'r R) -> Self {
        Self {
            resource: Some(resource),
        }
    }

    /// Returns the bound resource, if any.
    #[inline]
    #[must_use]
    pub const fn get(&self) -> Option<&'r R> {
        self.resource
    }

    /// Returns true if the handle is empty.
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.resource.is_none()
    }

    /// Returns true if the handle holds a reference.
    #[inline]
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.resource.is_some()
    }

    /// Gives up the held reference, if any, and leaves the handle empty.
    pub fn reset(&mut self) {
        self.dec();
        self.resource = None;
    }

    /// Rebinds to `other`'s resource, taking a new reference to it.
    ///
    /// The old reference is given up first.
    pub fn assign(&mut self, other: &Self) {
        self.dec();
        self.resource = other.resource;
        self.inc();
    }

    /// Moves the held reference into a new handle, leaving this one empty.
    ///
    /// The count is not touched.
    #[must_use]
    pub fn take(&mut self) -> Self {
        Self {
            resource: self.resource.take(),
        }
    }

    /// Returns the slot a factory writes a fresh reference into.
    ///
    /// Whatever is written is adopted without an increment, like
    /// [`from_raw`](Self::from_raw).
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::UnsafeAccess`] if the handle is already bound;
    /// overwriting the slot would orphan the held reference.
    pub fn init_slot(&mut self) -> MemoryResult<&mut Option<&'r R>> {
        if self.resource.is_some() {
            return Err(MemoryError::UnsafeAccess);
        }
        Ok(&mut self.resource)
    }

    fn address(&self) -> Option<*const ()> {
        self.resource.map(|r| (r as *const R).cast::<()>())
    }

    fn inc(&self) {
        if let Some(resource) = self.resource {
            resource.add_ref();
        }
    }

    // Every caller overwrites `resource` or is `drop`, so it is not cleared here.
    fn dec(&self) {
        if let Some(resource) = self.resource {
            resource.release();
        }
    }
}

impl<R: RefCounted + ?Sized> Default for RefHandle<'_, R> {
    fn default() -> Self {
        Self::null()
    }
}

impl<'r, R: RefCounted + ?Sized> From<&'r R> for RefHandle<'r, R> {
    fn from(resource: &'r R) -> Self {
        Self::from_raw(resource)
    }
}

impl<R: RefCounted + ?Sized> Clone for RefHandle<'_, R> {
    fn clone(&self) -> Self {
        self.inc();
        Self {
            resource: self.resource,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.assign(source);
    }
}

impl<R: RefCounted + ?Sized> Drop for RefHandle<'_, R> {
    fn drop(&mut self) {
        self.dec();
    }
}

impl<R: RefCounted + ?Sized> PartialEq for RefHandle<'_, R> {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl<R: RefCounted + ?Sized> Eq for RefHandle<'_, R> {}

impl<R: RefCounted + ?Sized> fmt::Debug for RefHandle<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address() {
            Some(address) => write!(f, "RefHandle({address:p})"),
            None => f.write_str("RefHandle(null)"),
        }
    }
}
