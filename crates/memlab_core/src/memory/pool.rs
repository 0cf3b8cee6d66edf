//! # Pool Allocator
//!
//! Fixed-capacity slot allocator for objects of a single type.
//!
//! ```text
//!   slots:  ┌────────┬────────┬────────┬────────┐
//!           │ Free   │ In use │ Free   │ In use │
//!           │ next ─┐│ gen 2  │ next=∅ │ gen 0  │
//!           └───────┼┴────────┴───▲────┴────────┘
//!                   └─────────────┘
//!   next_free ──► slot 0
//! ```
//!
//! The free list is intrusive: a free slot's own storage holds the link to the
//! next free slot, so the pool needs no bookkeeping besides the slot array.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::PoolConfig;
use crate::error::{MemoryError, MemoryResult, ReleaseFault};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(0);

/// Process-wide unique identity of a pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolId(u64);

impl PoolId {
    fn next() -> Self {
        Self(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle to an object constructed in a pool.
///
/// Handles can only be produced by [`PoolAllocator`]. A handle names the pool
/// it came from, the slot index and the slot generation at construction time,
/// so the pool can reject handles it never issued and handles whose object
/// has already been destructed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    pool: PoolId,
    index: usize,
    generation: u32,
}

impl PoolHandle {
    /// Returns the pool that issued this handle.
    #[inline]
    #[must_use]
    pub const fn pool(self) -> PoolId {
        self.pool
    }

    /// Returns the slot index inside the pool.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }

    /// Returns the slot generation this handle was issued for.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

enum Slot<T> {
    Free { next: Option<usize>, generation: u32 },
    Occupied { generation: u32, value: T },
}

/// A pool allocator holding at most `N` objects of type `T`.
///
/// All slot memory is allocated once, when the pool is created.
/// [`construct`](Self::construct) and [`destruct`](Self::destruct) are O(1)
/// and never touch the system allocator.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Use one pool per thread or wrap in a mutex.
///
/// # Example
///
/// ```rust
/// use memlab_core::PoolAllocator;
///
/// let mut pool: PoolAllocator<(i32, i32, i32), 3> = PoolAllocator::new();
///
/// let tank = pool.construct((1, 2, 3))?;
/// assert_eq!(pool.allocated_count(), 1);
///
/// pool.destruct(tank)?;
/// assert!(pool.destruct(tank).is_err()); // double destruct is caught
/// # Ok::<(), memlab_core::MemoryError>(())
/// ```
pub struct PoolAllocator<T, const N: usize> {
    /// The slot array, always exactly `N` long.
    slots: Box<[Slot<T>]>,
    /// Head of the intrusive free list.
    next_free: Option<usize>,
    /// Number of occupied slots.
    allocated_count: usize,
    id: PoolId,
    config: PoolConfig,
}

impl<T, const N: usize> PoolAllocator<T, N> {
    const NON_EMPTY: () = assert!(N > 0, "pool size must be greater than zero");

    /// Creates a pool with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Creates a pool with the given configuration.
    ///
    /// All `N` slots are allocated here and linked into the free list.
    #[must_use]
    pub fn with_config(config: PoolConfig) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NON_EMPTY;

        let slots: Vec<Slot<T>> = (0..N)
            .map(|_| Slot::Free {
                next: None,
                generation: 0,
            })
            .collect();

        let mut pool = Self {
            slots: slots.into_boxed_slice(),
            next_free: None,
            allocated_count: 0,
            id: PoolId::next(),
            config,
        };
        pool.rebuild_free_list();
        pool
    }

    /// Returns the identity of this pool.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> PoolId {
        self.id
    }

    /// Returns the total number of slots.
    #[inline]
    #[must_use]
    pub const fn pool_size(&self) -> usize {
        N
    }

    /// Returns the number of free slots.
    #[inline]
    #[must_use]
    pub const fn free_count(&self) -> usize {
        N - self.allocated_count
    }

    /// Returns the number of currently constructed objects.
    #[inline]
    #[must_use]
    pub const fn allocated_count(&self) -> usize {
        self.allocated_count
    }

    /// Drops every live object and returns all slots to the free list.
    ///
    /// Handles issued before the reset are invalidated.
    pub fn reset(&mut self) {
        let mut dropped = 0usize;
        for slot in self.slots.iter_mut() {
            if let Slot::Occupied { generation, .. } = slot {
                let generation = generation.wrapping_add(1);
                *slot = Slot::Free {
                    next: None,
                    generation,
                };
                dropped += 1;
            }
        }
        self.rebuild_free_list();
        tracing::debug!(pool = self.id.0, dropped, "pool reset");
    }

    /// Links every slot into the free list, highest index first out.
    ///
    /// Expects every slot to be free.
    fn rebuild_free_list(&mut self) {
        self.next_free = None;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Slot::Free { next, .. } = slot {
                *next = self.next_free;
                self.next_free = Some(index);
            }
        }
        self.allocated_count = 0;
    }

    /// Moves `value` into a free slot.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::CapacityExhausted`] if every slot is in use.
    /// The value is dropped and the pool is left unchanged.
    pub fn construct(&mut self, value: T) -> MemoryResult<PoolHandle> {
        self.construct_with(|| value)
    }

    /// Constructs an object in a free slot from `init`.
    ///
    /// `init` is only called once a slot is known to be available.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::CapacityExhausted`] if every slot is in use.
    pub fn construct_with(&mut self, init: impl FnOnce() -> T) -> MemoryResult<PoolHandle> {
        let Some(index) = self.next_free else {
            return Err(MemoryError::CapacityExhausted { capacity: N });
        };
        let value = init();

        let slot = &mut self.slots[index];
        let Slot::Free { next, generation } = *slot else {
            unreachable!("free list links an occupied slot");
        };
        *slot = Slot::Occupied { generation, value };
        self.next_free = next;
        self.allocated_count += 1;

        if self.config.trace_events {
            tracing::trace!(pool = self.id.0, index, generation, live = self.allocated_count, "pool construct");
        }

        Ok(PoolHandle {
            pool: self.id,
            index,
            generation,
        })
    }

    /// Constructs a default object in a free slot.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::CapacityExhausted`] if every slot is in use.
    pub fn construct_default(&mut self) -> MemoryResult<PoolHandle>
    where
        T: Default,
    {
        self.construct_with(T::default)
    }

    /// Drops the object behind `handle` and returns its slot to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidRelease`] if the handle was issued by
    /// another pool or its object has already been destructed. The pool is
    /// left unchanged.
    pub fn destruct(&mut self, handle: PoolHandle) -> MemoryResult<()> {
        self.take(handle).map(drop)
    }

    /// Moves the object behind `handle` out of the pool and frees its slot.
    ///
    /// # Errors
    ///
    /// Same as [`destruct`](Self::destruct).
    pub fn take(&mut self, handle: PoolHandle) -> MemoryResult<T> {
        self.verify(handle).map_err(MemoryError::InvalidRelease)?;

        let freed = Slot::Free {
            next: self.next_free,
            generation: handle.generation.wrapping_add(1),
        };
        let Slot::Occupied { value, .. } = std::mem::replace(&mut self.slots[handle.index], freed) else {
            unreachable!("verified slot is not occupied");
        };
        self.next_free = Some(handle.index);
        self.allocated_count -= 1;

        if self.config.trace_events {
            tracing::trace!(pool = self.id.0, index = handle.index, live = self.allocated_count, "pool destruct");
        }

        Ok(value)
    }

    /// Returns true if `handle` refers to a live object in this pool.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: PoolHandle) -> bool {
        self.verify(handle).is_ok()
    }

    /// Gets a reference to a live object.
    #[must_use]
    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        if handle.pool != self.id {
            return None;
        }
        match self.slots.get(handle.index)? {
            Slot::Occupied { generation, value } if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    /// Gets a mutable reference to a live object.
    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        if handle.pool != self.id {
            return None;
        }
        match self.slots.get_mut(handle.index)? {
            Slot::Occupied { generation, value } if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    /// Iterates over all live objects in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (PoolHandle, &T)> {
        let pool = self.id;
        self.slots
            .iter()
            .enumerate()
            .filter_map(move |(index, slot)| match slot {
                Slot::Occupied { generation, value } => Some((
                    PoolHandle {
                        pool,
                        index,
                        generation: *generation,
                    },
                    value,
                )),
                Slot::Free { .. } => None,
            })
    }

    fn verify(&self, handle: PoolHandle) -> Result<(), ReleaseFault> {
        if handle.pool != self.id {
            return Err(ReleaseFault::ForeignPool);
        }
        // Handles issued by this pool always index inside it.
        let Some(slot) = self.slots.get(handle.index) else {
            return Err(ReleaseFault::ForeignPool);
        };
        match slot {
            Slot::Free { .. } => Err(ReleaseFault::NotOccupied),
            Slot::Occupied { generation, .. } if *generation != handle.generation => {
                Err(ReleaseFault::StaleGeneration)
            }
            Slot::Occupied { .. } => Ok(()),
        }
    }
}

impl<T, const N: usize> Default for PoolAllocator<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> fmt::Debug for PoolAllocator<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("id", &self.id)
            .field("pool_size", &N)
            .field("allocated_count", &self.allocated_count)
            .field("next_free", &self.next_free)
            .finish()
    }
}

impl<T, const N: usize> Drop for PoolAllocator<T, N> {
    fn drop(&mut self) {
        if self.allocated_count > 0 && self.config.warn_on_leak {
            tracing::warn!(
                pool = self.id.0,
                live = self.allocated_count,
                "pool dropped with live objects, dropping them with the pool"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct DropCounter(Rc<Cell<usize>>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn test_pool_construct_destruct() {
        let mut pool: PoolAllocator<u32, 10> = PoolAllocator::new();

        let h1 = pool.construct(42).unwrap();
        assert_eq!(*pool.get(h1).unwrap(), 42);
        assert_eq!(pool.allocated_count(), 1);
        assert_eq!(pool.free_count(), 9);

        pool.destruct(h1).unwrap();
        assert_eq!(pool.allocated_count(), 0);
        assert_eq!(pool.free_count(), 10);
        assert!(pool.get(h1).is_none());
    }

    #[test]
    fn test_pool_full() {
        let mut pool: PoolAllocator<u8, 2> = PoolAllocator::new();

        let _ = pool.construct(1).unwrap();
        let _ = pool.construct(2).unwrap();

        let err = pool.construct(3).unwrap_err();
        assert_eq!(err, MemoryError::CapacityExhausted { capacity: 2 });
        assert_eq!(pool.allocated_count(), 2);
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn test_pool_full_skips_initializer() {
        let mut pool: PoolAllocator<u8, 1> = PoolAllocator::new();
        let _ = pool.construct(1).unwrap();

        let called = Cell::new(false);
        let result = pool.construct_with(|| {
            called.set(true);
            2
        });
        assert!(result.unwrap_err().is_capacity_exhausted());
        assert!(!called.get());
    }

    #[test]
    fn test_pool_reuse() {
        let mut pool: PoolAllocator<u32, 1> = PoolAllocator::new();

        let h1 = pool.construct(1).unwrap();
        pool.destruct(h1).unwrap();

        let h2 = pool.construct(2).unwrap();
        assert_eq!(h1.index(), h2.index()); // Same slot reused
        assert_ne!(h1.generation(), h2.generation());
        assert_eq!(*pool.get(h2).unwrap(), 2);
    }

    #[test]
    fn test_free_list_hands_out_highest_slot_first() {
        let mut pool: PoolAllocator<u32, 4> = PoolAllocator::new();

        let indices: Vec<usize> = (0..4).map(|i| pool.construct(i).unwrap().index()).collect();
        assert_eq!(indices, vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_double_destruct_rejected() {
        let mut pool: PoolAllocator<u32, 3> = PoolAllocator::new();
        let h = pool.construct(7).unwrap();
        pool.destruct(h).unwrap();

        let err = pool.destruct(h).unwrap_err();
        assert_eq!(err, MemoryError::InvalidRelease(ReleaseFault::NotOccupied));
        assert_eq!(pool.free_count(), 3);
        assert_eq!(pool.allocated_count(), 0);
    }

    #[test]
    fn test_stale_handle_does_not_touch_new_occupant() {
        let mut pool: PoolAllocator<u32, 1> = PoolAllocator::new();
        let stale = pool.construct(1).unwrap();
        pool.destruct(stale).unwrap();
        let fresh = pool.construct(2).unwrap();

        let err = pool.destruct(stale).unwrap_err();
        assert_eq!(err, MemoryError::InvalidRelease(ReleaseFault::StaleGeneration));
        assert!(pool.get(stale).is_none());
        assert_eq!(*pool.get(fresh).unwrap(), 2);
        assert_eq!(pool.allocated_count(), 1);
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let mut pool: PoolAllocator<u32, 3> = PoolAllocator::new();
        let mut other: PoolAllocator<u32, 3> = PoolAllocator::new();
        let _ = pool.construct(1).unwrap();
        let foreign = other.construct(1).unwrap();

        let err = pool.destruct(foreign).unwrap_err();
        assert_eq!(err, MemoryError::InvalidRelease(ReleaseFault::ForeignPool));
        assert!(!pool.contains(foreign));
        assert!(pool.get(foreign).is_none());
        assert_eq!(pool.allocated_count(), 1);
        assert!(other.contains(foreign));
    }

    #[test]
    fn test_handle_from_larger_pool_rejected() {
        let mut small: PoolAllocator<u32, 2> = PoolAllocator::new();
        let mut large: PoolAllocator<u32, 8> = PoolAllocator::new();
        let far = large.construct(1).unwrap();
        assert_eq!(far.index(), 7);

        let err = small.take(far).unwrap_err();
        assert_eq!(err, MemoryError::InvalidRelease(ReleaseFault::ForeignPool));
        assert!(small.get_mut(far).is_none());
        assert_eq!(small.free_count(), 2);
    }

    #[test]
    fn test_take_moves_value_out() {
        let mut pool: PoolAllocator<String, 2> = PoolAllocator::new();
        let h = pool.construct("tank".to_string()).unwrap();
        pool.get_mut(h).unwrap().push_str("-1");

        assert_eq!(pool.take(h).unwrap(), "tank-1");
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_destruct_runs_drop_once() {
        let drops = Rc::new(Cell::new(0));
        let mut pool: PoolAllocator<DropCounter, 2> = PoolAllocator::new();

        let h = pool.construct(DropCounter(Rc::clone(&drops))).unwrap();
        pool.destruct(h).unwrap();
        assert_eq!(drops.get(), 1);

        assert!(pool.destruct(h).is_err());
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_reset_drops_live_objects_and_invalidates_handles() {
        let drops = Rc::new(Cell::new(0));
        let mut pool: PoolAllocator<DropCounter, 3> = PoolAllocator::new();
        let h1 = pool.construct(DropCounter(Rc::clone(&drops))).unwrap();
        let _h2 = pool.construct(DropCounter(Rc::clone(&drops))).unwrap();

        pool.reset();
        assert_eq!(drops.get(), 2);
        assert_eq!(pool.free_count(), 3);
        assert_eq!(pool.allocated_count(), 0);
        assert!(pool.destruct(h1).unwrap_err().is_invalid_release());

        let indices: Vec<usize> = (0..3)
            .map(|_| pool.construct(DropCounter(Rc::clone(&drops))).unwrap().index())
            .collect();
        assert_eq!(indices, vec![2, 1, 0]);
    }

    #[test]
    fn test_drop_pool_drops_live_objects() {
        let drops = Rc::new(Cell::new(0));
        {
            let mut pool: PoolAllocator<DropCounter, 2> = PoolAllocator::with_config(PoolConfig {
                trace_events: true,
                warn_on_leak: true,
            });
            let _ = pool.construct(DropCounter(Rc::clone(&drops))).unwrap();
        }
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_counts_stay_consistent() {
        let mut pool: PoolAllocator<usize, 5> = PoolAllocator::new();
        let mut live = Vec::new();

        for step in 0..50usize {
            if step % 3 == 2 || live.len() == 5 {
                if let Some(h) = live.pop() {
                    pool.destruct(h).unwrap();
                }
            } else {
                live.push(pool.construct(step).unwrap());
            }
            assert_eq!(pool.free_count() + pool.allocated_count(), pool.pool_size());
            assert_eq!(pool.allocated_count(), live.len());
        }
    }

    #[test]
    fn test_iter_yields_live_objects() {
        let mut pool: PoolAllocator<u32, 4> = PoolAllocator::new();
        let a = pool.construct(10).unwrap();
        let b = pool.construct(20).unwrap();
        let c = pool.construct(30).unwrap();
        pool.destruct(b).unwrap();

        let mut seen: Vec<(PoolHandle, u32)> = pool.iter().map(|(h, v)| (h, *v)).collect();
        seen.sort_by_key(|(_, v)| *v);
        assert_eq!(seen, vec![(a, 10), (c, 30)]);
    }

    #[test]
    fn test_construct_default() {
        let mut pool: PoolAllocator<(i32, i32, i32), 1> = PoolAllocator::default();
        let h = pool.construct_default().unwrap();
        assert_eq!(*pool.get(h).unwrap(), (0, 0, 0));
    }
}
