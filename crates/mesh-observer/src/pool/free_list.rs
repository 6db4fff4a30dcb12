//! Free list of pre-built slots.
//!
//! The list itself sits behind a short-lived std mutex; construction and
//! destruction of slots always happen outside of it. Waiters park on a
//! [`Notify`] that fires whenever slots are added back.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;
use tokio::sync::futures::Notified;

/// Pool of reusable slots. Grows on demand, never shrinks until drained.
///
/// Generic over the slot type: callers are responsible for resetting a slot
/// before handing it back with [`SlotPool::release`].
pub struct SlotPool<T> {
    free: Mutex<Vec<T>>,
    available: AtomicUsize,
    total_created: AtomicUsize,
    replenished: Notify,
}

impl<T> SlotPool<T> {
    pub fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            available: AtomicUsize::new(0),
            total_created: AtomicUsize::new(0),
            replenished: Notify::new(),
        }
    }

    /// Lock the free list, recovering from a poisoned lock.
    ///
    /// A panic while holding the lock can only happen between a push and a
    /// pop, so the Vec itself is still consistent.
    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        match self.free.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Slot pool free list mutex poisoned - recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn try_acquire(&self) -> Option<T> {
        let mut free = self.lock();
        let slot = free.pop()?;
        self.available.store(free.len(), Ordering::Release);
        Some(slot)
    }

    pub fn release(&self, slot: T) {
        {
            let mut free = self.lock();
            free.push(slot);
            self.available.store(free.len(), Ordering::Release);
        }
        self.replenished.notify_waiters();
    }

    /// Add already-built slots (warm-up).
    pub fn extend(&self, slots: Vec<T>) -> usize {
        let added = slots.len();
        if added == 0 {
            return 0;
        }
        {
            let mut free = self.lock();
            free.extend(slots);
            self.available.store(free.len(), Ordering::Release);
        }
        self.total_created.fetch_add(added, Ordering::AcqRel);
        self.replenished.notify_waiters();
        added
    }

    /// Build and add `batch` slots if fewer than `threshold` are free.
    ///
    /// Returns the number of slots added. The factory runs without the lock held.
    pub fn replenish_if_low(
        &self,
        threshold: usize,
        batch: usize,
        mut factory: impl FnMut() -> T,
    ) -> usize {
        if self.len() >= threshold {
            return 0;
        }
        let slots: Vec<T> = (0..batch).map(|_| factory()).collect();
        let added = self.extend(slots);
        tracing::debug!(added, free = self.len(), "Replenished slot pool");
        added
    }

    /// Remove every free slot, for teardown.
    pub fn drain(&self) -> Vec<T> {
        let mut free = self.lock();
        self.available.store(0, Ordering::Release);
        std::mem::take(&mut *free)
    }

    /// Future resolved on the next release or replenishment.
    ///
    /// Enable it (or poll it once) before checking the pool so a wake-up
    /// between the check and the await is not lost.
    pub fn wait_for_slots(&self) -> Notified<'_> {
        self.replenished.notified()
    }

    /// Run `f` over the free slots without removing them.
    pub fn inspect<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.lock())
    }

    pub fn len(&self) -> usize {
        self.available.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_created(&self) -> usize {
        self.total_created.load(Ordering::Acquire)
    }
}

impl<T> Default for SlotPool<T> {
    fn default() -> Self {
        Self::new()
    }
}
