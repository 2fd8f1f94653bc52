//! Flow controller: the bounded-buffer protocol.
//!
//! The `FlowController` combines one mutex with two counting semaphores:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       FlowController                         │
//! │                                                              │
//! │   slots (init = capacity)            items (init = 0)        │
//! │        │                                  │                  │
//! │        ▼                                  ▼                  │
//! │  reserve_slot ──▶ ┌───────────────────┐ ◀── reserve_item     │
//! │                   │ Mutex<SharedState>│                      │
//! │                   │  queue, delay     │                      │
//! │                   └───────────────────┘                      │
//! │  InsertGuard drop ──▶ items += 1    RemoveGuard drop ──▶     │
//! │                                            slots += 1        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Permits bound how many inserts/removes may proceed; the mutex bounds
//! concurrent mutation. The permit is always acquired before the lock.
//!
//! The production delay lives inside the same mutex as the queue, so the
//! controller's read-modify-write and the producer's read are ordered by the
//! lock's acquire/release semantics.

use tokio::sync::{Mutex, MutexGuard, Semaphore, SemaphorePermit};

use crate::error::{FlowError, FlowResult};
use crate::queue::BoundedQueue;

/// State guarded by the flow controller's mutex.
#[derive(Debug)]
pub struct SharedState<T> {
    /// The bounded queue.
    queue: BoundedQueue<T>,

    /// Current production delay in seconds.
    production_delay_secs: f64,
}

impl<T> SharedState<T> {
    /// Returns the current occupancy.
    #[must_use]
    pub fn occupancy(&self) -> usize {
        self.queue.len()
    }

    /// Returns the queue capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Returns the current production delay in seconds.
    #[must_use]
    pub const fn production_delay_secs(&self) -> f64 {
        self.production_delay_secs
    }

    /// Replaces the production delay.
    pub fn set_production_delay_secs(&mut self, secs: f64) {
        self.production_delay_secs = secs;
    }

    /// Returns the queue for inspection.
    #[must_use]
    pub const fn queue(&self) -> &BoundedQueue<T> {
        &self.queue
    }
}

/// Bounded buffer guarded by a mutex plus item/slot semaphores.
pub struct FlowController<T> {
    /// Queue and production delay.
    state: Mutex<SharedState<T>>,

    /// Permits for items available to remove.
    items: Semaphore,

    /// Permits for free slots available to fill.
    slots: Semaphore,

    /// Queue capacity.
    capacity: usize,
}

impl<T> FlowController<T> {
    /// Creates a flow controller with an empty queue.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::InvalidConfig` if `capacity` is zero or exceeds
    /// the semaphore permit limit, or `FlowError::AllocationFailed` if the
    /// queue storage cannot be reserved.
    pub fn new(capacity: usize, production_delay_secs: f64) -> FlowResult<Self> {
        if capacity > Semaphore::MAX_PERMITS {
            return Err(FlowError::InvalidConfig {
                message: format!(
                    "queue capacity {capacity} exceeds maximum of {}",
                    Semaphore::MAX_PERMITS
                ),
            });
        }
        let queue = BoundedQueue::with_capacity(capacity)?;

        Ok(Self {
            state: Mutex::new(SharedState {
                queue,
                production_delay_secs,
            }),
            items: Semaphore::new(0),
            slots: Semaphore::new(capacity),
            capacity,
        })
    }

    /// Returns the queue capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Waits for a free slot, then locks the shared state.
    ///
    /// The returned guard holds both the slot permit and the lock. Calling
    /// [`InsertGuard::push`] spends the permit; dropping the guard releases
    /// the lock and signals one available item. A guard dropped without a
    /// push hands its permit back to the slot pool.
    ///
    /// Cancel safe: dropping the future before it resolves acquires nothing.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Closed` if the controller was closed.
    pub async fn reserve_slot(&self) -> FlowResult<InsertGuard<'_, T>> {
        let permit = self.slots.acquire().await.map_err(|_| FlowError::Closed)?;
        let state = self.state.lock().await;
        Ok(InsertGuard {
            items: &self.items,
            state,
            permit: Some(permit),
            inserted: false,
        })
    }

    /// Waits for an available item, then locks the shared state.
    ///
    /// Mirror image of [`reserve_slot`](Self::reserve_slot): dropping the
    /// guard after [`RemoveGuard::pop`] signals one free slot.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Closed` if the controller was closed.
    pub async fn reserve_item(&self) -> FlowResult<RemoveGuard<'_, T>> {
        let permit = self.items.acquire().await.map_err(|_| FlowError::Closed)?;
        let state = self.state.lock().await;
        Ok(RemoveGuard {
            slots: &self.slots,
            state,
            permit: Some(permit),
            removed: false,
        })
    }

    /// Inserts an item, waiting for a free slot. Returns the new occupancy.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Closed` if the controller was closed.
    pub async fn insert(&self, item: T) -> FlowResult<usize> {
        let mut guard = self.reserve_slot().await?;
        guard.push(item)
    }

    /// Removes the front item, waiting for one to be available.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Closed` if the controller was closed.
    pub async fn remove(&self) -> FlowResult<T> {
        let mut guard = self.reserve_item().await?;
        guard.pop()
    }

    /// Locks the shared state without taking a permit.
    ///
    /// Used by the delay controller, which reads occupancy and rewrites the
    /// production delay but never moves items.
    pub async fn lock(&self) -> MutexGuard<'_, SharedState<T>> {
        self.state.lock().await
    }

    /// Returns the current occupancy.
    pub async fn occupancy(&self) -> usize {
        self.state.lock().await.occupancy()
    }

    /// Returns the current production delay in seconds.
    pub async fn production_delay_secs(&self) -> f64 {
        self.state.lock().await.production_delay_secs()
    }

    /// Returns the number of free-slot permits not currently held.
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Returns the number of item permits not currently held.
    #[must_use]
    pub fn available_items(&self) -> usize {
        self.items.available_permits()
    }

    /// Closes both semaphores, failing current and future waiters with
    /// `FlowError::Closed`. Items already queued stay in place.
    pub fn close(&self) {
        self.items.close();
        self.slots.close();
    }

    /// Returns whether [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }
}

/// A reserved free slot plus the lock on the shared state.
#[must_use = "dropping the guard immediately gives back the slot"]
pub struct InsertGuard<'a, T> {
    items: &'a Semaphore,
    state: MutexGuard<'a, SharedState<T>>,
    permit: Option<SemaphorePermit<'a>>,
    inserted: bool,
}

impl<T> InsertGuard<'_, T> {
    /// Appends an item at the rear of the queue. Returns the new occupancy.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::PermitConsumed` if this guard already pushed.
    pub fn push(&mut self, item: T) -> FlowResult<usize> {
        let permit = self.permit.take().ok_or(FlowError::PermitConsumed)?;
        if let Err(e) = self.state.queue.push(item) {
            self.permit = Some(permit);
            return Err(e);
        }
        // The slot now belongs to the queued item until a remove frees it.
        permit.forget();
        self.inserted = true;
        Ok(self.state.occupancy())
    }

    /// Returns the current occupancy.
    #[must_use]
    pub fn occupancy(&self) -> usize {
        self.state.occupancy()
    }

    /// Returns the queue capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.state.capacity()
    }

    /// Returns the current production delay in seconds.
    #[must_use]
    pub fn production_delay_secs(&self) -> f64 {
        self.state.production_delay_secs()
    }
}

impl<T> Drop for InsertGuard<'_, T> {
    fn drop(&mut self) {
        if self.inserted {
            self.items.add_permits(1);
        }
    }
}

/// A reserved item plus the lock on the shared state.
#[must_use = "dropping the guard immediately gives back the item permit"]
pub struct RemoveGuard<'a, T> {
    slots: &'a Semaphore,
    state: MutexGuard<'a, SharedState<T>>,
    permit: Option<SemaphorePermit<'a>>,
    removed: bool,
}

impl<T> RemoveGuard<'_, T> {
    /// Removes and returns the front item.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::PermitConsumed` if this guard already popped.
    pub fn pop(&mut self) -> FlowResult<T> {
        let permit = self.permit.take().ok_or(FlowError::PermitConsumed)?;
        match self.state.queue.pop() {
            Ok(item) => {
                permit.forget();
                self.removed = true;
                Ok(item)
            }
            Err(e) => {
                self.permit = Some(permit);
                Err(e)
            }
        }
    }

    /// Returns the current occupancy.
    #[must_use]
    pub fn occupancy(&self) -> usize {
        self.state.occupancy()
    }

    /// Returns the queue capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.state.capacity()
    }
}

impl<T> Drop for RemoveGuard<'_, T> {
    fn drop(&mut self) {
        if self.removed {
            self.slots.add_permits(1);
        }
    }
}
