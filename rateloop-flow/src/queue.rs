//! Fixed-capacity FIFO queue.
//!
//! `BoundedQueue` is a plain ring buffer with no synchronization of its own.
//! Storage for `capacity` items is reserved once at construction and never
//! grows, so every push/pop is O(1) and never allocates.

use std::collections::VecDeque;

use crate::error::{FlowError, FlowResult};

/// A fixed-capacity FIFO queue.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    /// Items in insertion order; front is the oldest.
    items: VecDeque<T>,

    /// Maximum number of items.
    capacity: usize,

    /// Total items pushed.
    total_pushed: u64,

    /// Total items popped.
    total_popped: u64,
}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::InvalidConfig` if `capacity` is zero, or
    /// `FlowError::AllocationFailed` if the storage cannot be reserved.
    pub fn with_capacity(capacity: usize) -> FlowResult<Self> {
        if capacity == 0 {
            return Err(FlowError::InvalidConfig {
                message: "queue capacity must be at least 1".to_string(),
            });
        }

        let mut items = VecDeque::new();
        items
            .try_reserve_exact(capacity)
            .map_err(|_| FlowError::AllocationFailed { capacity })?;

        Ok(Self {
            items,
            capacity,
            total_pushed: 0,
            total_popped: 0,
        })
    }

    /// Appends an item at the rear.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::QueueFull` if the queue holds `capacity` items.
    pub fn push(&mut self, item: T) -> FlowResult<()> {
        if self.items.len() >= self.capacity {
            return Err(FlowError::QueueFull {
                size: self.items.len(),
                max_size: self.capacity,
            });
        }
        self.items.push_back(item);
        self.total_pushed += 1;
        Ok(())
    }

    /// Removes and returns the front item.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::QueueEmpty` if there is nothing to remove.
    pub fn pop(&mut self) -> FlowResult<T> {
        let item = self.items.pop_front().ok_or(FlowError::QueueEmpty)?;
        self.total_popped += 1;
        Ok(item)
    }

    /// Returns the current occupancy.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns whether the queue is full.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Returns the fixed capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates from front to rear.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Returns statistics about the queue.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            occupancy: self.items.len(),
            capacity: self.capacity,
            total_pushed: self.total_pushed,
            total_popped: self.total_popped,
        }
    }
}

/// Statistics about a bounded queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    /// Items currently held.
    pub occupancy: usize,
    /// Maximum items.
    pub capacity: usize,
    /// Total items pushed.
    pub total_pushed: u64,
    /// Total items popped.
    pub total_popped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_rejected() {
        let result = BoundedQueue::<u32>::with_capacity(0);
        assert!(matches!(result, Err(FlowError::InvalidConfig { .. })));
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = BoundedQueue::with_capacity(5).unwrap();
        for i in 0..5 {
            queue.push(i).unwrap();
        }
        let drained: Vec<i32> = (0..5).map(|_| queue.pop().unwrap()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_queue_full() {
        let mut queue = BoundedQueue::with_capacity(2).unwrap();
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        assert!(queue.is_full());

        let result = queue.push(3);
        assert_eq!(result, Err(FlowError::QueueFull { size: 2, max_size: 2 }));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_empty_queue_pop() {
        let mut queue: BoundedQueue<i32> = BoundedQueue::with_capacity(1).unwrap();
        assert_eq!(queue.pop(), Err(FlowError::QueueEmpty));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_wraparound_keeps_order() {
        // Interleave pushes and pops so the ring wraps several times.
        let mut queue = BoundedQueue::with_capacity(3).unwrap();
        let mut next_in = 0;
        let mut next_out = 0;
        for _ in 0..20 {
            while !queue.is_full() {
                queue.push(next_in).unwrap();
                next_in += 1;
            }
            for _ in 0..2 {
                assert_eq!(queue.pop().unwrap(), next_out);
                next_out += 1;
            }
        }
        assert_eq!(queue.iter().next(), Some(&next_out));
    }

    #[test]
    fn test_storage_never_grows() {
        let mut queue = BoundedQueue::with_capacity(4).unwrap();
        let reserved = queue.items.capacity();
        for round in 0..10 {
            for i in 0..4 {
                queue.push(round * 4 + i).unwrap();
            }
            for _ in 0..4 {
                queue.pop().unwrap();
            }
        }
        assert_eq!(queue.items.capacity(), reserved);
    }

    #[test]
    fn test_stats() {
        let mut queue = BoundedQueue::with_capacity(3).unwrap();
        queue.push("a").unwrap();
        queue.push("b").unwrap();
        queue.pop().unwrap();

        let stats = queue.stats();
        assert_eq!(stats.occupancy, 1);
        assert_eq!(stats.capacity, 3);
        assert_eq!(stats.total_pushed, 2);
        assert_eq!(stats.total_popped, 1);
    }
}
