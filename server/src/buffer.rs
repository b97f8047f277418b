//! Fixed-capacity FIFO decoupling socket reads from simulation consumption

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("Buffer is empty")]
    Empty,
}

/// Circular queue with a capacity fixed at construction
///
/// Pushing into a full buffer hands the item back instead of overwriting the
/// oldest entry, so the caller decides how to account for the drop.
#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Box<[Option<T>]>,
    read_index: usize,
    write_index: usize,
    count: usize,
}

impl<T> RingBuffer<T> {
    /// Creates a buffer holding at most `capacity` items.
    ///
    /// A zero capacity buffer is valid and rejects every push.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            read_index: 0,
            write_index: 0,
            count: 0,
        }
    }

    /// Appends `item`, or returns it untouched when the buffer is full.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        self.slots[self.write_index] = Some(item);
        self.write_index = (self.write_index + 1) % self.capacity();
        self.count += 1;
        Ok(())
    }

    /// Removes and returns the oldest item.
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let item = self.slots[self.read_index].take();
        self.read_index = (self.read_index + 1) % self.capacity();
        self.count -= 1;
        item
    }

    /// Oldest item without removing it
    pub fn top(&self) -> Result<&T, BufferError> {
        if self.is_empty() {
            return Err(BufferError::Empty);
        }
        self.slots[self.read_index]
            .as_ref()
            .ok_or(BufferError::Empty)
    }

    /// Drops every stored item and resets the indices.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.read_index = 0;
        self.write_index = 0;
        self.count = 0;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.capacity()
    }
}

impl<T> Iterator for RingBuffer<T> {
    type Item = T;

    /// Draining iteration in FIFO order
    fn next(&mut self) -> Option<T> {
        self.pop()
    }
}
