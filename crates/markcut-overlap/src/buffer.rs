use std::ops::Deref;

/// Buffer whose capacity is fixed at creation. It never reallocates; pushing
/// into a full buffer is a bug in the caller's sizing and panics.
#[derive(Debug, Clone)]
pub struct FixedBuffer<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> FixedBuffer<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn push(&mut self, item: T) {
        assert!(
            !self.is_full(),
            "fixed buffer overflow: capacity {} exceeded",
            self.capacity
        );
        self.items.push(item);
    }
}

impl<T> Deref for FixedBuffer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}
