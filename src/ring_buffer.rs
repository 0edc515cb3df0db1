use std::collections::VecDeque;

/// Fixed-capacity FIFO that drops its oldest entry on overflow
pub struct RingBuffer<T> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn add(&mut self, item: T) {
        self.data.push_back(item);
        while self.data.len() > self.capacity {
            self.data.pop_front();
        }
    }

    /// Take everything in insertion order and leave the buffer empty
    pub fn flush(&mut self) -> Vec<T> {
        self.data.drain(..).collect()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&T> {
        self.data.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_keeps_newest() {
        let mut buffer = RingBuffer::new(30);
        for i in 0..35 {
            buffer.add(i);
        }
        assert_eq!(buffer.len(), 30);
        assert_eq!(buffer.flush(), (5..35).collect::<Vec<_>>());
    }

    #[test]
    fn test_flush_empties_buffer() {
        let mut buffer = RingBuffer::new(3);
        buffer.add('a');
        buffer.add('b');
        assert_eq!(buffer.flush(), vec!['a', 'b']);
        assert!(buffer.is_empty());
        assert!(buffer.flush().is_empty());
    }

    #[test]
    fn test_is_full() {
        let mut buffer = RingBuffer::new(2);
        assert!(!buffer.is_full());
        buffer.add(1);
        assert!(!buffer.is_full());
        buffer.add(2);
        assert!(buffer.is_full());
        buffer.add(3);
        assert!(buffer.is_full());
        assert_eq!(buffer.capacity(), 2);
        assert_eq!(buffer.last(), Some(&3));
    }
}
