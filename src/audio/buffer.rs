//! Bounded rolling window over the most recent audio samples.
//!
//! The wake-word listener keeps a short pre-roll of audio in a [`RingBuffer`]
//! so that when an utterance starts, the first syllable (which often sits
//! just under the energy gate) is still available to the spotter.
//!
//! ```rust
//! use voice_assistant::audio::RingBuffer;
//!
//! let mut window = RingBuffer::new(4);
//! window.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]);
//! assert_eq!(window.snapshot(), vec![2.0, 3.0, 4.0, 5.0]);
//! assert_eq!(window.len(), 4); // snapshot does not consume
//! ```

use std::collections::VecDeque;

/// Fixed-capacity FIFO that evicts the oldest items on overflow.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Copy> RingBuffer<T> {
    /// Create a window holding at most `capacity` items.  A zero capacity is
    /// bumped to one so the window is always usable.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `data`, evicting from the front to stay within capacity.
    pub fn push_slice(&mut self, data: &[T]) {
        // Only the tail of an oversized slice can survive.
        let data = if data.len() > self.capacity {
            &data[data.len() - self.capacity..]
        } else {
            data
        };
        let overflow = (self.items.len() + data.len()).saturating_sub(self.capacity);
        self.items.drain(..overflow);
        self.items.extend(data.iter().copied());
    }

    /// Copy of the window in chronological order.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().copied().collect()
    }

    /// Take the window contents, leaving it empty.
    pub fn drain(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_most_recent_items() {
        let mut buf = RingBuffer::new(3);
        buf.push_slice(&[1, 2]);
        buf.push_slice(&[3, 4]);
        assert_eq!(buf.snapshot(), vec![2, 3, 4]);
        assert!(buf.is_full());
    }

    #[test]
    fn oversized_push_keeps_tail() {
        let mut buf = RingBuffer::new(2);
        buf.push_slice(&[1.0_f32, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(buf.snapshot(), vec![4.0, 5.0]);
    }

    #[test]
    fn drain_empties_snapshot_does_not() {
        let mut buf = RingBuffer::new(8);
        buf.push_slice(&[0.1_f32, 0.2]);
        assert_eq!(buf.snapshot().len(), 2);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.drain(), vec![0.1, 0.2]);
        assert!(buf.is_empty());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut buf = RingBuffer::new(0);
        assert_eq!(buf.capacity(), 1);
        buf.push_slice(&[7, 8]);
        assert_eq!(buf.snapshot(), vec![8]);
    }

    #[test]
    fn clear_resets() {
        let mut buf = RingBuffer::new(4);
        buf.push_slice(&[1, 2, 3, 4]);
        buf.clear();
        assert!(buf.is_empty());
        buf.push_slice(&[9]);
        assert_eq!(buf.snapshot(), vec![9]);
    }
}
