//! Ring Buffer Implementation
//!
//! A fixed, power-of-two array of pre-constructed event slots. Any sequence
//! maps to a slot through `sequence & (size - 1)`. The buffer holds no
//! cursor of its own; who may touch which slot is decided by the sequencer.

use crate::disruptor::core_interfaces::DataProvider;
use crate::disruptor::{is_power_of_two, DisruptorError, EventFactory, Result};
use std::cell::UnsafeCell;

/// Pre-allocated storage for events
///
/// Slots are created once by the event factory and then mutated in place
/// for the lifetime of the buffer.
///
/// # Type Parameters
/// * `T` - The event type stored in the buffer
#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Box<[UnsafeCell<T>]>,
    /// `buffer_size - 1`, kept as i64 to match the sequence type
    index_mask: i64,
}

impl<T> RingBuffer<T>
where
    T: Send + Sync,
{
    /// Create a new ring buffer and pre-populate every slot
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidBufferSize` if buffer_size is not a power of 2
    pub fn new<F>(buffer_size: usize, event_factory: F) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        if !is_power_of_two(buffer_size) {
            return Err(DisruptorError::InvalidBufferSize(buffer_size));
        }

        let slots: Box<[UnsafeCell<T>]> = (0..buffer_size)
            .map(|_| UnsafeCell::new(event_factory.new_instance()))
            .collect();

        Ok(Self {
            slots,
            index_mask: (buffer_size - 1) as i64,
        })
    }

    /// Get a reference to the event at the specified sequence
    #[inline]
    pub fn get(&self, sequence: i64) -> &T {
        let index = (sequence & self.index_mask) as usize;
        // SAFETY: the mask keeps the index inside the slot array.
        let slot = unsafe { self.slots.get_unchecked(index) };
        unsafe { &*slot.get() }
    }

    /// Get a mutable reference when the buffer is exclusively owned
    pub fn get_mut(&mut self, sequence: i64) -> &mut T {
        let index = (sequence & self.index_mask) as usize;
        self.slots[index].get_mut()
    }

    /// Raw mutable access to the slot for `sequence`
    ///
    /// # Safety
    /// The caller must hold the claim for `sequence` from the sequencer, so
    /// that no consumer reads the slot and no other producer writes it until
    /// the sequence is published.
    #[inline]
    pub unsafe fn get_mut_unchecked(&self, sequence: i64) -> *mut T {
        let index = (sequence & self.index_mask) as usize;
        self.slots.get_unchecked(index).get()
    }

    /// Number of slots
    pub fn buffer_size(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots as i64
    pub fn size(&self) -> i64 {
        self.slots.len() as i64
    }

    /// Mutable iterator over the slots for `start..=end`
    ///
    /// # Safety
    /// The caller must hold the claim for the whole range.
    pub unsafe fn batch_iter_mut(&self, start: i64, end: i64) -> BatchIterMut<'_, T> {
        BatchIterMut {
            ring_buffer: self,
            current: start,
            last: end,
        }
    }
}

/// Iterator handing out claimed slots during a batch publish
pub struct BatchIterMut<'a, T> {
    ring_buffer: &'a RingBuffer<T>,
    current: i64,
    last: i64,
}

impl<'a, T> BatchIterMut<'a, T> {
    fn remaining(&self) -> usize {
        (self.last - self.current + 1).max(0) as usize
    }
}

impl<'a, T> Iterator for BatchIterMut<'a, T>
where
    T: Send + Sync,
{
    type Item = &'a mut T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current > self.last {
            return None;
        }
        // SAFETY: the iterator was created over a claimed range and each
        // sequence is yielded once.
        let event = unsafe { &mut *self.ring_buffer.get_mut_unchecked(self.current) };
        self.current += 1;
        Some(event)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl<'a, T> ExactSizeIterator for BatchIterMut<'a, T> where T: Send + Sync {}

// SAFETY: slot access is coordinated by sequences; a slot has one writer
// (the claiming producer) and readers only after the release-store that
// publishes it.
unsafe impl<T: Send + Sync> Send for RingBuffer<T> {}
unsafe impl<T: Send + Sync> Sync for RingBuffer<T> {}

impl<T> DataProvider<T> for RingBuffer<T>
where
    T: Send + Sync,
{
    fn get(&self, sequence: i64) -> &T {
        RingBuffer::get(self, sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruptor::{ClosureEventFactory, DefaultEventFactory};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default, PartialEq)]
    struct TestEvent {
        value: i64,
    }

    #[test]
    fn test_ring_buffer_creation() {
        let buffer = RingBuffer::new(8, DefaultEventFactory::<TestEvent>::new()).unwrap();
        assert_eq!(buffer.buffer_size(), 8);
        assert_eq!(buffer.size(), 8);
    }

    #[test]
    fn test_invalid_buffer_size() {
        for size in [0, 3, 6, 1000] {
            let result = RingBuffer::new(size, DefaultEventFactory::<TestEvent>::new());
            assert!(matches!(result, Err(DisruptorError::InvalidBufferSize(s)) if s == size));
        }
    }

    #[test]
    fn test_size_one_is_valid() {
        let mut buffer = RingBuffer::new(1, DefaultEventFactory::<TestEvent>::new()).unwrap();
        buffer.get_mut(0).value = 9;
        assert_eq!(buffer.get(17).value, 9);
    }

    #[test]
    fn test_factory_called_once_per_slot() {
        let calls = AtomicUsize::new(0);
        let factory = ClosureEventFactory::new(|| {
            calls.fetch_add(1, Ordering::Relaxed);
            TestEvent::default()
        });
        let _buffer = RingBuffer::new(16, factory).unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 16);
    }

    #[test]
    fn test_sequence_wraps_onto_slots() {
        let mut buffer = RingBuffer::new(4, DefaultEventFactory::<TestEvent>::new()).unwrap();
        buffer.get_mut(1).value = 11;

        assert_eq!(buffer.get(1).value, 11);
        assert_eq!(buffer.get(5).value, 11);
        assert_eq!(buffer.get(1 + 4 * 1000).value, 11);
        assert_eq!(buffer.get(2).value, 0);
    }

    #[test]
    fn test_batch_iter_mut() {
        let buffer = RingBuffer::new(8, DefaultEventFactory::<TestEvent>::new()).unwrap();
        let iter = unsafe { buffer.batch_iter_mut(6, 9) };
        assert_eq!(iter.len(), 4);
        for (offset, event) in iter.enumerate() {
            event.value = offset as i64;
        }

        assert_eq!(buffer.get(6).value, 0);
        assert_eq!(buffer.get(7).value, 1);
        assert_eq!(buffer.get(8).value, 2);
        assert_eq!(buffer.get(9).value, 3);
    }
}
