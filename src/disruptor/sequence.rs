//! Sequence counter
//!
//! A `Sequence` tracks progress through the ring buffer for the producer
//! cursor and for every consumer. The value is padded onto its own cache
//! line so neighbouring sequences never false-share.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// A cache-line padded 64-bit counter
///
/// Writes use release ordering and reads use acquire ordering, so a slot
/// written before `set(s)` is visible to any thread that observes `s`.
pub struct Sequence {
    value: CachePadded<AtomicI64>,
}

impl Sequence {
    /// Create a new sequence with the given initial value
    pub fn new(initial_value: i64) -> Self {
        Self {
            value: CachePadded::new(AtomicI64::new(initial_value)),
        }
    }

    /// Get the current sequence value
    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Set the sequence value
    #[inline]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Set the value with a full fence, ordering it before any later load
    #[inline]
    pub fn set_volatile(&self, value: i64) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Atomically replace `expected` with `new`; returns whether it happened
    #[inline]
    pub fn compare_and_set(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Increment and get the new value
    #[inline]
    pub fn increment_and_get(&self) -> i64 {
        self.add_and_get(1)
    }

    /// Add a value and get the new result
    #[inline]
    pub fn add_and_get(&self, increment: i64) -> i64 {
        self.value.fetch_add(increment, Ordering::AcqRel) + increment
    }

    /// Get the current value and then add
    #[inline]
    pub fn get_and_add(&self, increment: i64) -> i64 {
        self.value.fetch_add(increment, Ordering::AcqRel)
    }

    /// Minimum value across `sequences`, or `minimum` when that is smaller
    /// or the slice is empty.
    pub fn get_minimum_sequence(sequences: &[Arc<Sequence>], minimum: i64) -> i64 {
        sequences
            .iter()
            .map(|sequence| sequence.get())
            .fold(minimum, i64::min)
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(crate::disruptor::INITIAL_CURSOR_VALUE)
    }
}

impl std::fmt::Debug for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence")
            .field("value", &self.get())
            .finish()
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get())
    }
}
