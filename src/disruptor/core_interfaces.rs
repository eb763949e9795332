//! Core interfaces
//!
//! Small capability traits shared by the sequencers, the ring buffer and
//! the publishing facade.

use crate::disruptor::Result;

/// Something with a cursor: the highest sequence claimed or published
pub trait Cursored {
    /// Current cursor value
    fn get_cursor(&self) -> i64;
}

/// Claim and publish operations over a bounded sequence space
pub trait Sequenced {
    /// Capacity of the underlying ring buffer
    fn get_buffer_size(&self) -> usize;

    /// Whether `required_capacity` slots could be claimed without wrapping
    /// past the slowest gating consumer.
    fn has_available_capacity(&self, required_capacity: usize) -> bool;

    /// Number of slots currently free
    fn remaining_capacity(&self) -> i64;

    /// Claim the next sequence, waiting for a free slot if necessary
    fn next(&self) -> Result<i64> {
        self.next_n(1)
    }

    /// Claim `n` contiguous sequences and return the highest one
    ///
    /// Blocks while the claim would overwrite unread slots. Fails only when
    /// `n` is outside `1..=buffer_size`.
    fn next_n(&self, n: i64) -> Result<i64>;

    /// Claim the next sequence without waiting
    fn try_next(&self) -> Result<i64> {
        self.try_next_n(1)
    }

    /// Claim `n` contiguous sequences without waiting
    ///
    /// Returns [`DisruptorError::InsufficientCapacity`](crate::disruptor::DisruptorError::InsufficientCapacity)
    /// when the ring is too full.
    fn try_next_n(&self, n: i64) -> Result<i64>;

    /// Make `sequence` visible to consumers
    fn publish(&self, sequence: i64);

    /// Make every sequence in `lo..=hi` visible to consumers
    fn publish_range(&self, lo: i64, hi: i64);
}

/// Read access to events by sequence
pub trait DataProvider<T>: Send + Sync {
    /// The event stored in the slot for `sequence`
    fn get(&self, sequence: i64) -> &T;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruptor::DisruptorError;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct CountingSequenced {
        cursor: AtomicI64,
        size: usize,
    }

    impl Cursored for CountingSequenced {
        fn get_cursor(&self) -> i64 {
            self.cursor.load(Ordering::Acquire)
        }
    }

    impl Sequenced for CountingSequenced {
        fn get_buffer_size(&self) -> usize {
            self.size
        }

        fn has_available_capacity(&self, required_capacity: usize) -> bool {
            required_capacity <= self.size
        }

        fn remaining_capacity(&self) -> i64 {
            self.size as i64
        }

        fn next_n(&self, n: i64) -> Result<i64> {
            Ok(self.cursor.fetch_add(n, Ordering::AcqRel) + n)
        }

        fn try_next_n(&self, n: i64) -> Result<i64> {
            if n as usize > self.size {
                return Err(DisruptorError::InsufficientCapacity);
            }
            self.next_n(n)
        }

        fn publish(&self, _sequence: i64) {}

        fn publish_range(&self, _lo: i64, _hi: i64) {}
    }

    #[test]
    fn test_default_single_claims_delegate() {
        let sequenced = CountingSequenced {
            cursor: AtomicI64::new(-1),
            size: 4,
        };

        assert_eq!(sequenced.next().unwrap(), 0);
        assert_eq!(sequenced.try_next().unwrap(), 1);
        assert_eq!(sequenced.get_cursor(), 1);
        assert!(matches!(
            sequenced.try_next_n(8),
            Err(DisruptorError::InsufficientCapacity)
        ));
    }
}
