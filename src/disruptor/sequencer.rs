//! Sequencer Implementation
//!
//! The sequencer owns the producer cursor. It hands out slots to producers,
//! marks them published, answers availability queries for barriers and
//! refuses claims that would overwrite slots a gating consumer has not yet
//! passed.

use crate::disruptor::core_interfaces::{Cursored, Sequenced};
use crate::disruptor::{is_power_of_two, DisruptorError, Result, Sequence, WaitStrategy};
use crossbeam_utils::Backoff;
use parking_lot::RwLock;
use std::fmt::Debug;
use std::sync::atomic::{fence, AtomicI32, Ordering};
use std::sync::Arc;

/// Coordinates claiming and publishing of ring buffer slots
pub trait Sequencer: Cursored + Sequenced + Send + Sync + Debug {
    /// The cursor sequence itself, for barriers to wait on
    fn cursor_sequence(&self) -> Arc<Sequence>;

    /// Wait strategy consumers of this sequencer idle with
    fn wait_strategy(&self) -> Arc<dyn WaitStrategy>;

    /// Whether `sequence` has been published
    fn is_available(&self, sequence: i64) -> bool;

    /// Largest `s` in `next_sequence..=available_sequence` such that every
    /// sequence from `next_sequence` to `s` is published.
    ///
    /// Returns `next_sequence - 1` when `next_sequence` itself is missing.
    fn get_highest_published_sequence(&self, next_sequence: i64, available_sequence: i64) -> i64;

    /// Add consumer sequences that bound wrap-around
    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]);

    /// Remove a gating sequence; returns whether it was present
    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool;

    /// Minimum of the gating sequences and the cursor
    fn get_minimum_sequence(&self) -> i64;

    /// Highest sequence handed to a publisher, whether published or not
    fn get_claimed_sequence(&self) -> i64;
}

fn validate_buffer_size(buffer_size: usize) -> Result<()> {
    if !is_power_of_two(buffer_size) || buffer_size > i32::MAX as usize {
        return Err(DisruptorError::InvalidBufferSize(buffer_size));
    }
    Ok(())
}

fn validate_claim(n: i64, buffer_size: usize) -> Result<()> {
    if n < 1 || n > buffer_size as i64 {
        return Err(DisruptorError::Config(format!(
            "claim size must be between 1 and {buffer_size}, got: {n}"
        )));
    }
    Ok(())
}

fn remove_sequence(gating_sequences: &RwLock<Vec<Arc<Sequence>>>, sequence: &Arc<Sequence>) -> bool {
    let mut sequences = gating_sequences.write();
    let before = sequences.len();
    sequences.retain(|s| !Arc::ptr_eq(s, sequence));
    sequences.len() != before
}

/// Sequencer for a single publishing thread
///
/// The claim position is private to the producer, so claiming needs no
/// CAS; `publish` moves the cursor, which is what consumers observe.
#[derive(Debug)]
pub struct SingleProducerSequencer {
    buffer_size: usize,
    wait_strategy: Arc<dyn WaitStrategy>,
    /// Highest published sequence
    cursor: Arc<Sequence>,
    gating_sequences: RwLock<Vec<Arc<Sequence>>>,
    /// Highest claimed sequence; written only by the producer
    next_value: Sequence,
    /// Last observed minimum gating sequence
    cached_value: Sequence,
}

impl SingleProducerSequencer {
    /// Create a new single producer sequencer
    ///
    /// # Errors
    /// `InvalidBufferSize` unless `buffer_size` is a power of two
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        validate_buffer_size(buffer_size)?;
        Ok(Self {
            buffer_size,
            wait_strategy,
            cursor: Arc::new(Sequence::default()),
            gating_sequences: RwLock::new(Vec::new()),
            next_value: Sequence::default(),
            cached_value: Sequence::default(),
        })
    }

    fn minimum_gating(&self, default: i64) -> i64 {
        Sequence::get_minimum_sequence(&self.gating_sequences.read(), default)
    }

    fn has_capacity(&self, required_capacity: i64) -> bool {
        let next_value = self.next_value.get();
        let wrap_point = next_value + required_capacity - self.buffer_size as i64;
        let cached_gating = self.cached_value.get();

        if wrap_point > cached_gating || cached_gating > next_value {
            fence(Ordering::SeqCst);
            let min_sequence = self.minimum_gating(next_value);
            self.cached_value.set(min_sequence);
            if wrap_point > min_sequence {
                return false;
            }
        }
        true
    }
}

impl Cursored for SingleProducerSequencer {
    fn get_cursor(&self) -> i64 {
        self.cursor.get()
    }
}

impl Sequenced for SingleProducerSequencer {
    fn get_buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn has_available_capacity(&self, required_capacity: usize) -> bool {
        self.has_capacity(required_capacity as i64)
    }

    fn remaining_capacity(&self) -> i64 {
        let next_value = self.next_value.get();
        let consumed = self.minimum_gating(next_value);
        self.buffer_size as i64 - (next_value - consumed)
    }

    fn next_n(&self, n: i64) -> Result<i64> {
        validate_claim(n, self.buffer_size)?;

        let next_value = self.next_value.get();
        let next_sequence = next_value + n;
        let wrap_point = next_sequence - self.buffer_size as i64;
        let cached_gating = self.cached_value.get();

        if wrap_point > cached_gating || cached_gating > next_value {
            fence(Ordering::SeqCst);
            let backoff = Backoff::new();
            let mut min_sequence = self.minimum_gating(next_value);
            while wrap_point > min_sequence {
                backoff.snooze();
                min_sequence = self.minimum_gating(next_value);
            }
            self.cached_value.set(min_sequence);
        }

        self.next_value.set(next_sequence);
        Ok(next_sequence)
    }

    fn try_next_n(&self, n: i64) -> Result<i64> {
        validate_claim(n, self.buffer_size)?;

        if !self.has_capacity(n) {
            return Err(DisruptorError::InsufficientCapacity);
        }

        let next_sequence = self.next_value.get() + n;
        self.next_value.set(next_sequence);
        Ok(next_sequence)
    }

    fn publish(&self, sequence: i64) {
        self.cursor.set(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, _lo: i64, hi: i64) {
        self.publish(hi);
    }
}

impl Sequencer for SingleProducerSequencer {
    fn cursor_sequence(&self) -> Arc<Sequence> {
        Arc::clone(&self.cursor)
    }

    fn wait_strategy(&self) -> Arc<dyn WaitStrategy> {
        Arc::clone(&self.wait_strategy)
    }

    fn is_available(&self, sequence: i64) -> bool {
        sequence <= self.cursor.get()
    }

    fn get_highest_published_sequence(&self, _next_sequence: i64, available_sequence: i64) -> i64 {
        available_sequence
    }

    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        let cursor = self.cursor.get();
        let mut sequences = self.gating_sequences.write();
        for sequence in gating_sequences {
            sequence.set(cursor);
            sequences.push(Arc::clone(sequence));
        }
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        remove_sequence(&self.gating_sequences, sequence)
    }

    fn get_minimum_sequence(&self) -> i64 {
        self.minimum_gating(self.cursor.get())
    }

    fn get_claimed_sequence(&self) -> i64 {
        self.next_value.get()
    }
}

/// Sequencer for concurrent publishing threads
///
/// Claims race on the cursor with CAS, so the cursor runs ahead of what is
/// actually published. Each publish stamps its slot in the availability
/// buffer with the lap number `sequence >> log2(size)`, letting consumers
/// see exactly which claimed slots have been written.
pub struct MultiProducerSequencer {
    buffer_size: usize,
    wait_strategy: Arc<dyn WaitStrategy>,
    /// Highest claimed sequence
    cursor: Arc<Sequence>,
    gating_sequences: RwLock<Vec<Arc<Sequence>>>,
    gating_sequence_cache: Sequence,
    available_buffer: Box<[AtomicI32]>,
    index_mask: i64,
    index_shift: u32,
}

impl MultiProducerSequencer {
    /// Create a new multi producer sequencer
    ///
    /// # Errors
    /// `InvalidBufferSize` unless `buffer_size` is a power of two
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        validate_buffer_size(buffer_size)?;
        let available_buffer = (0..buffer_size).map(|_| AtomicI32::new(-1)).collect();
        Ok(Self {
            buffer_size,
            wait_strategy,
            cursor: Arc::new(Sequence::default()),
            gating_sequences: RwLock::new(Vec::new()),
            gating_sequence_cache: Sequence::default(),
            available_buffer,
            index_mask: buffer_size as i64 - 1,
            index_shift: buffer_size.trailing_zeros(),
        })
    }

    fn minimum_gating(&self, default: i64) -> i64 {
        Sequence::get_minimum_sequence(&self.gating_sequences.read(), default)
    }

    #[inline]
    fn calculate_index(&self, sequence: i64) -> usize {
        (sequence & self.index_mask) as usize
    }

    #[inline]
    fn calculate_availability_flag(&self, sequence: i64) -> i32 {
        (sequence >> self.index_shift) as i32
    }

    fn set_available(&self, sequence: i64) {
        let index = self.calculate_index(sequence);
        self.available_buffer[index].store(self.calculate_availability_flag(sequence), Ordering::Release);
    }

    fn has_capacity(&self, cursor_value: i64, required_capacity: i64) -> bool {
        let wrap_point = cursor_value + required_capacity - self.buffer_size as i64;
        let cached_gating = self.gating_sequence_cache.get();

        if wrap_point > cached_gating || cached_gating > cursor_value {
            let min_sequence = self.minimum_gating(cursor_value);
            self.gating_sequence_cache.set(min_sequence);
            if wrap_point > min_sequence {
                return false;
            }
        }
        true
    }
}

impl Cursored for MultiProducerSequencer {
    fn get_cursor(&self) -> i64 {
        self.cursor.get()
    }
}

impl Sequenced for MultiProducerSequencer {
    fn get_buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn has_available_capacity(&self, required_capacity: usize) -> bool {
        self.has_capacity(self.cursor.get(), required_capacity as i64)
    }

    fn remaining_capacity(&self) -> i64 {
        let produced = self.cursor.get();
        let consumed = self.minimum_gating(produced);
        self.buffer_size as i64 - (produced - consumed)
    }

    fn next_n(&self, n: i64) -> Result<i64> {
        validate_claim(n, self.buffer_size)?;

        let backoff = Backoff::new();
        loop {
            let current = self.cursor.get();
            let next = current + n;
            let wrap_point = next - self.buffer_size as i64;
            let cached_gating = self.gating_sequence_cache.get();

            if wrap_point > cached_gating || cached_gating > current {
                let gating_sequence = self.minimum_gating(current);
                if wrap_point > gating_sequence {
                    backoff.snooze();
                    continue;
                }
                self.gating_sequence_cache.set(gating_sequence);
            } else if self.cursor.compare_and_set(current, next) {
                return Ok(next);
            }
        }
    }

    fn try_next_n(&self, n: i64) -> Result<i64> {
        validate_claim(n, self.buffer_size)?;

        loop {
            let current = self.cursor.get();
            let next = current + n;
            if !self.has_capacity(current, n) {
                return Err(DisruptorError::InsufficientCapacity);
            }
            if self.cursor.compare_and_set(current, next) {
                return Ok(next);
            }
        }
    }

    fn publish(&self, sequence: i64) {
        self.set_available(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, lo: i64, hi: i64) {
        for sequence in lo..=hi {
            self.set_available(sequence);
        }
        self.wait_strategy.signal_all_when_blocking();
    }
}

impl Sequencer for MultiProducerSequencer {
    fn cursor_sequence(&self) -> Arc<Sequence> {
        Arc::clone(&self.cursor)
    }

    fn wait_strategy(&self) -> Arc<dyn WaitStrategy> {
        Arc::clone(&self.wait_strategy)
    }

    fn is_available(&self, sequence: i64) -> bool {
        let index = self.calculate_index(sequence);
        self.available_buffer[index].load(Ordering::Acquire) == self.calculate_availability_flag(sequence)
    }

    fn get_highest_published_sequence(&self, next_sequence: i64, available_sequence: i64) -> i64 {
        for sequence in next_sequence..=available_sequence {
            if !self.is_available(sequence) {
                return sequence - 1;
            }
        }
        available_sequence
    }

    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        let cursor = self.cursor.get();
        let mut sequences = self.gating_sequences.write();
        for sequence in gating_sequences {
            sequence.set(cursor);
            sequences.push(Arc::clone(sequence));
        }
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        remove_sequence(&self.gating_sequences, sequence)
    }

    fn get_minimum_sequence(&self) -> i64 {
        self.minimum_gating(self.cursor.get())
    }

    // claims advance the cursor directly
    fn get_claimed_sequence(&self) -> i64 {
        self.cursor.get()
    }
}

impl Debug for MultiProducerSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiProducerSequencer")
            .field("buffer_size", &self.buffer_size)
            .field("cursor", &self.cursor)
            .field("gating_sequences", &self.gating_sequences.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruptor::BusySpinWaitStrategy;
    use std::collections::HashSet;
    use std::thread;
    use std::time::Duration;

    fn wait_strategy() -> Arc<dyn WaitStrategy> {
        Arc::new(BusySpinWaitStrategy::new())
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        assert!(matches!(
            SingleProducerSequencer::new(12, wait_strategy()),
            Err(DisruptorError::InvalidBufferSize(12))
        ));
        assert!(matches!(
            MultiProducerSequencer::new(0, wait_strategy()),
            Err(DisruptorError::InvalidBufferSize(0))
        ));
    }

    #[test]
    fn test_rejects_bad_claim_sizes() {
        let sequencer = SingleProducerSequencer::new(4, wait_strategy()).unwrap();
        assert!(matches!(sequencer.next_n(0), Err(DisruptorError::Config(_))));
        assert!(matches!(sequencer.try_next_n(5), Err(DisruptorError::Config(_))));
    }

    #[test]
    fn test_single_producer_claim_then_publish() {
        let sequencer = SingleProducerSequencer::new(8, wait_strategy()).unwrap();

        assert_eq!(sequencer.next().unwrap(), 0);
        assert!(!sequencer.is_available(0));
        assert_eq!(sequencer.get_cursor(), -1);
        assert_eq!(sequencer.get_claimed_sequence(), 0);

        sequencer.publish(0);
        assert!(sequencer.is_available(0));
        assert_eq!(sequencer.get_cursor(), 0);

        assert_eq!(sequencer.next_n(3).unwrap(), 3);
        sequencer.publish_range(1, 3);
        assert!(sequencer.is_available(3));
        assert_eq!(sequencer.get_highest_published_sequence(1, 3), 3);
    }

    #[test]
    fn test_single_producer_try_next_respects_gating() {
        let sequencer = SingleProducerSequencer::new(4, wait_strategy()).unwrap();
        let consumer = Arc::new(Sequence::default());
        sequencer.add_gating_sequences(&[consumer.clone()]);

        for expected in 0..4 {
            let sequence = sequencer.try_next().unwrap();
            assert_eq!(sequence, expected);
            sequencer.publish(sequence);
        }
        assert_eq!(sequencer.remaining_capacity(), 0);
        assert!(!sequencer.has_available_capacity(1));
        assert!(matches!(sequencer.try_next(), Err(DisruptorError::InsufficientCapacity)));

        consumer.set(1);
        assert_eq!(sequencer.remaining_capacity(), 2);
        assert_eq!(sequencer.try_next_n(2).unwrap(), 5);
        assert!(matches!(sequencer.try_next(), Err(DisruptorError::InsufficientCapacity)));
    }

    #[test]
    fn test_single_producer_next_blocks_until_consumer_advances() {
        let sequencer = Arc::new(SingleProducerSequencer::new(2, wait_strategy()).unwrap());
        let consumer = Arc::new(Sequence::default());
        sequencer.add_gating_sequences(&[consumer.clone()]);

        let hi = sequencer.next_n(2).unwrap();
        sequencer.publish_range(0, hi);

        let releaser = {
            let consumer = consumer.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                consumer.set(0);
            })
        };

        assert_eq!(sequencer.next().unwrap(), 2);
        assert!(consumer.get() >= 0);
        releaser.join().unwrap();
    }

    #[test]
    fn test_gating_sequences_are_aligned_to_cursor_and_removable() {
        let sequencer = MultiProducerSequencer::new(8, wait_strategy()).unwrap();
        let hi = sequencer.next_n(3).unwrap();
        sequencer.publish_range(0, hi);

        let consumer = Arc::new(Sequence::default());
        sequencer.add_gating_sequences(&[consumer.clone()]);
        assert_eq!(consumer.get(), 2);
        assert_eq!(sequencer.get_minimum_sequence(), 2);

        assert!(sequencer.remove_gating_sequence(&consumer));
        assert!(!sequencer.remove_gating_sequence(&consumer));
    }

    #[test]
    fn test_multi_producer_availability_is_per_slot() {
        let sequencer = MultiProducerSequencer::new(4, wait_strategy()).unwrap();
        let hi = sequencer.next_n(4).unwrap();
        assert_eq!(hi, 3);
        assert_eq!(sequencer.get_cursor(), 3);

        sequencer.publish(2);
        assert!(!sequencer.is_available(0));
        assert!(sequencer.is_available(2));
        assert_eq!(sequencer.get_highest_published_sequence(0, 3), -1);

        sequencer.publish_range(0, 1);
        assert_eq!(sequencer.get_highest_published_sequence(0, 3), 2);
        sequencer.publish(3);
        assert_eq!(sequencer.get_highest_published_sequence(0, 3), 3);
    }

    #[test]
    fn test_multi_producer_lap_flags_distinguish_wraps() {
        let sequencer = MultiProducerSequencer::new(4, wait_strategy()).unwrap();
        let hi = sequencer.next_n(4).unwrap();
        sequencer.publish_range(0, hi);

        // sequence 4 shares a slot with 0 but belongs to the next lap
        assert!(sequencer.is_available(0));
        assert!(!sequencer.is_available(4));
    }

    #[test]
    fn test_multi_producer_concurrent_claims_are_unique() {
        let sequencer = Arc::new(MultiProducerSequencer::new(1024, wait_strategy()).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sequencer = sequencer.clone();
                thread::spawn(move || {
                    (0..200)
                        .map(|_| {
                            let sequence = sequencer.next().unwrap();
                            sequencer.publish(sequence);
                            sequence
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for sequence in handle.join().unwrap() {
                assert!(seen.insert(sequence), "sequence {sequence} claimed twice");
            }
        }
        assert_eq!(seen.len(), 800);
        assert_eq!(sequencer.get_highest_published_sequence(0, 799), 799);
    }

    #[test]
    fn test_multi_producer_try_next_respects_gating() {
        let sequencer = MultiProducerSequencer::new(4, wait_strategy()).unwrap();
        let consumer = Arc::new(Sequence::default());
        sequencer.add_gating_sequences(&[consumer.clone()]);

        assert_eq!(sequencer.try_next_n(4).unwrap(), 3);
        assert!(matches!(sequencer.try_next(), Err(DisruptorError::InsufficientCapacity)));
        consumer.set(0);
        assert_eq!(sequencer.try_next().unwrap(), 4);
    }
}
