//! Sequence Barrier Implementation
//!
//! A barrier is a consumer's view of how far it may read: bounded by the
//! producer cursor, by the sequences of the handlers it depends on, and for
//! multi-producer rings by the highest contiguously published sequence.

use crate::disruptor::{DisruptorError, Result, Sequence, Sequencer, WaitStrategy};
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Coordination point between a consumer and everything upstream of it
pub trait SequenceBarrier: Send + Sync + Debug {
    /// Wait for `sequence` to become available for consumption
    ///
    /// # Returns
    /// The highest sequence that may be read; may exceed `sequence`
    ///
    /// # Errors
    /// `Alert` if the barrier was alerted, `Timeout` from timeout-capable
    /// wait strategies.
    fn wait_for(&self, sequence: i64) -> Result<i64>;

    /// Current producer cursor
    fn get_cursor(&self) -> i64;

    /// Whether the barrier has been alerted
    fn is_alerted(&self) -> bool;

    /// Alert the barrier, waking any consumer blocked in `wait_for`
    fn alert(&self);

    /// Clear the alert flag
    fn clear_alert(&self);

    /// Fail with `Alert` if the barrier has been alerted
    fn check_alert(&self) -> Result<()> {
        if self.is_alerted() {
            Err(DisruptorError::Alert)
        } else {
            Ok(())
        }
    }
}

/// Barrier handed to event processors and work processors
pub struct ProcessingSequenceBarrier {
    sequencer: Arc<dyn Sequencer>,
    wait_strategy: Arc<dyn WaitStrategy>,
    cursor: Arc<Sequence>,
    dependent_sequences: Vec<Arc<Sequence>>,
    alerted: AtomicBool,
}

impl ProcessingSequenceBarrier {
    /// Create a barrier over `sequencer` gated by `dependent_sequences`
    ///
    /// An empty dependency list means the consumer reads directly behind
    /// the producer.
    pub fn new(sequencer: Arc<dyn Sequencer>, dependent_sequences: Vec<Arc<Sequence>>) -> Self {
        Self {
            wait_strategy: sequencer.wait_strategy(),
            cursor: sequencer.cursor_sequence(),
            sequencer,
            dependent_sequences,
            alerted: AtomicBool::new(false),
        }
    }

    /// Sequences this barrier waits on
    pub fn dependent_sequences(&self) -> &[Arc<Sequence>] {
        &self.dependent_sequences
    }
}

impl SequenceBarrier for ProcessingSequenceBarrier {
    fn wait_for(&self, sequence: i64) -> Result<i64> {
        self.check_alert()?;

        let available =
            self.wait_strategy
                .wait_for(sequence, &self.cursor, &self.dependent_sequences, self)?;

        if available < sequence {
            return Ok(available);
        }

        Ok(self.sequencer.get_highest_published_sequence(sequence, available))
    }

    fn get_cursor(&self) -> i64 {
        if self.dependent_sequences.is_empty() {
            self.cursor.get()
        } else {
            Sequence::get_minimum_sequence(&self.dependent_sequences, i64::MAX)
        }
    }

    fn is_alerted(&self) -> bool {
        self.alerted.load(Ordering::Acquire)
    }

    fn alert(&self) {
        self.alerted.store(true, Ordering::Release);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn clear_alert(&self) {
        self.alerted.store(false, Ordering::Release);
    }
}

impl Debug for ProcessingSequenceBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingSequenceBarrier")
            .field("cursor", &self.cursor)
            .field("dependent_sequences", &self.dependent_sequences)
            .field("alerted", &self.is_alerted())
            .finish()
    }
}
