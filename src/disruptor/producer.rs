//! Producer facade
//!
//! `Producer` pairs a ring buffer with its sequencer and wraps the
//! claim / write / publish protocol, so callers never touch a slot they do
//! not own. It is cheap to clone; clones share the same ring.

use crate::disruptor::ring_buffer::BatchIterMut;
use crate::disruptor::{
    DisruptorError, EventFactory, EventTranslator, EventTranslatorOneArg, EventTranslatorThreeArg,
    EventTranslatorTwoArg, MultiProducerSequencer, ProcessingSequenceBarrier, ProducerType, Result,
    RingBuffer, Sequence, Sequencer, SingleProducerSequencer, WaitStrategy,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Publishing handle over a ring buffer and its sequencer
///
/// With [`ProducerType::Single`] only one thread may publish at a time,
/// whichever clone it uses.
///
/// Every claim registers itself before checking that publishes are still
/// accepted, so once [`Producer::close`] returns and no claim is in flight,
/// [`Producer::claimed`] bounds everything that will ever be published.
pub struct Producer<T> {
    ring_buffer: Arc<RingBuffer<T>>,
    sequencer: Arc<dyn Sequencer>,
    accepting: Arc<AtomicBool>,
    claiming: Arc<AtomicUsize>,
}

/// Deregisters an in-flight claim, also when the claim fails
struct ClaimGuard<'a>(&'a AtomicUsize);

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            ring_buffer: Arc::clone(&self.ring_buffer),
            sequencer: Arc::clone(&self.sequencer),
            accepting: Arc::clone(&self.accepting),
            claiming: Arc::clone(&self.claiming),
        }
    }
}

impl<T> Producer<T>
where
    T: Send + Sync,
{
    /// Pair an existing ring buffer and sequencer
    ///
    /// # Errors
    /// `Config` if their sizes differ
    pub fn new(ring_buffer: Arc<RingBuffer<T>>, sequencer: Arc<dyn Sequencer>) -> Result<Self> {
        if ring_buffer.buffer_size() != sequencer.get_buffer_size() {
            return Err(DisruptorError::Config(format!(
                "ring buffer size {} does not match sequencer size {}",
                ring_buffer.buffer_size(),
                sequencer.get_buffer_size()
            )));
        }
        Ok(Self {
            ring_buffer,
            sequencer,
            accepting: Arc::new(AtomicBool::new(true)),
            claiming: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Build a ring buffer and the sequencer for `producer_type`
    ///
    /// # Errors
    /// `InvalidBufferSize` unless `buffer_size` is a power of two
    pub fn create<F>(
        producer_type: ProducerType,
        event_factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        let sequencer: Arc<dyn Sequencer> = match producer_type {
            ProducerType::Single => Arc::new(SingleProducerSequencer::new(buffer_size, wait_strategy)?),
            ProducerType::Multi => Arc::new(MultiProducerSequencer::new(buffer_size, wait_strategy)?),
        };
        let ring_buffer = Arc::new(RingBuffer::new(buffer_size, event_factory)?);
        Self::new(ring_buffer, sequencer)
    }

    /// The underlying ring buffer
    pub fn ring_buffer(&self) -> &Arc<RingBuffer<T>> {
        &self.ring_buffer
    }

    /// The underlying sequencer
    pub fn sequencer(&self) -> &Arc<dyn Sequencer> {
        &self.sequencer
    }

    /// Ring capacity
    pub fn buffer_size(&self) -> usize {
        self.ring_buffer.buffer_size()
    }

    /// Current producer cursor
    pub fn cursor(&self) -> i64 {
        self.sequencer.get_cursor()
    }

    /// Free slots given the slowest gating consumer
    pub fn remaining_capacity(&self) -> i64 {
        self.sequencer.remaining_capacity()
    }

    /// Whether `n` slots could be claimed right now
    pub fn has_available_capacity(&self, n: usize) -> bool {
        self.sequencer.has_available_capacity(n)
    }

    /// Create a barrier over this ring gated by `dependent_sequences`
    pub fn new_barrier(&self, dependent_sequences: &[Arc<Sequence>]) -> Arc<ProcessingSequenceBarrier> {
        Arc::new(ProcessingSequenceBarrier::new(
            Arc::clone(&self.sequencer),
            dependent_sequences.to_vec(),
        ))
    }

    /// Add consumer sequences the producer must not overtake
    pub fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.sequencer.add_gating_sequences(gating_sequences);
    }

    /// Remove a gating sequence; returns whether it was present
    pub fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.sequencer.remove_gating_sequence(sequence)
    }

    /// Claim the next slot, waiting while the ring is full
    ///
    /// The slot must be written through [`Producer::get_mut`] and then
    /// passed to [`Producer::publish`].
    pub fn next(&self) -> Result<i64> {
        self.claim(|sequencer| sequencer.next())
    }

    /// Claim `n` contiguous slots, returning the highest sequence
    pub fn next_n(&self, n: usize) -> Result<i64> {
        self.claim(|sequencer| sequencer.next_n(n as i64))
    }

    /// Claim `n` contiguous slots without waiting
    ///
    /// # Errors
    /// `InsufficientCapacity` when the ring is too full
    pub fn try_next_n(&self, n: usize) -> Result<i64> {
        self.claim(|sequencer| sequencer.try_next_n(n as i64))
    }

    /// Mutable access to a claimed slot
    ///
    /// # Safety
    /// `sequence` must have been claimed by this thread and not yet published.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self, sequence: i64) -> &mut T {
        &mut *self.ring_buffer.get_mut_unchecked(sequence)
    }

    /// Publish a claimed slot
    pub fn publish(&self, sequence: i64) {
        self.sequencer.publish(sequence);
    }

    /// Publish claimed slots `lo..=hi`
    pub fn publish_range(&self, lo: i64, hi: i64) {
        self.sequencer.publish_range(lo, hi);
    }

    /// Claim, fill through `update`, and publish one slot
    pub fn publish_with<F>(&self, update: F) -> Result<i64>
    where
        F: FnOnce(&mut T, i64),
    {
        let sequence = self.next()?;
        self.write_and_publish(sequence, update);
        Ok(sequence)
    }

    /// Like [`Producer::publish_with`] but fails instead of waiting
    ///
    /// # Errors
    /// `InsufficientCapacity` when the ring is full
    pub fn try_publish_with<F>(&self, update: F) -> Result<i64>
    where
        F: FnOnce(&mut T, i64),
    {
        let sequence = self.claim(|sequencer| sequencer.try_next())?;
        self.write_and_publish(sequence, update);
        Ok(sequence)
    }

    /// Publish one event filled by `translator`
    pub fn publish_event<E>(&self, translator: &E) -> Result<i64>
    where
        E: EventTranslator<T> + ?Sized,
    {
        self.publish_with(|event, sequence| translator.translate_to(event, sequence))
    }

    /// Publish one event filled by `translator`, failing if the ring is full
    pub fn try_publish_event<E>(&self, translator: &E) -> Result<i64>
    where
        E: EventTranslator<T> + ?Sized,
    {
        self.try_publish_with(|event, sequence| translator.translate_to(event, sequence))
    }

    /// Publish one event filled by a one-argument translator
    pub fn publish_event_one_arg<A, E>(&self, translator: &E, arg0: A) -> Result<i64>
    where
        E: EventTranslatorOneArg<T, A> + ?Sized,
    {
        self.publish_with(|event, sequence| translator.translate_to(event, sequence, arg0))
    }

    /// Publish one event filled by a two-argument translator
    pub fn publish_event_two_arg<A, B, E>(&self, translator: &E, arg0: A, arg1: B) -> Result<i64>
    where
        E: EventTranslatorTwoArg<T, A, B> + ?Sized,
    {
        self.publish_with(|event, sequence| translator.translate_to(event, sequence, arg0, arg1))
    }

    /// Publish one event filled by a three-argument translator
    pub fn publish_event_three_arg<A, B, C, E>(&self, translator: &E, arg0: A, arg1: B, arg2: C) -> Result<i64>
    where
        E: EventTranslatorThreeArg<T, A, B, C> + ?Sized,
    {
        self.publish_with(|event, sequence| translator.translate_to(event, sequence, arg0, arg1, arg2))
    }

    /// Claim `n` slots, fill them through `update`, and publish them together
    ///
    /// Returns the highest published sequence.
    pub fn publish_events<F>(&self, n: usize, update: F) -> Result<i64>
    where
        F: for<'a> FnOnce(BatchIterMut<'a, T>),
    {
        let hi = self.next_n(n)?;
        self.fill_and_publish_range(n, hi, update);
        Ok(hi)
    }

    /// Like [`Producer::publish_events`] but fails instead of waiting
    pub fn try_publish_events<F>(&self, n: usize, update: F) -> Result<i64>
    where
        F: for<'a> FnOnce(BatchIterMut<'a, T>),
    {
        let hi = self.try_next_n(n)?;
        self.fill_and_publish_range(n, hi, update);
        Ok(hi)
    }

    /// Stop accepting new publishes from every clone
    ///
    /// Claims that already passed the check keep going; wait for
    /// [`Producer::has_claims_in_flight`] to clear before trusting
    /// [`Producer::claimed`].
    pub(crate) fn close(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    /// Whether publishes are still accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Whether some thread is between the accepting check and its claim
    pub(crate) fn has_claims_in_flight(&self) -> bool {
        self.claiming.load(Ordering::SeqCst) > 0
    }

    /// Highest sequence claimed so far, published or not
    pub(crate) fn claimed(&self) -> i64 {
        self.sequencer.get_claimed_sequence()
    }

    fn claim<F>(&self, claim: F) -> Result<i64>
    where
        F: FnOnce(&dyn Sequencer) -> Result<i64>,
    {
        self.claiming.fetch_add(1, Ordering::SeqCst);
        let _guard = ClaimGuard(&self.claiming);
        if !self.is_accepting() {
            return Err(DisruptorError::Lifecycle("producer is closed, shutdown in progress".to_string()));
        }
        claim(self.sequencer.as_ref())
    }

    fn write_and_publish<F>(&self, sequence: i64, update: F)
    where
        F: FnOnce(&mut T, i64),
    {
        // SAFETY: `sequence` was just claimed from the sequencer and is not
        // visible to consumers until published below.
        let event = unsafe { self.get_mut(sequence) };
        update(event, sequence);
        self.sequencer.publish(sequence);
    }

    fn fill_and_publish_range<F>(&self, n: usize, hi: i64, update: F)
    where
        F: for<'a> FnOnce(BatchIterMut<'a, T>),
    {
        let lo = hi - (n as i64 - 1);
        // SAFETY: `lo..=hi` was claimed as one run and is unpublished.
        let events = unsafe { self.ring_buffer.batch_iter_mut(lo, hi) };
        update(events);
        self.sequencer.publish_range(lo, hi);
    }
}

impl<T> std::fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("sequencer", &self.sequencer)
            .field("accepting", &self.accepting.load(Ordering::SeqCst))
            .finish()
    }
}
