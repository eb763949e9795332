//! Wait Strategy Implementation
//!
//! A wait strategy decides how a consumer that has caught up with its
//! upstream idles until the next sequence becomes available. Every strategy
//! returns the highest sequence that is both at or beyond the target and no
//! greater than the minimum of the dependent sequences (or the cursor when a
//! consumer has no upstream handlers), and gives up with
//! [`DisruptorError::Alert`] once the barrier is alerted.

use crate::disruptor::{DisruptorError, Result, Sequence, SequenceBarrier};
use parking_lot::{Condvar, Mutex};
use std::fmt::Debug;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Strategy for waiting for events to become available
pub trait WaitStrategy: Send + Sync + Debug {
    /// Wait until `sequence` is available
    ///
    /// # Arguments
    /// * `sequence` - The sequence to wait for
    /// * `cursor` - The producer cursor
    /// * `dependent_sequences` - Upstream consumer sequences; empty for
    ///   consumers that read straight off the producer
    /// * `barrier` - Polled for alerts while waiting
    ///
    /// # Returns
    /// The available sequence, which may be higher than requested
    ///
    /// # Errors
    /// `Alert` when the barrier is alerted, `Timeout` from strategies that
    /// bound the wait.
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64>;

    /// Wake every thread blocked in `wait_for`
    ///
    /// Called by the sequencer on publish and by the barrier on alert.
    fn signal_all_when_blocking(&self);
}

/// Highest sequence readable given the dependencies
#[inline]
fn dependent_sequence(cursor: &Sequence, dependent_sequences: &[Arc<Sequence>]) -> i64 {
    if dependent_sequences.is_empty() {
        cursor.get()
    } else {
        Sequence::get_minimum_sequence(dependent_sequences, i64::MAX)
    }
}

/// Spin on the dependent sequences once the cursor is known to be ahead
fn spin_on_dependents(
    sequence: i64,
    cursor: &Sequence,
    dependent_sequences: &[Arc<Sequence>],
    barrier: &dyn SequenceBarrier,
) -> Result<i64> {
    loop {
        let available = dependent_sequence(cursor, dependent_sequences);
        if available >= sequence {
            return Ok(available);
        }
        barrier.check_alert()?;
        std::hint::spin_loop();
    }
}

/// Blocking wait strategy using a lock and condition variable
///
/// The lowest CPU usage of all strategies. Publishers must signal, which
/// the sequencers do on every publish.
#[derive(Debug, Default)]
pub struct BlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl BlockingWaitStrategy {
    /// Create a new blocking wait strategy
    pub fn new() -> Self {
        Self::default()
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64> {
        if cursor.get() < sequence {
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                barrier.check_alert()?;
                self.condvar.wait(&mut guard);
            }
        }

        spin_on_dependents(sequence, cursor, dependent_sequences, barrier)
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}

/// Blocking wait strategy that gives up after a fixed duration
///
/// Returns [`DisruptorError::Timeout`] when the cursor does not reach the
/// requested sequence in time. Processors turn that into an `on_timeout`
/// callback and keep waiting.
#[derive(Debug)]
pub struct TimeoutBlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
    timeout: Duration,
}

impl TimeoutBlockingWaitStrategy {
    /// Create a strategy that waits at most `timeout` per call
    pub fn new(timeout: Duration) -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
            timeout,
        }
    }

    /// The configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl WaitStrategy for TimeoutBlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64> {
        if cursor.get() < sequence {
            let deadline = Instant::now() + self.timeout;
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                barrier.check_alert()?;
                if self.condvar.wait_until(&mut guard, deadline).timed_out()
                    && cursor.get() < sequence
                {
                    return Err(DisruptorError::Timeout);
                }
            }
        }

        spin_on_dependents(sequence, cursor, dependent_sequences, barrier)
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}

/// Busy-spin wait strategy
///
/// Lowest latency, but burns a full core while waiting. Use only when
/// processor threads can be pinned to dedicated cores.
#[derive(Debug, Default, Clone, Copy)]
pub struct BusySpinWaitStrategy;

impl BusySpinWaitStrategy {
    /// Create a new busy-spin wait strategy
    pub fn new() -> Self {
        Self
    }
}

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64> {
        spin_on_dependents(sequence, cursor, dependent_sequences, barrier)
    }

    fn signal_all_when_blocking(&self) {}
}

/// Yielding wait strategy
///
/// Spins for `spin_tries` iterations and then yields the thread on every
/// further iteration.
#[derive(Debug, Clone, Copy)]
pub struct YieldingWaitStrategy {
    spin_tries: u32,
}

impl YieldingWaitStrategy {
    const DEFAULT_SPIN_TRIES: u32 = 100;

    /// Create a new yielding wait strategy
    pub fn new() -> Self {
        Self::with_spin_tries(Self::DEFAULT_SPIN_TRIES)
    }

    /// Create a yielding strategy with a custom spin count
    pub fn with_spin_tries(spin_tries: u32) -> Self {
        Self { spin_tries }
    }
}

impl Default for YieldingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64> {
        let mut counter = self.spin_tries;
        loop {
            let available = dependent_sequence(cursor, dependent_sequences);
            if available >= sequence {
                return Ok(available);
            }
            barrier.check_alert()?;
            if counter == 0 {
                thread::yield_now();
            } else {
                counter -= 1;
                std::hint::spin_loop();
            }
        }
    }

    fn signal_all_when_blocking(&self) {}
}

/// Sleeping wait strategy
///
/// Spins for the first half of `retries`, yields for the second half and
/// then sleeps, starting at one nanosecond and doubling the sleep up to
/// `max_sleep`.
#[derive(Debug, Clone, Copy)]
pub struct SleepingWaitStrategy {
    retries: u32,
    max_sleep: Duration,
}

impl SleepingWaitStrategy {
    const DEFAULT_RETRIES: u32 = 200;
    const DEFAULT_MAX_SLEEP: Duration = Duration::from_micros(100);

    /// Create a new sleeping wait strategy with default tuning
    pub fn new() -> Self {
        Self::with_retries(Self::DEFAULT_RETRIES, Self::DEFAULT_MAX_SLEEP)
    }

    /// Create a sleeping strategy with custom retries and sleep ceiling
    pub fn with_retries(retries: u32, max_sleep: Duration) -> Self {
        Self {
            retries,
            max_sleep: max_sleep.max(Duration::from_nanos(1)),
        }
    }
}

impl Default for SleepingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64> {
        let spin_until = self.retries / 2;
        let mut counter = self.retries;
        let mut sleep = Duration::from_nanos(1);
        loop {
            let available = dependent_sequence(cursor, dependent_sequences);
            if available >= sequence {
                return Ok(available);
            }
            barrier.check_alert()?;
            if counter > spin_until {
                counter -= 1;
                std::hint::spin_loop();
            } else if counter > 0 {
                counter -= 1;
                thread::yield_now();
            } else {
                thread::sleep(sleep);
                sleep = (sleep * 2).min(self.max_sleep);
            }
        }
    }

    fn signal_all_when_blocking(&self) {}
}

/// Phased back-off wait strategy
///
/// Spins until `spin_timeout` has elapsed, then yields until
/// `yield_timeout`, then hands the wait over to a fallback strategy.
#[derive(Debug)]
pub struct PhasedBackoffWaitStrategy {
    spin_timeout: Duration,
    yield_timeout: Duration,
    fallback: Box<dyn WaitStrategy>,
}

impl PhasedBackoffWaitStrategy {
    const SPIN_TRIES: u32 = 10_000;

    /// Create a phased strategy with an explicit fallback
    ///
    /// `yield_timeout` is measured from the start of the wait, so it should
    /// be at least `spin_timeout`.
    pub fn new(spin_timeout: Duration, yield_timeout: Duration, fallback: Box<dyn WaitStrategy>) -> Self {
        Self {
            spin_timeout,
            yield_timeout: yield_timeout.max(spin_timeout),
            fallback,
        }
    }

    /// Phased strategy falling back to [`BlockingWaitStrategy`]
    pub fn with_lock(spin_timeout: Duration, yield_timeout: Duration) -> Self {
        Self::new(spin_timeout, yield_timeout, Box::new(BlockingWaitStrategy::new()))
    }

    /// Phased strategy falling back to [`SleepingWaitStrategy`]
    pub fn with_sleep(spin_timeout: Duration, yield_timeout: Duration) -> Self {
        Self::new(spin_timeout, yield_timeout, Box::new(SleepingWaitStrategy::new()))
    }
}

impl WaitStrategy for PhasedBackoffWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64> {
        let mut start: Option<Instant> = None;
        let mut counter = Self::SPIN_TRIES;
        loop {
            let available = dependent_sequence(cursor, dependent_sequences);
            if available >= sequence {
                return Ok(available);
            }

            counter -= 1;
            if counter > 0 {
                std::hint::spin_loop();
                continue;
            }
            counter = Self::SPIN_TRIES;
            barrier.check_alert()?;

            match start {
                None => start = Some(Instant::now()),
                Some(started) => {
                    let elapsed = started.elapsed();
                    if elapsed > self.yield_timeout {
                        return self.fallback.wait_for(sequence, cursor, dependent_sequences, barrier);
                    }
                    if elapsed > self.spin_timeout {
                        thread::yield_now();
                    }
                }
            }
        }
    }

    fn signal_all_when_blocking(&self) {
        self.fallback.signal_all_when_blocking();
    }
}
