//! Event handlers
//!
//! An [`EventHandler`] is driven by a [`BatchEventProcessor`](crate::disruptor::BatchEventProcessor)
//! on its own thread and sees every event of the ring in sequence order.
//! Handlers are readers: the slot was written by the producer before it
//! was published, and several handlers may read the same slot concurrently.

use crate::disruptor::{Result, Sequence};
use std::sync::Arc;

/// Callback interface for processing events
///
/// # Examples
/// ```
/// use seqflow::disruptor::{EventHandler, Result};
///
/// struct Journaller {
///     written: Vec<i64>,
/// }
///
/// impl EventHandler<i64> for Journaller {
///     fn on_event(&mut self, event: &i64, _sequence: i64, end_of_batch: bool) -> Result<()> {
///         self.written.push(*event);
///         if end_of_batch {
///             // flush
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait EventHandler<T>: Send {
    /// Called for each event, in sequence order
    ///
    /// `end_of_batch` is true for the last event of the run returned by one
    /// barrier wait, which makes it the natural point to flush buffered work.
    ///
    /// # Errors
    /// Errors go to the processor's exception handler; the processor then
    /// moves on to the next event.
    fn on_event(&mut self, event: &T, sequence: i64, end_of_batch: bool) -> Result<()>;

    /// Called once on the processor thread before the first event
    fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once on the processor thread after the last event
    fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called before each batch with the number of events about to be delivered
    fn on_batch_start(&mut self, _batch_size: i64) {}

    /// Called when a timeout-capable wait strategy gave up waiting
    fn on_timeout(&mut self, _sequence: i64) -> Result<()> {
        Ok(())
    }

    /// Receives the processor's own sequence before `on_start`
    ///
    /// Handlers that finish with a slot early may advance it themselves to
    /// release capacity mid-batch.
    fn set_sequence_callback(&mut self, _sequence: Arc<Sequence>) {}
}

/// Handler backed by a closure
pub struct ClosureEventHandler<T, F>
where
    F: FnMut(&T, i64, bool) -> Result<()> + Send,
{
    handler_fn: F,
    _phantom: std::marker::PhantomData<fn(&T)>,
}

impl<T, F> ClosureEventHandler<T, F>
where
    F: FnMut(&T, i64, bool) -> Result<()> + Send,
{
    /// Wrap `handler_fn`
    pub fn new(handler_fn: F) -> Self {
        Self {
            handler_fn,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T, F> EventHandler<T> for ClosureEventHandler<T, F>
where
    F: FnMut(&T, i64, bool) -> Result<()> + Send,
{
    fn on_event(&mut self, event: &T, sequence: i64, end_of_batch: bool) -> Result<()> {
        (self.handler_fn)(event, sequence, end_of_batch)
    }
}

/// Handler that does nothing; useful as a pure gating stage
#[derive(Debug, Default)]
pub struct NoOpEventHandler;

impl NoOpEventHandler {
    /// Create a no-op handler
    pub fn new() -> Self {
        Self
    }
}

impl<T> EventHandler<T> for NoOpEventHandler {
    fn on_event(&mut self, _event: &T, _sequence: i64, _end_of_batch: bool) -> Result<()> {
        Ok(())
    }
}
