//! Work handlers
//!
//! A [`WorkHandler`] belongs to a worker pool: each event reaches exactly
//! one handler of the pool, so handlers see a disjoint subset of the
//! sequence space rather than every event.

use crate::disruptor::Result;

/// Callback interface for worker pool members
pub trait WorkHandler<T>: Send {
    /// Process one event claimed by this worker
    ///
    /// # Errors
    /// Errors go to the pool's exception handler and the worker moves on.
    fn on_event(&mut self, event: &T) -> Result<()>;

    /// Called once on the worker thread before the first event
    fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once on the worker thread after the last event
    fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called when a timeout-capable wait strategy gave up waiting
    fn on_timeout(&mut self, _sequence: i64) -> Result<()> {
        Ok(())
    }
}

/// Work handler backed by a closure
pub struct ClosureWorkHandler<T, F>
where
    F: FnMut(&T) -> Result<()> + Send,
{
    handler_fn: F,
    _phantom: std::marker::PhantomData<fn(&T)>,
}

impl<T, F> ClosureWorkHandler<T, F>
where
    F: FnMut(&T) -> Result<()> + Send,
{
    /// Wrap `handler_fn`
    pub fn new(handler_fn: F) -> Self {
        Self {
            handler_fn,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T, F> WorkHandler<T> for ClosureWorkHandler<T, F>
where
    F: FnMut(&T) -> Result<()> + Send,
{
    fn on_event(&mut self, event: &T) -> Result<()> {
        (self.handler_fn)(event)
    }
}
