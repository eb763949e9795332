//! Exception Handler Implementation
//!
//! Handler failures on consumer threads are never returned to the caller;
//! the processor reports them here and carries on with the next event.

use crate::disruptor::DisruptorError;
use tracing::error;

/// Receives errors raised by handlers on processor threads
///
/// # Type Parameters
/// * `T` - The event type being processed
pub trait ExceptionHandler<T>: Send + Sync {
    /// A handler failed on the event at `sequence`
    ///
    /// `event` is `None` when the failure was not tied to a slot, such as
    /// an error from `on_timeout`.
    fn handle_event_exception(&self, error: DisruptorError, sequence: i64, event: Option<&T>);

    /// `on_start` failed; the processor still runs
    fn handle_on_start_exception(&self, error: DisruptorError);

    /// `on_shutdown` failed
    fn handle_on_shutdown_exception(&self, error: DisruptorError);
}

/// Logs every failure through `tracing` and lets the processor continue
#[derive(Debug)]
pub struct DefaultExceptionHandler<T> {
    _phantom: std::marker::PhantomData<fn(&T)>,
}

impl<T> DefaultExceptionHandler<T> {
    /// Create a new logging exception handler
    pub fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T> Default for DefaultExceptionHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ExceptionHandler<T> for DefaultExceptionHandler<T> {
    fn handle_event_exception(&self, error: DisruptorError, sequence: i64, _event: Option<&T>) {
        error!(sequence, %error, "exception processing event");
    }

    fn handle_on_start_exception(&self, error: DisruptorError) {
        error!(%error, "exception during processor start");
    }

    fn handle_on_shutdown_exception(&self, error: DisruptorError) {
        error!(%error, "exception during processor shutdown");
    }
}

/// Silently drops every failure
#[derive(Debug)]
pub struct IgnoreExceptionHandler<T> {
    _phantom: std::marker::PhantomData<fn(&T)>,
}

impl<T> IgnoreExceptionHandler<T> {
    /// Create a new ignoring exception handler
    pub fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T> Default for IgnoreExceptionHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ExceptionHandler<T> for IgnoreExceptionHandler<T> {
    fn handle_event_exception(&self, _error: DisruptorError, _sequence: i64, _event: Option<&T>) {}

    fn handle_on_start_exception(&self, _error: DisruptorError) {}

    fn handle_on_shutdown_exception(&self, _error: DisruptorError) {}
}

/// Treats any handler failure as fatal and panics the processor thread
///
/// The panic stops that processor, which in turn stalls every producer
/// gated on it; use it where continuing past a failed event is worse.
#[derive(Debug)]
pub struct FatalExceptionHandler<T> {
    _phantom: std::marker::PhantomData<fn(&T)>,
}

impl<T> FatalExceptionHandler<T> {
    /// Create a new fatal exception handler
    pub fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T> Default for FatalExceptionHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ExceptionHandler<T> for FatalExceptionHandler<T> {
    fn handle_event_exception(&self, error: DisruptorError, sequence: i64, _event: Option<&T>) {
        error!(sequence, %error, "fatal exception processing event");
        panic!("fatal exception processing event at sequence {sequence}: {error}");
    }

    fn handle_on_start_exception(&self, error: DisruptorError) {
        error!(%error, "exception during processor start");
    }

    fn handle_on_shutdown_exception(&self, error: DisruptorError) {
        error!(%error, "exception during processor shutdown");
    }
}

/// Exception handler backed by a closure for event failures
///
/// Start and shutdown failures are logged.
pub struct ClosureExceptionHandler<T, F>
where
    F: Fn(DisruptorError, i64, Option<&T>) + Send + Sync,
{
    handler_fn: F,
    _phantom: std::marker::PhantomData<fn(&T)>,
}

impl<T, F> ClosureExceptionHandler<T, F>
where
    F: Fn(DisruptorError, i64, Option<&T>) + Send + Sync,
{
    /// Wrap `handler_fn`
    pub fn new(handler_fn: F) -> Self {
        Self {
            handler_fn,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T, F> ExceptionHandler<T> for ClosureExceptionHandler<T, F>
where
    F: Fn(DisruptorError, i64, Option<&T>) + Send + Sync,
{
    fn handle_event_exception(&self, error: DisruptorError, sequence: i64, event: Option<&T>) {
        (self.handler_fn)(error, sequence, event);
    }

    fn handle_on_start_exception(&self, error: DisruptorError) {
        error!(%error, "exception during processor start");
    }

    fn handle_on_shutdown_exception(&self, error: DisruptorError) {
        error!(%error, "exception during processor shutdown");
    }
}
