//! Event Processor implementation
//!
//! An event processor is the single-threaded driver behind one consumer: it
//! asks its barrier how far it may read, hands each slot to its handler and
//! then publishes its own progress so downstream barriers and the producer
//! can move on.

use crate::disruptor::{
    DataProvider, DefaultExceptionHandler, DisruptorError, EventHandler, ExceptionHandler, Result,
    Sequence, SequenceBarrier,
};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

pub(crate) const IDLE: u8 = 0;
pub(crate) const HALTED: u8 = 1;
pub(crate) const RUNNING: u8 = 2;

/// A consumer loop that runs on its own thread
pub trait EventProcessor: Send {
    /// The sequence this processor publishes its progress through
    fn get_sequence(&self) -> Arc<Sequence>;

    /// Shareable control handle, valid after the processor moves to its thread
    fn handle(&self) -> ProcessorHandle;

    /// Ask the processor to stop after its current batch
    fn halt(&self) {
        self.handle().halt();
    }

    /// Whether the processor loop is currently executing
    fn is_running(&self) -> bool {
        self.handle().is_running()
    }

    /// Run the processing loop on the calling thread until halted
    ///
    /// # Errors
    /// `Lifecycle` if the processor is already running elsewhere.
    fn run(&mut self) -> Result<()>;
}

/// Cloneable control over a running processor
#[derive(Clone)]
pub struct ProcessorHandle {
    sequence: Arc<Sequence>,
    barrier: Arc<dyn SequenceBarrier>,
    running: Arc<AtomicU8>,
}

impl ProcessorHandle {
    pub(crate) fn new(sequence: Arc<Sequence>, barrier: Arc<dyn SequenceBarrier>, running: Arc<AtomicU8>) -> Self {
        Self {
            sequence,
            barrier,
            running,
        }
    }

    /// The processor's sequence
    pub fn sequence(&self) -> Arc<Sequence> {
        Arc::clone(&self.sequence)
    }

    /// Stop the processor: mark it halted and alert its barrier
    pub fn halt(&self) {
        self.running.store(HALTED, Ordering::Release);
        self.barrier.alert();
    }

    /// Whether the loop is executing (a halted loop counts until it exits)
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) != IDLE
    }
}

impl Debug for ProcessorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorHandle")
            .field("sequence", &self.sequence)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Drives one [`EventHandler`] over every event of the ring
///
/// Events are delivered in batches: one barrier wait yields a contiguous
/// run, each event of the run is handed over in order, and the processor's
/// sequence is advanced once for the whole run. A failing event is
/// reported to the exception handler and skipped.
pub struct BatchEventProcessor<T> {
    data_provider: Arc<dyn DataProvider<T>>,
    barrier: Arc<dyn SequenceBarrier>,
    handler: Box<dyn EventHandler<T>>,
    exception_handler: Arc<dyn ExceptionHandler<T>>,
    sequence: Arc<Sequence>,
    running: Arc<AtomicU8>,
}

impl<T> BatchEventProcessor<T>
where
    T: Send + Sync + 'static,
{
    /// Create a processor reading `data_provider` behind `barrier`
    pub fn new(
        data_provider: Arc<dyn DataProvider<T>>,
        barrier: Arc<dyn SequenceBarrier>,
        mut handler: Box<dyn EventHandler<T>>,
    ) -> Self {
        let sequence = Arc::new(Sequence::default());
        handler.set_sequence_callback(Arc::clone(&sequence));
        Self {
            data_provider,
            barrier,
            handler,
            exception_handler: Arc::new(DefaultExceptionHandler::new()),
            sequence,
            running: Arc::new(AtomicU8::new(IDLE)),
        }
    }

    /// Replace the exception handler
    pub fn set_exception_handler(&mut self, exception_handler: Arc<dyn ExceptionHandler<T>>) {
        self.exception_handler = exception_handler;
    }

    fn process_events(&mut self) {
        let mut next_sequence = self.sequence.get() + 1;

        loop {
            match self.barrier.wait_for(next_sequence) {
                Ok(available_sequence) => {
                    if available_sequence < next_sequence {
                        continue;
                    }
                    self.handler.on_batch_start(available_sequence - next_sequence + 1);

                    let mut failure = None;
                    while next_sequence <= available_sequence {
                        let event = self.data_provider.get(next_sequence);
                        let end_of_batch = next_sequence == available_sequence;
                        if let Err(error) = self.handler.on_event(event, next_sequence, end_of_batch) {
                            failure = Some(error);
                            break;
                        }
                        next_sequence += 1;
                    }

                    match failure {
                        None => self.sequence.set(available_sequence),
                        Some(error) => {
                            let event = self.data_provider.get(next_sequence);
                            self.exception_handler
                                .handle_event_exception(error, next_sequence, Some(event));
                            self.sequence.set(next_sequence);
                            next_sequence += 1;
                        }
                    }
                }
                Err(DisruptorError::Timeout) => self.notify_timeout(self.sequence.get()),
                Err(DisruptorError::Alert) => {
                    if self.running.load(Ordering::Acquire) != RUNNING {
                        break;
                    }
                }
                Err(error) => {
                    error!(%error, sequence = next_sequence, "sequence barrier failed, stopping processor");
                    self.exception_handler.handle_event_exception(error, next_sequence, None);
                    break;
                }
            }
        }
    }

    fn notify_timeout(&mut self, sequence: i64) {
        if let Err(error) = self.handler.on_timeout(sequence) {
            self.exception_handler.handle_event_exception(error, sequence, None);
        }
    }

    fn notify_start(&mut self) {
        if let Err(error) = self.handler.on_start() {
            self.exception_handler.handle_on_start_exception(error);
        }
    }

    fn notify_shutdown(&mut self) {
        if let Err(error) = self.handler.on_shutdown() {
            self.exception_handler.handle_on_shutdown_exception(error);
        }
    }
}

impl<T> EventProcessor for BatchEventProcessor<T>
where
    T: Send + Sync + 'static,
{
    fn get_sequence(&self) -> Arc<Sequence> {
        Arc::clone(&self.sequence)
    }

    fn handle(&self) -> ProcessorHandle {
        ProcessorHandle::new(
            Arc::clone(&self.sequence),
            Arc::clone(&self.barrier),
            Arc::clone(&self.running),
        )
    }

    fn run(&mut self) -> Result<()> {
        match self
            .running
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(RUNNING) => {
                return Err(DisruptorError::Lifecycle("event processor is already running".to_string()));
            }
            Err(_) => {
                // halted before it ever ran
                self.notify_start();
                self.notify_shutdown();
                self.running.store(IDLE, Ordering::Release);
                return Ok(());
            }
        }

        self.barrier.clear_alert();
        self.notify_start();
        debug!(sequence = self.sequence.get(), "batch event processor started");

        if self.running.load(Ordering::Acquire) == RUNNING {
            self.process_events();
        }

        self.notify_shutdown();
        debug!(sequence = self.sequence.get(), "batch event processor stopped");
        self.running.store(IDLE, Ordering::Release);
        Ok(())
    }
}
