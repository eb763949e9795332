//! Work processor
//!
//! One member of a worker pool. Members share a work sequence and claim
//! events from it one at a time, so every event reaches exactly one member.

use crate::disruptor::event_processor::{HALTED, IDLE, RUNNING};
use crate::disruptor::{
    DataProvider, DisruptorError, EventProcessor, ExceptionHandler, ProcessorHandle, Result, Sequence,
    SequenceBarrier, WorkHandler,
};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Claims events from a shared work sequence and hands them to one
/// [`WorkHandler`]
///
/// The processor's own sequence trails its current claim by one, so
/// gating on it never lets the producer overwrite a claimed but
/// unprocessed slot.
pub struct WorkProcessor<T> {
    data_provider: Arc<dyn DataProvider<T>>,
    barrier: Arc<dyn SequenceBarrier>,
    handler: Box<dyn WorkHandler<T>>,
    exception_handler: Arc<dyn ExceptionHandler<T>>,
    work_sequence: Arc<Sequence>,
    sequence: Arc<Sequence>,
    running: Arc<AtomicU8>,
}

impl<T> WorkProcessor<T>
where
    T: Send + Sync + 'static,
{
    /// A worker claiming from the shared `work_sequence`
    pub fn new(
        data_provider: Arc<dyn DataProvider<T>>,
        barrier: Arc<dyn SequenceBarrier>,
        handler: Box<dyn WorkHandler<T>>,
        exception_handler: Arc<dyn ExceptionHandler<T>>,
        work_sequence: Arc<Sequence>,
    ) -> Self {
        Self {
            data_provider,
            barrier,
            handler,
            exception_handler,
            work_sequence,
            sequence: Arc::new(Sequence::default()),
            running: Arc::new(AtomicU8::new(IDLE)),
        }
    }

    /// Replace the handler failures are routed to
    pub fn set_exception_handler(&mut self, exception_handler: Arc<dyn ExceptionHandler<T>>) {
        self.exception_handler = exception_handler;
    }

    fn claim_next(&self) -> i64 {
        loop {
            let next_sequence = self.work_sequence.get() + 1;
            self.sequence.set(next_sequence - 1);
            if self.work_sequence.compare_and_set(next_sequence - 1, next_sequence) {
                return next_sequence;
            }
        }
    }

    fn process_events(&mut self) {
        let mut processed = true;
        let mut cached_available = i64::MIN;
        let mut next_sequence = self.sequence.get();

        loop {
            if processed {
                processed = false;
                next_sequence = self.claim_next();
            }

            if cached_available >= next_sequence {
                let event = self.data_provider.get(next_sequence);
                if let Err(error) = self.handler.on_event(event) {
                    self.exception_handler
                        .handle_event_exception(error, next_sequence, Some(event));
                }
                processed = true;
                continue;
            }

            match self.barrier.wait_for(next_sequence) {
                Ok(available) => cached_available = available,
                Err(DisruptorError::Timeout) => {
                    let sequence = self.sequence.get();
                    if let Err(error) = self.handler.on_timeout(sequence) {
                        self.exception_handler.handle_event_exception(error, sequence, None);
                    }
                }
                Err(DisruptorError::Alert) => {
                    if self.running.load(Ordering::Acquire) != RUNNING {
                        break;
                    }
                }
                Err(error) => {
                    error!(%error, sequence = next_sequence, "sequence barrier failed, stopping worker");
                    self.exception_handler.handle_event_exception(error, next_sequence, None);
                    break;
                }
            }
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

impl<T> EventProcessor for WorkProcessor<T>
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
            Err(HALTED) => {
                self.notify_start();
                self.notify_shutdown();
                self.running.store(IDLE, Ordering::Release);
                return Ok(());
            }
            Err(_) => {
                return Err(DisruptorError::Lifecycle("work processor is already running".to_string()));
            }
        }

        // the barrier is shared by the whole pool, so its alert is left alone
        self.notify_start();
        debug!(sequence = self.sequence.get(), "work processor started");

        if self.running.load(Ordering::Acquire) == RUNNING {
            self.process_events();
        }

        self.notify_shutdown();
        debug!(sequence = self.sequence.get(), "work processor stopped");
        self.running.store(IDLE, Ordering::Release);
        Ok(())
    }
}
