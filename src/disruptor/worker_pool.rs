//! Worker pool
//!
//! A group of [`WorkProcessor`]s sharing one work sequence. The pool can be
//! driven by the `Disruptor` DSL or used on its own against a [`Producer`].

use crate::disruptor::{
    DisruptorError, EventProcessor, ExceptionHandler, ProcessorHandle, Producer, Result, Sequence,
    SequenceBarrier, Sequencer, ThreadContext, WorkHandler, WorkProcessor,
};
use crate::disruptor::thread_management::ManagedThread;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, warn};

/// Each published event is handled by exactly one of the pool's workers
///
/// ```
/// use seqflow::disruptor::{
///     ClosureWorkHandler, DefaultEventFactory, DefaultExceptionHandler, Producer, ProducerType,
///     WorkHandler, WorkerPool, YieldingWaitStrategy,
/// };
/// use std::sync::Arc;
///
/// let producer: Producer<u64> = Producer::create(
///     ProducerType::Multi,
///     DefaultEventFactory::new(),
///     64,
///     Arc::new(YieldingWaitStrategy::new()),
/// )?;
/// let handlers: Vec<Box<dyn WorkHandler<u64>>> = (0..2)
///     .map(|_| Box::new(ClosureWorkHandler::new(|_: &u64| Ok(()))) as Box<dyn WorkHandler<u64>>)
///     .collect();
/// let mut pool = WorkerPool::new(
///     &producer,
///     producer.new_barrier(&[]),
///     Arc::new(DefaultExceptionHandler::new()),
///     handlers,
/// )?;
/// producer.add_gating_sequences(&pool.worker_sequences());
///
/// pool.start()?;
/// for i in 0..100 {
///     producer.publish_with(|slot, _| *slot = i)?;
/// }
/// pool.drain_and_halt();
/// # Ok::<(), seqflow::disruptor::DisruptorError>(())
/// ```
pub struct WorkerPool<T> {
    sequencer: Arc<dyn Sequencer>,
    work_sequence: Arc<Sequence>,
    processors: Vec<WorkProcessor<T>>,
    handles: Vec<ProcessorHandle>,
    threads: Vec<ManagedThread>,
    started: bool,
}

impl<T> WorkerPool<T>
where
    T: Send + Sync + 'static,
{
    /// Create a pool reading `producer`'s ring behind `barrier`
    ///
    /// Worker and work sequences start at the producer's current cursor.
    ///
    /// # Errors
    /// `Config` if `handlers` is empty
    pub fn new(
        producer: &Producer<T>,
        barrier: Arc<dyn SequenceBarrier>,
        exception_handler: Arc<dyn ExceptionHandler<T>>,
        handlers: Vec<Box<dyn WorkHandler<T>>>,
    ) -> Result<Self> {
        if handlers.is_empty() {
            return Err(DisruptorError::Config("worker pool needs at least one work handler".to_string()));
        }

        let cursor = producer.cursor();
        let work_sequence = Arc::new(Sequence::new(cursor));
        let processors: Vec<WorkProcessor<T>> = handlers
            .into_iter()
            .map(|handler| {
                let processor = WorkProcessor::new(
                    producer.ring_buffer().clone(),
                    Arc::clone(&barrier),
                    handler,
                    Arc::clone(&exception_handler),
                    Arc::clone(&work_sequence),
                );
                processor.get_sequence().set(cursor);
                processor
            })
            .collect();
        let handles = processors.iter().map(EventProcessor::handle).collect();

        Ok(Self {
            sequencer: Arc::clone(producer.sequencer()),
            work_sequence,
            processors,
            handles,
            threads: Vec::new(),
            started: false,
        })
    }

    /// Worker sequences followed by the shared work sequence
    ///
    /// Gate the producer on all of them.
    pub fn worker_sequences(&self) -> Vec<Arc<Sequence>> {
        self.handles
            .iter()
            .map(ProcessorHandle::sequence)
            .chain(std::iter::once(Arc::clone(&self.work_sequence)))
            .collect()
    }

    /// Control handles of every worker
    pub fn handles(&self) -> &[ProcessorHandle] {
        &self.handles
    }

    /// Number of workers
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Replace the exception handler of every worker
    ///
    /// # Errors
    /// `Lifecycle` once the pool has started
    pub fn set_exception_handler(&mut self, exception_handler: Arc<dyn ExceptionHandler<T>>) -> Result<()> {
        if self.started {
            return Err(DisruptorError::Lifecycle(
                "exception handler cannot change after the worker pool started".to_string(),
            ));
        }
        for processor in &mut self.processors {
            processor.set_exception_handler(Arc::clone(&exception_handler));
        }
        Ok(())
    }

    /// Start every worker on threads named `worker-<n>`
    pub fn start(&mut self) -> Result<()> {
        self.start_with(&mut ThreadContext::with_name_prefix("worker"))
    }

    /// Start every worker on threads from `context`
    ///
    /// # Errors
    /// `Lifecycle` if already started, `ThreadSpawn` if a thread fails
    pub fn start_with(&mut self, context: &mut ThreadContext) -> Result<()> {
        if self.started {
            return Err(DisruptorError::Lifecycle("worker pool already started".to_string()));
        }
        self.started = true;

        for mut processor in self.processors.drain(..) {
            let thread = context.spawn(move || {
                if let Err(error) = processor.run() {
                    error!(%error, "work processor exited with error");
                }
            })?;
            self.threads.push(thread);
        }
        debug!(workers = self.threads.len(), "worker pool started");
        Ok(())
    }

    /// Whether any worker is still running
    pub fn is_running(&self) -> bool {
        self.handles.iter().any(ProcessorHandle::is_running)
    }

    /// Whether the workers have not yet consumed everything published
    pub fn has_backlog(&self) -> bool {
        let cursor = self.sequencer.get_cursor();
        cursor > Sequence::get_minimum_sequence(&self.worker_sequences(), cursor)
    }

    /// Wait until every published event is handled, then halt
    pub fn drain_and_halt(&mut self) {
        while self.started && self.has_backlog() {
            thread::yield_now();
        }
        self.halt();
    }

    /// Stop every worker now and join their threads
    pub fn halt(&mut self) {
        for handle in &self.handles {
            handle.halt();
        }
        for thread in self.threads.drain(..) {
            let name = thread.thread_name().to_string();
            if thread.join().is_err() {
                warn!(thread = %name, "worker thread panicked");
            }
        }
    }
}

impl<T> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            for handle in &self.handles {
                handle.halt();
            }
            // remaining threads are joined by ManagedThread's drop
        }
    }
}

impl<T> std::fmt::Debug for WorkerPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.handles.len())
            .field("work_sequence", &self.work_sequence)
            .field("started", &self.started)
            .finish()
    }
}
