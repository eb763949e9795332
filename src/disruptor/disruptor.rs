//! Disruptor DSL
//!
//! Entry point for wiring a pipeline: build the ring, attach handlers as a
//! dependency graph, start one thread per processor, then publish. The
//! producer is gated on exactly the sinks of the graph at all times.

use crate::disruptor::consumer_repository::ConsumerRepository;
use crate::disruptor::ring_buffer::BatchIterMut;
use crate::disruptor::thread_management::ManagedThread;
use crate::disruptor::{
    BatchEventProcessor, BlockingWaitStrategy, DataProvider, DefaultExceptionHandler, DisruptorConfig,
    DisruptorError, EventFactory, EventHandler, EventTranslator, EventTranslatorOneArg, EventTranslatorThreeArg,
    EventTranslatorTwoArg, ExceptionHandler, HandlerId, Producer, ProducerType, Result, RingBuffer, Sequence,
    SequenceBarrier, ThreadContext, WaitStrategy, WorkHandler, WorkerPool,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Configuring,
    Running,
    Terminated,
}

/// The main Disruptor class
///
/// Lifecycle is one-shot: handlers are added while configuring, `start`
/// spawns the processors, and `shutdown` or `halt` terminates the pipeline
/// for good.
///
/// # Type Parameters
/// * `T` - The event type stored in the ring buffer
///
/// # Examples
/// ```
/// use seqflow::disruptor::{
///     BlockingWaitStrategy, ClosureEventHandler, DefaultEventFactory, Disruptor, ProducerType,
/// };
///
/// let mut disruptor = Disruptor::new(
///     DefaultEventFactory::<i64>::new(),
///     1024,
///     ProducerType::Single,
///     Box::new(BlockingWaitStrategy::new()),
/// )?;
/// let journal = disruptor
///     .handle_events_with(ClosureEventHandler::new(|_: &i64, _, _| Ok(())))?
///     .into_ids();
/// disruptor
///     .after(&journal)?
///     .handle_events_with(ClosureEventHandler::new(|_: &i64, _, _| Ok(())))?;
///
/// disruptor.start()?;
/// disruptor.publish_with(|slot, sequence| *slot = sequence * 2)?;
/// disruptor.shutdown()?;
/// # Ok::<(), seqflow::disruptor::DisruptorError>(())
/// ```
pub struct Disruptor<T>
where
    T: Send + Sync + 'static,
{
    producer: Producer<T>,
    consumers: ConsumerRepository<T>,
    exception_handler: Arc<dyn ExceptionHandler<T>>,
    thread_context: ThreadContext,
    threads: Vec<ManagedThread>,
    state: State,
}

impl<T> Disruptor<T>
where
    T: Send + Sync + 'static,
{
    /// Create a new Disruptor
    ///
    /// # Arguments
    /// * `event_factory` - Pre-fills every slot of the ring
    /// * `buffer_size` - Ring capacity, a power of two
    /// * `producer_type` - Single or multi producer sequencer
    /// * `wait_strategy` - How consumers idle
    ///
    /// # Errors
    /// `InvalidBufferSize` if the size is not a power of two
    pub fn new<F>(
        event_factory: F,
        buffer_size: usize,
        producer_type: ProducerType,
        wait_strategy: Box<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        let producer = Producer::create(producer_type, event_factory, buffer_size, Arc::from(wait_strategy))?;
        Ok(Self::with_producer(producer, ThreadContext::new()))
    }

    /// Multi producer with the blocking wait strategy
    pub fn with_defaults<F>(event_factory: F, buffer_size: usize) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        Self::new(
            event_factory,
            buffer_size,
            ProducerType::default(),
            Box::new(BlockingWaitStrategy::new()),
        )
    }

    /// Build from a validated [`DisruptorConfig`]
    ///
    /// # Errors
    /// Whatever `validate` reports, or `Config` for unknown affinity cores
    pub fn from_config<F>(event_factory: F, config: &DisruptorConfig) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        config.validate()?;
        let thread_context = config.thread_context()?;
        let producer = Producer::create(
            config.producer_type,
            event_factory,
            config.buffer_size,
            config.wait_strategy.build(),
        )?;
        Ok(Self::with_producer(producer, thread_context))
    }

    fn with_producer(producer: Producer<T>, thread_context: ThreadContext) -> Self {
        Self {
            producer,
            consumers: ConsumerRepository::new(),
            exception_handler: Arc::new(DefaultExceptionHandler::new()),
            thread_context,
            threads: Vec::new(),
            state: State::Configuring,
        }
    }

    /// Name and pin processor threads through `thread_context`
    pub fn set_thread_context(&mut self, thread_context: ThreadContext) -> Result<()> {
        self.ensure_configuring("change the thread context")?;
        self.thread_context = thread_context;
        Ok(())
    }

    /// Exception handler for handlers added from now on
    pub fn set_default_exception_handler<E>(&mut self, exception_handler: E) -> Result<()>
    where
        E: ExceptionHandler<T> + 'static,
    {
        self.ensure_configuring("change the default exception handler")?;
        self.exception_handler = Arc::new(exception_handler);
        Ok(())
    }

    /// Exception handler for one handler (or every worker of one pool)
    ///
    /// # Errors
    /// `Topology` for an unknown id, `Lifecycle` once started
    pub fn handle_exceptions_for<E>(&mut self, id: HandlerId, exception_handler: E) -> Result<()>
    where
        E: ExceptionHandler<T> + 'static,
    {
        self.ensure_configuring("change an exception handler")?;
        let index = self.single_index(id)?;
        self.consumers.set_exception_handler(index, Arc::new(exception_handler))
    }

    /// Add a handler that reads straight off the producer
    pub fn handle_events_with<H>(&mut self, event_handler: H) -> Result<EventHandlerGroup<'_, T>>
    where
        H: EventHandler<T> + 'static,
    {
        self.handle_events_with_all(vec![Box::new(event_handler)])
    }

    /// Add handlers that read straight off the producer, in parallel
    pub fn handle_events_with_all(
        &mut self,
        event_handlers: Vec<Box<dyn EventHandler<T>>>,
    ) -> Result<EventHandlerGroup<'_, T>> {
        let ids = self.create_event_processors(&[], event_handlers)?;
        Ok(EventHandlerGroup { disruptor: self, ids })
    }

    /// Add a worker pool that reads straight off the producer
    pub fn handle_events_with_worker_pool(
        &mut self,
        work_handlers: Vec<Box<dyn WorkHandler<T>>>,
    ) -> Result<EventHandlerGroup<'_, T>> {
        let ids = self.create_worker_pool(&[], work_handlers)?;
        Ok(EventHandlerGroup { disruptor: self, ids })
    }

    /// Start a group from handlers added earlier
    ///
    /// # Errors
    /// `Topology` if `ids` is empty or names handlers this pipeline never issued
    pub fn after(&mut self, ids: &[HandlerId]) -> Result<EventHandlerGroup<'_, T>> {
        if ids.is_empty() {
            return Err(DisruptorError::Topology("after() needs at least one handler".to_string()));
        }
        self.consumers.resolve(ids)?;
        Ok(EventHandlerGroup {
            disruptor: self,
            ids: ids.to_vec(),
        })
    }

    fn create_event_processors(
        &mut self,
        barrier_ids: &[HandlerId],
        event_handlers: Vec<Box<dyn EventHandler<T>>>,
    ) -> Result<Vec<HandlerId>> {
        self.ensure_configuring("add event handlers")?;
        if event_handlers.is_empty() {
            return Err(DisruptorError::Config("at least one event handler is required".to_string()));
        }
        let upstreams = self.consumers.resolve(barrier_ids)?;
        let dependencies = self.consumers.sequences_for(&upstreams);

        let mut ids = Vec::with_capacity(event_handlers.len());
        for event_handler in event_handlers {
            let barrier: Arc<dyn SequenceBarrier> = self.producer.new_barrier(&dependencies);
            let data_provider: Arc<dyn DataProvider<T>> = self.producer.ring_buffer().clone();
            let mut processor = BatchEventProcessor::new(data_provider, Arc::clone(&barrier), event_handler);
            processor.set_exception_handler(Arc::clone(&self.exception_handler));
            ids.push(self.consumers.add_batch(processor, barrier, upstreams.clone()));
        }

        self.update_gating_sequences(&ids, &dependencies);
        Ok(ids)
    }

    fn create_worker_pool(
        &mut self,
        barrier_ids: &[HandlerId],
        work_handlers: Vec<Box<dyn WorkHandler<T>>>,
    ) -> Result<Vec<HandlerId>> {
        self.ensure_configuring("add a worker pool")?;
        let upstreams = self.consumers.resolve(barrier_ids)?;
        let dependencies = self.consumers.sequences_for(&upstreams);

        let barrier: Arc<dyn SequenceBarrier> = self.producer.new_barrier(&dependencies);
        let pool = WorkerPool::new(
            &self.producer,
            Arc::clone(&barrier),
            Arc::clone(&self.exception_handler),
            work_handlers,
        )?;
        let ids = vec![self.consumers.add_pool(pool, barrier, upstreams)];

        self.update_gating_sequences(&ids, &dependencies);
        Ok(ids)
    }

    /// New consumers become gating sequences; their upstreams stop being sinks
    fn update_gating_sequences(&self, added: &[HandlerId], upstream_sequences: &[Arc<Sequence>]) {
        let indexes: Vec<usize> = added.iter().map(HandlerId::index).collect();
        self.producer
            .add_gating_sequences(&self.consumers.sequences_for(&indexes));
        for sequence in upstream_sequences {
            self.producer.remove_gating_sequence(sequence);
        }
        for id in added {
            debug!(handler = %id, upstreams = ?self.consumers.upstreams(id.index()), "consumer added");
        }
    }

    fn single_index(&self, id: HandlerId) -> Result<usize> {
        Ok(self.consumers.resolve(&[id])?[0])
    }

    fn ensure_configuring(&self, action: &str) -> Result<()> {
        match self.state {
            State::Configuring => Ok(()),
            State::Running => Err(DisruptorError::Lifecycle(format!("cannot {action} after start"))),
            State::Terminated => Err(DisruptorError::Lifecycle(format!("cannot {action} after shutdown"))),
        }
    }

    /// Start one thread per processor
    ///
    /// # Errors
    /// `Lifecycle` if called twice or after shutdown, `ThreadSpawn` if a
    /// thread cannot be created (everything started so far is halted)
    pub fn start(&mut self) -> Result<()> {
        self.ensure_configuring("start")?;
        if self.consumers.is_empty() {
            warn!("starting a disruptor without event handlers, the producer is not gated");
        }

        match self.consumers.start_all(&mut self.thread_context) {
            Ok(threads) => {
                self.threads = threads;
                self.state = State::Running;
                info!(
                    consumers = self.consumers.len(),
                    buffer_size = self.producer.buffer_size(),
                    "disruptor started"
                );
                Ok(())
            }
            Err(error) => {
                self.producer.close();
                self.state = State::Terminated;
                Err(error)
            }
        }
    }

    /// Stop accepting publishes, wait for every consumer to catch up, then halt
    ///
    /// Waits as long as it takes; see [`Disruptor::shutdown_with_timeout`].
    ///
    /// # Errors
    /// `Lifecycle` if the pipeline was never started
    pub fn shutdown(&mut self) -> Result<()> {
        self.drain_and_halt(None)
    }

    /// Like [`Disruptor::shutdown`], giving up after `timeout`
    ///
    /// On `Timeout` the consumers keep running and publishes stay refused;
    /// call [`Disruptor::halt`] to stop them without draining.
    pub fn shutdown_with_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.drain_and_halt(Some(Instant::now() + timeout))
    }

    fn drain_and_halt(&mut self, deadline: Option<Instant>) -> Result<()> {
        match self.state {
            State::Configuring => {
                return Err(DisruptorError::Lifecycle("cannot shut down before start".to_string()));
            }
            State::Terminated => return Ok(()),
            State::Running => {}
        }

        self.producer.close();
        info!(cursor = self.producer.cursor(), "disruptor shutting down");
        // a claim racing close() is either refused or visible in claimed()
        while self.producer.has_claims_in_flight() || self.has_backlog() {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                warn!(
                    cursor = self.producer.cursor(),
                    claimed = self.producer.claimed(),
                    "shutdown timed out with consumers behind"
                );
                return Err(DisruptorError::Timeout);
            }
            thread::yield_now();
        }

        self.halt();
        Ok(())
    }

    /// Stop every processor now, without draining, and join their threads
    pub fn halt(&mut self) {
        if self.state == State::Terminated {
            return;
        }
        self.producer.close();
        self.consumers.halt_all();
        for thread in self.threads.drain(..) {
            let name = thread.thread_name().to_string();
            if thread.join().is_err() {
                warn!(thread = %name, "processor thread panicked");
            }
        }
        self.state = State::Terminated;
        info!(cursor = self.producer.cursor(), "disruptor halted");
    }

    /// Whether `start` succeeded and the pipeline has not terminated
    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }

    /// Whether any consumer is still behind the highest claimed sequence
    ///
    /// A slot that is claimed but not yet published counts as backlog.
    pub fn has_backlog(&self) -> bool {
        self.consumers.has_backlog(self.producer.claimed())
    }

    /// A publishing handle that can be moved to other threads
    pub fn producer(&self) -> Producer<T> {
        self.producer.clone()
    }

    /// The ring buffer events are stored in
    pub fn get_ring_buffer(&self) -> &Arc<RingBuffer<T>> {
        self.producer.ring_buffer()
    }

    /// Current producer cursor
    pub fn get_cursor(&self) -> i64 {
        self.producer.cursor()
    }

    /// Ring capacity
    pub fn get_buffer_size(&self) -> usize {
        self.producer.buffer_size()
    }

    /// Free slots given the slowest sink
    pub fn get_remaining_capacity(&self) -> i64 {
        self.producer.remaining_capacity()
    }

    /// Whether `required_capacity` slots could be claimed right now
    pub fn has_available_capacity(&self, required_capacity: usize) -> bool {
        self.producer.has_available_capacity(required_capacity)
    }

    /// Progress of a handler; the slowest worker for a pool
    pub fn sequence_value_for(&self, id: HandlerId) -> Result<i64> {
        let index = self.single_index(id)?;
        Ok(self.consumers.sequence_value(index))
    }

    /// The barrier a handler waits on
    pub fn barrier_for(&self, id: HandlerId) -> Result<Arc<dyn SequenceBarrier>> {
        let index = self.single_index(id)?;
        Ok(self.consumers.barrier(index))
    }

    /// Claim, fill through `update`, and publish one slot
    pub fn publish_with<F>(&self, update: F) -> Result<i64>
    where
        F: FnOnce(&mut T, i64),
    {
        self.producer.publish_with(update)
    }

    /// Like [`Disruptor::publish_with`] but fails with `InsufficientCapacity`
    /// instead of waiting
    pub fn try_publish_with<F>(&self, update: F) -> Result<i64>
    where
        F: FnOnce(&mut T, i64),
    {
        self.producer.try_publish_with(update)
    }

    /// Publish one event filled by `translator`
    pub fn publish_event<E>(&self, translator: &E) -> Result<i64>
    where
        E: EventTranslator<T> + ?Sized,
    {
        self.producer.publish_event(translator)
    }

    /// Like [`Disruptor::publish_event`] but fails instead of waiting
    pub fn try_publish_event<E>(&self, translator: &E) -> Result<i64>
    where
        E: EventTranslator<T> + ?Sized,
    {
        self.producer.try_publish_event(translator)
    }

    /// Publish one event filled by a one-argument translator
    pub fn publish_event_one_arg<A, E>(&self, translator: &E, arg0: A) -> Result<i64>
    where
        E: EventTranslatorOneArg<T, A> + ?Sized,
    {
        self.producer.publish_event_one_arg(translator, arg0)
    }

    /// Publish one event filled by a two-argument translator
    pub fn publish_event_two_arg<A, B, E>(&self, translator: &E, arg0: A, arg1: B) -> Result<i64>
    where
        E: EventTranslatorTwoArg<T, A, B> + ?Sized,
    {
        self.producer.publish_event_two_arg(translator, arg0, arg1)
    }

    /// Publish one event filled by a three-argument translator
    pub fn publish_event_three_arg<A, B, C, E>(&self, translator: &E, arg0: A, arg1: B, arg2: C) -> Result<i64>
    where
        E: EventTranslatorThreeArg<T, A, B, C> + ?Sized,
    {
        self.producer.publish_event_three_arg(translator, arg0, arg1, arg2)
    }

    /// Claim `n` slots, fill them, and publish them as one range
    pub fn publish_events<F>(&self, n: usize, update: F) -> Result<i64>
    where
        F: for<'a> FnOnce(BatchIterMut<'a, T>),
    {
        self.producer.publish_events(n, update)
    }

    /// Like [`Disruptor::publish_events`] but fails instead of waiting
    pub fn try_publish_events<F>(&self, n: usize, update: F) -> Result<i64>
    where
        F: for<'a> FnOnce(BatchIterMut<'a, T>),
    {
        self.producer.try_publish_events(n, update)
    }
}

impl<T> Drop for Disruptor<T>
where
    T: Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.state == State::Running {
            self.halt();
        }
    }
}

impl<T> std::fmt::Debug for Disruptor<T>
where
    T: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disruptor")
            .field("producer", &self.producer)
            .field("consumers", &self.consumers.len())
            .field("state", &self.state)
            .finish()
    }
}

/// A set of handlers that further handlers can be chained behind
pub struct EventHandlerGroup<'a, T>
where
    T: Send + Sync + 'static,
{
    disruptor: &'a mut Disruptor<T>,
    ids: Vec<HandlerId>,
}

impl<'a, T> EventHandlerGroup<'a, T>
where
    T: Send + Sync + 'static,
{
    /// Add a handler that runs after every handler of this group
    pub fn then<H>(self, event_handler: H) -> Result<EventHandlerGroup<'a, T>>
    where
        H: EventHandler<T> + 'static,
    {
        self.handle_events_with(event_handler)
    }

    /// Add parallel handlers that run after every handler of this group
    pub fn then_all(self, event_handlers: Vec<Box<dyn EventHandler<T>>>) -> Result<EventHandlerGroup<'a, T>> {
        self.handle_events_with_all(event_handlers)
    }

    /// Same as [`EventHandlerGroup::then`]
    pub fn handle_events_with<H>(self, event_handler: H) -> Result<EventHandlerGroup<'a, T>>
    where
        H: EventHandler<T> + 'static,
    {
        self.handle_events_with_all(vec![Box::new(event_handler)])
    }

    /// Same as [`EventHandlerGroup::then_all`]
    pub fn handle_events_with_all(
        self,
        event_handlers: Vec<Box<dyn EventHandler<T>>>,
    ) -> Result<EventHandlerGroup<'a, T>> {
        let ids = self.disruptor.create_event_processors(&self.ids, event_handlers)?;
        Ok(EventHandlerGroup {
            disruptor: self.disruptor,
            ids,
        })
    }

    /// Add a worker pool that runs after every handler of this group
    pub fn handle_events_with_worker_pool(
        self,
        work_handlers: Vec<Box<dyn WorkHandler<T>>>,
    ) -> Result<EventHandlerGroup<'a, T>> {
        let ids = self.disruptor.create_worker_pool(&self.ids, work_handlers)?;
        Ok(EventHandlerGroup {
            disruptor: self.disruptor,
            ids,
        })
    }

    /// Merge previously added handlers into this group
    pub fn and(mut self, others: &[HandlerId]) -> Result<Self> {
        self.disruptor.consumers.resolve(others)?;
        for id in others {
            if !self.ids.contains(id) {
                self.ids.push(*id);
            }
        }
        Ok(self)
    }

    /// Handlers in this group
    pub fn ids(&self) -> &[HandlerId] {
        &self.ids
    }

    /// Release the pipeline borrow, keeping the ids for `after`
    pub fn into_ids(self) -> Vec<HandlerId> {
        self.ids
    }
}
