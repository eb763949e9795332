//! Disruptor engine
//!
//! The sequencer-driven event pipeline: a pre-allocated ring buffer, the
//! single/multi producer sequencers that hand out slots, the barriers that
//! tell each consumer how far it may read, and the DSL that wires handlers
//! into a dependency graph.

pub mod config;
pub mod consumer_repository;
pub mod core_interfaces;
pub mod disruptor;
pub mod event_factory;
pub mod event_handler;
pub mod event_processor;
pub mod event_translator;
pub mod exception_handler;
pub mod producer;
pub mod producer_type;
pub mod ring_buffer;
pub mod sequence;
pub mod sequence_barrier;
pub mod sequencer;
pub mod thread_management;
pub mod wait_strategy;
pub mod work_handler;
pub mod work_processor;
pub mod worker_pool;


pub use config::{DisruptorConfig, PhasedFallback, WaitStrategyConfig};
pub use consumer_repository::HandlerId;
pub use core_interfaces::{Cursored, DataProvider, Sequenced};
pub use disruptor::{Disruptor, EventHandlerGroup};
pub use event_factory::{event_factory, ClosureEventFactory, CloneEventFactory, DefaultEventFactory, EventFactory};
pub use event_handler::{ClosureEventHandler, EventHandler, NoOpEventHandler};
pub use event_processor::{BatchEventProcessor, EventProcessor, ProcessorHandle};
pub use event_translator::{
    ClosureEventTranslator, ClosureEventTranslatorOneArg, ClosureEventTranslatorThreeArg,
    ClosureEventTranslatorTwoArg, EventTranslator, EventTranslatorOneArg, EventTranslatorThreeArg,
    EventTranslatorTwoArg,
};
pub use exception_handler::{
    ClosureExceptionHandler, DefaultExceptionHandler, ExceptionHandler, FatalExceptionHandler,
    IgnoreExceptionHandler,
};
pub use producer::Producer;
pub use producer_type::ProducerType;
pub use ring_buffer::RingBuffer;
pub use sequence::Sequence;
pub use sequence_barrier::{ProcessingSequenceBarrier, SequenceBarrier};
pub use sequencer::{MultiProducerSequencer, Sequencer, SingleProducerSequencer};
pub use thread_management::{get_available_cores, ManagedThread, ThreadBuilder, ThreadContext};
pub use wait_strategy::{
    BlockingWaitStrategy, BusySpinWaitStrategy, PhasedBackoffWaitStrategy, SleepingWaitStrategy,
    TimeoutBlockingWaitStrategy, WaitStrategy, YieldingWaitStrategy,
};
pub use work_handler::{ClosureWorkHandler, WorkHandler};
pub use work_processor::WorkProcessor;
pub use worker_pool::WorkerPool;

/// Initial value of every sequence: nothing produced or consumed yet
pub const INITIAL_CURSOR_VALUE: i64 = -1;

/// Errors raised by the engine
///
/// Consumer-thread failures never surface here synchronously; they are
/// routed to the processor's [`ExceptionHandler`].
#[derive(Debug, thiserror::Error)]
pub enum DisruptorError {
    /// Ring buffer size is not a power of two
    #[error("buffer size must be a power of 2, got: {0}")]
    InvalidBufferSize(usize),

    /// Any other construction-time misconfiguration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Operation attempted in the wrong lifecycle state
    #[error("invalid lifecycle state: {0}")]
    Lifecycle(String),

    /// A non-blocking claim would have wrapped past a gating consumer
    #[error("insufficient capacity in ring buffer")]
    InsufficientCapacity,

    /// The sequence barrier was alerted
    #[error("sequence barrier alerted")]
    Alert,

    /// The timeout-capable wait strategy gave up waiting
    #[error("timed out waiting for sequence")]
    Timeout,

    /// Dangling or cyclic dependency in the consumer graph
    #[error("invalid topology: {0}")]
    Topology(String),

    /// A user handler failed while processing an event
    #[error("handler failed: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A processor thread could not be spawned
    #[error("failed to spawn processor thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}

impl DisruptorError {
    /// Wrap an arbitrary user error as a handler failure
    pub fn handler<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Handler(error.into())
    }
}

/// Result type used throughout the engine
pub type Result<T> = std::result::Result<T, DisruptorError>;

/// Check whether `n` is a non-zero power of two
#[inline]
pub fn is_power_of_two(n: usize) -> bool {
    n > 0 && (n & (n - 1)) == 0
}
