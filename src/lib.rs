//! `seqflow` - Sequencer-driven event pipelines
//!
//! An in-process, bounded, pre-allocated ring of event slots shared between
//! producer threads and a dependency graph of consumer threads. Coordination
//! happens entirely through monotonically increasing 64-bit sequences, so
//! the hot path takes no locks and allocates nothing.
//!
//! ## Quick Start
//!
//! ```rust
//! use seqflow::disruptor::{
//!     DefaultEventFactory, Disruptor, EventHandler, ProducerType, Result, YieldingWaitStrategy,
//! };
//! use std::sync::atomic::{AtomicI64, Ordering};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Default)]
//! struct PriceEvent {
//!     price: i64,
//! }
//!
//! struct Summer(Arc<AtomicI64>);
//!
//! impl EventHandler<PriceEvent> for Summer {
//!     fn on_event(&mut self, event: &PriceEvent, _sequence: i64, _end_of_batch: bool) -> Result<()> {
//!         self.0.fetch_add(event.price, Ordering::Relaxed);
//!         Ok(())
//!     }
//! }
//!
//! let total = Arc::new(AtomicI64::new(0));
//! let mut disruptor = Disruptor::new(
//!     DefaultEventFactory::<PriceEvent>::new(),
//!     1024,
//!     ProducerType::Single,
//!     Box::new(YieldingWaitStrategy::new()),
//! )?;
//! disruptor.handle_events_with(Summer(total.clone()))?;
//! disruptor.start()?;
//!
//! for price in 1..=10 {
//!     disruptor.publish_with(|event, _sequence| event.price = price)?;
//! }
//!
//! disruptor.shutdown()?;
//! assert_eq!(total.load(Ordering::Relaxed), 55);
//! # Ok::<(), seqflow::disruptor::DisruptorError>(())
//! ```
//!
//! ## Architecture
//!
//! - **`RingBuffer`**: pre-allocated slots addressed by `sequence & (size - 1)`
//! - **`Sequence`**: cache-padded atomic counter
//! - **`Sequencer`**: hands out slots to one or many producers and tracks gating
//! - **`SequenceBarrier`**: how far a consumer may read given its upstreams
//! - **`WaitStrategy`**: how a caught-up consumer idles
//! - **`BatchEventProcessor`** / **`WorkerPool`**: the consumer loops
//! - **`Disruptor`**: the DSL that wires handlers into a graph and runs it

pub mod disruptor;

// Re-export the main types for convenience
pub use disruptor::{
    // Utility functions
    is_power_of_two,
    BatchEventProcessor,
    BlockingWaitStrategy,
    BusySpinWaitStrategy,
    // Convenience types
    ClosureEventHandler,
    ClosureWorkHandler,
    DefaultEventFactory,

    // Core types
    Disruptor,
    DisruptorConfig,
    // Error types
    DisruptorError,
    EventFactory,
    // Event handling
    EventHandler,
    EventHandlerGroup,
    // Event processing
    EventProcessor,
    EventTranslator,
    EventTranslatorOneArg,
    EventTranslatorThreeArg,
    EventTranslatorTwoArg,
    // Exception handling
    ExceptionHandler,
    HandlerId,

    MultiProducerSequencer,
    PhasedBackoffWaitStrategy,
    Producer,
    ProducerType,

    Result,

    RingBuffer,
    Sequence,

    SequenceBarrier,

    // Sequencing
    Sequencer,
    SingleProducerSequencer,
    SleepingWaitStrategy,
    TimeoutBlockingWaitStrategy,

    // Wait strategies
    WaitStrategy,
    WaitStrategyConfig,
    WorkHandler,
    WorkerPool,
    YieldingWaitStrategy,
    // Constants
    INITIAL_CURSOR_VALUE,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the version of the library
#[must_use]
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
