//! Pipeline Configuration
//!
//! Serializable description of a pipeline: ring size, producer type, wait
//! strategy and thread placement. `Disruptor::from_config` turns it into a
//! running engine.

use crate::disruptor::{
    is_power_of_two, BlockingWaitStrategy, BusySpinWaitStrategy, DisruptorError, PhasedBackoffWaitStrategy,
    ProducerType, Result, SleepingWaitStrategy, ThreadContext, TimeoutBlockingWaitStrategy, WaitStrategy,
    YieldingWaitStrategy,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Main pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisruptorConfig {
    /// Ring buffer capacity, a power of two
    pub buffer_size: usize,

    /// Single or multi producer sequencer
    pub producer_type: ProducerType,

    /// How consumers idle
    pub wait_strategy: WaitStrategyConfig,

    /// Processor threads are named `<prefix>-<n>`
    pub thread_name_prefix: String,

    /// Cores processor threads are pinned to, round-robin; empty for none
    pub cpu_affinity: Vec<usize>,
}

impl Default for DisruptorConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            producer_type: ProducerType::Multi,
            wait_strategy: WaitStrategyConfig::Blocking,
            thread_name_prefix: "processor".to_string(),
            cpu_affinity: Vec::new(),
        }
    }
}

impl DisruptorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_producer_type(mut self, producer_type: ProducerType) -> Self {
        self.producer_type = producer_type;
        self
    }

    pub fn with_wait_strategy(mut self, wait_strategy: WaitStrategyConfig) -> Self {
        self.wait_strategy = wait_strategy;
        self
    }

    pub fn with_thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn with_cpu_affinity(mut self, cores: Vec<usize>) -> Self {
        self.cpu_affinity = cores;
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// `InvalidBufferSize` for a size that is not a power of two, `Config`
    /// for anything else out of range
    pub fn validate(&self) -> Result<()> {
        if !is_power_of_two(self.buffer_size) {
            return Err(DisruptorError::InvalidBufferSize(self.buffer_size));
        }

        if self.thread_name_prefix.trim().is_empty() {
            return Err(DisruptorError::Config("thread name prefix must not be empty".to_string()));
        }

        self.wait_strategy.validate()
    }

    /// Thread naming and pinning policy described by this configuration
    ///
    /// # Errors
    /// `Config` if an affinity core does not exist
    pub fn thread_context(&self) -> Result<ThreadContext> {
        let context = ThreadContext::with_name_prefix(self.thread_name_prefix.clone());
        if self.cpu_affinity.is_empty() {
            Ok(context)
        } else {
            context.pin_at_cores(&self.cpu_affinity)
        }
    }
}

/// Wait strategy selection
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WaitStrategyConfig {
    /// Lock and condition variable
    #[default]
    Blocking,

    /// Blocking, reporting a timeout to handlers after `timeout_ms`
    TimeoutBlocking { timeout_ms: u64 },

    /// Spin without yielding
    BusySpin,

    /// Spin `spin_tries` times, then yield
    Yielding { spin_tries: u32 },

    /// Spin, yield, then sleep with backoff capped at `max_sleep_ns`
    Sleeping { retries: u32, max_sleep_ns: u64 },

    /// Spin, then yield, then hand over to `fallback`
    PhasedBackoff {
        spin_timeout_us: u64,
        yield_timeout_us: u64,
        fallback: PhasedFallback,
    },
}

/// Last phase of a phased backoff wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhasedFallback {
    #[default]
    Blocking,
    Sleeping,
}

impl WaitStrategyConfig {
    fn validate(&self) -> Result<()> {
        match self {
            WaitStrategyConfig::TimeoutBlocking { timeout_ms: 0 } => Err(DisruptorError::Config(
                "timeout blocking wait strategy needs a non-zero timeout".to_string(),
            )),
            WaitStrategyConfig::Sleeping { retries: 0, .. } => Err(DisruptorError::Config(
                "sleeping wait strategy needs at least one retry".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Build the described strategy
    pub fn build(&self) -> Arc<dyn WaitStrategy> {
        match *self {
            WaitStrategyConfig::Blocking => Arc::new(BlockingWaitStrategy::new()),
            WaitStrategyConfig::TimeoutBlocking { timeout_ms } => {
                Arc::new(TimeoutBlockingWaitStrategy::new(Duration::from_millis(timeout_ms)))
            }
            WaitStrategyConfig::BusySpin => Arc::new(BusySpinWaitStrategy::new()),
            WaitStrategyConfig::Yielding { spin_tries } => Arc::new(YieldingWaitStrategy::with_spin_tries(spin_tries)),
            WaitStrategyConfig::Sleeping { retries, max_sleep_ns } => Arc::new(SleepingWaitStrategy::with_retries(
                retries,
                Duration::from_nanos(max_sleep_ns),
            )),
            WaitStrategyConfig::PhasedBackoff {
                spin_timeout_us,
                yield_timeout_us,
                fallback,
            } => {
                let spin_timeout = Duration::from_micros(spin_timeout_us);
                let yield_timeout = Duration::from_micros(yield_timeout_us);
                Arc::new(match fallback {
                    PhasedFallback::Blocking => PhasedBackoffWaitStrategy::with_lock(spin_timeout, yield_timeout),
                    PhasedFallback::Sleeping => PhasedBackoffWaitStrategy::with_sleep(spin_timeout, yield_timeout),
                })
            }
        }
    }
}
