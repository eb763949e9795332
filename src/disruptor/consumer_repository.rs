//! Consumer repository
//!
//! The handler table behind the DSL. Consumers are stored in insertion
//! order and refer to their upstreams by index, so the graph can only ever
//! point backwards and is acyclic by construction.

use crate::disruptor::{
    BatchEventProcessor, DisruptorError, EventProcessor, ExceptionHandler, ProcessorHandle, Result, Sequence,
    SequenceBarrier, ThreadContext, WorkerPool,
};
use crate::disruptor::thread_management::ManagedThread;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

/// Identifies a handler added to one particular `Disruptor`
///
/// Ids are only valid for the pipeline that issued them; passing one to
/// another pipeline is a topology error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId {
    owner: Uuid,
    index: usize,
}

impl HandlerId {
    /// Position of the handler in its pipeline, in insertion order
    pub fn index(&self) -> usize {
        self.index
    }
}

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handler-{}", self.index)
    }
}

pub(crate) enum Consumer<T> {
    Batch {
        processor: Option<BatchEventProcessor<T>>,
        handle: ProcessorHandle,
    },
    Pool(WorkerPool<T>),
}

pub(crate) struct ConsumerInfo<T> {
    consumer: Consumer<T>,
    barrier: Arc<dyn SequenceBarrier>,
    upstreams: Vec<usize>,
}

impl<T> ConsumerInfo<T>
where
    T: Send + Sync + 'static,
{
    fn sequences(&self) -> Vec<Arc<Sequence>> {
        match &self.consumer {
            Consumer::Batch { handle, .. } => vec![handle.sequence()],
            Consumer::Pool(pool) => pool.worker_sequences(),
        }
    }
}

pub(crate) struct ConsumerRepository<T> {
    owner: Uuid,
    consumers: Vec<ConsumerInfo<T>>,
}

impl<T> ConsumerRepository<T>
where
    T: Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            owner: Uuid::new_v4(),
            consumers: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.consumers.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Map ids to table indexes, rejecting foreign or unknown ids
    pub(crate) fn resolve(&self, ids: &[HandlerId]) -> Result<Vec<usize>> {
        ids.iter()
            .map(|id| {
                if id.owner != self.owner {
                    Err(DisruptorError::Topology(format!("{id} belongs to a different disruptor")))
                } else if id.index >= self.consumers.len() {
                    Err(DisruptorError::Topology(format!("{id} does not exist")))
                } else {
                    Ok(id.index)
                }
            })
            .collect()
    }

    /// Sequences of the given consumers, flattened
    pub(crate) fn sequences_for(&self, indexes: &[usize]) -> Vec<Arc<Sequence>> {
        indexes
            .iter()
            .flat_map(|&index| self.consumers[index].sequences())
            .collect()
    }

    pub(crate) fn add_batch(
        &mut self,
        processor: BatchEventProcessor<T>,
        barrier: Arc<dyn SequenceBarrier>,
        upstreams: Vec<usize>,
    ) -> HandlerId {
        let handle = processor.handle();
        self.insert(
            Consumer::Batch {
                processor: Some(processor),
                handle,
            },
            barrier,
            upstreams,
        )
    }

    pub(crate) fn add_pool(
        &mut self,
        pool: WorkerPool<T>,
        barrier: Arc<dyn SequenceBarrier>,
        upstreams: Vec<usize>,
    ) -> HandlerId {
        self.insert(Consumer::Pool(pool), barrier, upstreams)
    }

    fn insert(&mut self, consumer: Consumer<T>, barrier: Arc<dyn SequenceBarrier>, upstreams: Vec<usize>) -> HandlerId {
        let index = self.consumers.len();
        self.consumers.push(ConsumerInfo {
            consumer,
            barrier,
            upstreams,
        });
        HandlerId {
            owner: self.owner,
            index,
        }
    }

    /// Upstream indexes of a consumer
    pub(crate) fn upstreams(&self, index: usize) -> &[usize] {
        &self.consumers[index].upstreams
    }

    pub(crate) fn barrier(&self, index: usize) -> Arc<dyn SequenceBarrier> {
        Arc::clone(&self.consumers[index].barrier)
    }

    /// Minimum progress of one consumer
    pub(crate) fn sequence_value(&self, index: usize) -> i64 {
        Sequence::get_minimum_sequence(&self.consumers[index].sequences(), i64::MAX)
    }

    /// Whether any consumer is still behind `cursor`
    pub(crate) fn has_backlog(&self, cursor: i64) -> bool {
        self.consumers
            .iter()
            .any(|info| Sequence::get_minimum_sequence(&info.sequences(), cursor) < cursor)
    }

    pub(crate) fn set_exception_handler(
        &mut self,
        index: usize,
        exception_handler: Arc<dyn ExceptionHandler<T>>,
    ) -> Result<()> {
        match &mut self.consumers[index].consumer {
            Consumer::Batch {
                processor: Some(processor),
                ..
            } => {
                processor.set_exception_handler(exception_handler);
                Ok(())
            }
            Consumer::Batch { processor: None, .. } => Err(DisruptorError::Lifecycle(
                "exception handler cannot change after the processor started".to_string(),
            )),
            Consumer::Pool(pool) => pool.set_exception_handler(exception_handler),
        }
    }

    /// Spawn every consumer; batch processor threads are returned
    ///
    /// On failure everything already started is halted and joined.
    pub(crate) fn start_all(&mut self, context: &mut ThreadContext) -> Result<Vec<ManagedThread>> {
        let mut threads = Vec::new();
        if let Err(error) = self.spawn_all(context, &mut threads) {
            self.halt_all();
            drop(threads);
            return Err(error);
        }
        Ok(threads)
    }

    fn spawn_all(&mut self, context: &mut ThreadContext, threads: &mut Vec<ManagedThread>) -> Result<()> {
        for info in &mut self.consumers {
            match &mut info.consumer {
                Consumer::Batch { processor, .. } => {
                    if let Some(mut processor) = processor.take() {
                        threads.push(context.spawn(move || {
                            if let Err(error) = processor.run() {
                                error!(%error, "batch event processor exited with error");
                            }
                        })?);
                    }
                }
                Consumer::Pool(pool) => pool.start_with(context)?,
            }
        }
        Ok(())
    }

    /// Signal every consumer to stop; pools also join their workers
    pub(crate) fn halt_all(&mut self) {
        for info in &self.consumers {
            if let Consumer::Batch { handle, .. } = &info.consumer {
                handle.halt();
            }
        }
        for info in &mut self.consumers {
            if let Consumer::Pool(pool) = &mut info.consumer {
                pool.halt();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruptor::{
        ClosureWorkHandler, DefaultEventFactory, DefaultExceptionHandler, NoOpEventHandler, Producer, ProducerType,
        WorkHandler, YieldingWaitStrategy,
    };

    fn producer() -> Producer<u64> {
        Producer::create(
            ProducerType::Single,
            DefaultEventFactory::new(),
            8,
            Arc::new(YieldingWaitStrategy::new()),
        )
        .unwrap()
    }

    fn add_batch(
        repository: &mut ConsumerRepository<u64>,
        producer: &Producer<u64>,
        upstreams: Vec<usize>,
    ) -> HandlerId {
        let dependencies = repository.sequences_for(&upstreams);
        let barrier: Arc<dyn SequenceBarrier> = producer.new_barrier(&dependencies);
        let processor = BatchEventProcessor::new(
            producer.ring_buffer().clone(),
            Arc::clone(&barrier),
            Box::new(NoOpEventHandler::new()),
        );
        repository.add_batch(processor, barrier, upstreams)
    }

    #[test]
    fn test_upstreams_point_backwards() {
        let producer = producer();
        let mut repository = ConsumerRepository::new();
        let a = add_batch(&mut repository, &producer, vec![]);
        let b = add_batch(&mut repository, &producer, vec![]);
        assert!(repository.upstreams(b.index()).is_empty());

        let c = add_batch(&mut repository, &producer, vec![a.index(), b.index()]);
        assert_eq!(repository.len(), 3);
        assert_eq!(repository.upstreams(c.index()), &[0, 1]);
        assert_eq!(repository.sequences_for(&[a.index(), b.index()]).len(), 2);
        assert_eq!(c.to_string(), "handler-2");
    }

    #[test]
    fn test_resolve_rejects_foreign_and_unknown_ids() {
        let producer = producer();
        let mut first = ConsumerRepository::new();
        let mut second = ConsumerRepository::new();
        let id = add_batch(&mut first, &producer, vec![]);
        add_batch(&mut second, &producer, vec![]);

        assert_eq!(first.resolve(&[id]).unwrap(), vec![0]);
        assert!(matches!(second.resolve(&[id]), Err(DisruptorError::Topology(_))));

        let dangling = HandlerId {
            owner: first.owner,
            index: 5,
        };
        assert!(matches!(first.resolve(&[dangling]), Err(DisruptorError::Topology(_))));
    }

    #[test]
    fn test_pool_contributes_all_worker_sequences() {
        let producer = producer();
        let mut repository = ConsumerRepository::new();
        let handlers: Vec<Box<dyn WorkHandler<u64>>> = vec![
            Box::new(ClosureWorkHandler::new(|_: &u64| Ok(()))),
            Box::new(ClosureWorkHandler::new(|_: &u64| Ok(()))),
        ];
        let barrier: Arc<dyn SequenceBarrier> = producer.new_barrier(&[]);
        let pool = WorkerPool::new(
            &producer,
            Arc::clone(&barrier),
            Arc::new(DefaultExceptionHandler::new()),
            handlers,
        )
        .unwrap();
        let id = repository.add_pool(pool, barrier, vec![]);

        assert_eq!(repository.sequences_for(&[id.index()]).len(), 3);
        assert!(!repository.has_backlog(-1));
        assert!(repository.has_backlog(0));
        assert_eq!(repository.sequence_value(id.index()), -1);
    }
}
