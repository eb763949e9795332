//! Pipeline Processing Benchmarks
//!
//! Dependent handler graphs: a three stage chain, a diamond, and a worker
//! pool feeding a single journaling stage.

use criterion::measurement::WallTime;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkGroup, BenchmarkId, Criterion, Throughput};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use seqflow::disruptor::{
    ClosureWorkHandler, DefaultEventFactory, Disruptor, EventHandler, ProducerType, Result as DisruptorResult,
    WorkHandler, YieldingWaitStrategy,
};

const BUFFER_SIZE: usize = 2048;
const BURST_SIZES: [u64; 3] = [50, 200, 1000];

#[derive(Debug, Default, Clone)]
struct PipelineEvent {
    id: i64,
}

/// Does a little arithmetic on every event and counts it
struct StageHandler {
    multiplier: i64,
    processed: Arc<AtomicI64>,
}

impl StageHandler {
    fn new(multiplier: i64, processed: &Arc<AtomicI64>) -> Self {
        Self {
            multiplier,
            processed: Arc::clone(processed),
        }
    }
}

impl EventHandler<PipelineEvent> for StageHandler {
    fn on_event(&mut self, event: &PipelineEvent, _sequence: i64, _end_of_batch: bool) -> DisruptorResult<()> {
        black_box(event.id * self.multiplier + 1);
        self.processed.fetch_add(1, Ordering::Release);
        Ok(())
    }
}

fn new_disruptor() -> Disruptor<PipelineEvent> {
    Disruptor::new(
        DefaultEventFactory::<PipelineEvent>::new(),
        BUFFER_SIZE,
        ProducerType::Single,
        Box::new(YieldingWaitStrategy::new()),
    )
    .unwrap()
}

/// Publish bursts and wait until the final stage has counted them
fn run_bursts(
    group: &mut BenchmarkGroup<WallTime>,
    name: &str,
    disruptor: &mut Disruptor<PipelineEvent>,
    sink: &Arc<AtomicI64>,
    burst_size: u64,
) {
    disruptor.start().unwrap();

    group.throughput(Throughput::Elements(burst_size));
    group.bench_function(BenchmarkId::new(name, burst_size), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                sink.store(0, Ordering::Release);
                for id in 0..burst_size as i64 {
                    disruptor.publish_with(|event, _| event.id = id).unwrap();
                }
                while sink.load(Ordering::Acquire) < burst_size as i64 {
                    std::hint::spin_loop();
                }
            }
            start.elapsed()
        })
    });

    disruptor.shutdown().unwrap();
}

fn benchmark_chain(group: &mut BenchmarkGroup<WallTime>, burst_size: u64) {
    let counters: Vec<Arc<AtomicI64>> = (0..3).map(|_| Arc::new(AtomicI64::new(0))).collect();
    let mut disruptor = new_disruptor();
    disruptor
        .handle_events_with(StageHandler::new(2, &counters[0]))
        .unwrap()
        .then(StageHandler::new(3, &counters[1]))
        .unwrap()
        .then(StageHandler::new(5, &counters[2]))
        .unwrap();
    run_bursts(group, "Chain3", &mut disruptor, &counters[2], burst_size);
}

fn benchmark_diamond(group: &mut BenchmarkGroup<WallTime>, burst_size: u64) {
    let counters: Vec<Arc<AtomicI64>> = (0..3).map(|_| Arc::new(AtomicI64::new(0))).collect();
    let mut disruptor = new_disruptor();
    disruptor
        .handle_events_with_all(vec![
            Box::new(StageHandler::new(2, &counters[0])),
            Box::new(StageHandler::new(3, &counters[1])),
        ])
        .unwrap()
        .then(StageHandler::new(5, &counters[2]))
        .unwrap();
    run_bursts(group, "Diamond", &mut disruptor, &counters[2], burst_size);
}

fn benchmark_pool_then_journal(group: &mut BenchmarkGroup<WallTime>, burst_size: u64) {
    let journaled = Arc::new(AtomicI64::new(0));
    let workers: Vec<Box<dyn WorkHandler<PipelineEvent>>> = (0..3)
        .map(|_| {
            Box::new(ClosureWorkHandler::new(|event: &PipelineEvent| {
                black_box(event.id * 7);
                Ok(())
            })) as Box<dyn WorkHandler<PipelineEvent>>
        })
        .collect();
    let mut disruptor = new_disruptor();
    disruptor
        .handle_events_with_worker_pool(workers)
        .unwrap()
        .then(StageHandler::new(11, &journaled))
        .unwrap();
    run_bursts(group, "PoolThenJournal", &mut disruptor, &journaled, burst_size);
}

/// Main pipeline benchmark function
pub fn pipeline_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Pipeline");
    group.measurement_time(Duration::from_secs(20));
    group.warm_up_time(Duration::from_secs(5));

    for &burst_size in &BURST_SIZES {
        benchmark_chain(&mut group, burst_size);
        benchmark_diamond(&mut group, burst_size);
        benchmark_pool_then_journal(&mut group, burst_size);
    }

    group.finish();
}

criterion_group!(pipeline, pipeline_benchmark);
criterion_main!(pipeline);
