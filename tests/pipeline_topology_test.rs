//! End-to-end topology tests
//!
//! Each stage records what it saw and checks, at the moment it starts an
//! event, that every upstream stage has already finished that sequence.

use parking_lot::Mutex;
use seqflow::disruptor::{
    BlockingWaitStrategy, DefaultEventFactory, Disruptor, EventHandler, HandlerId, ProducerType, Result,
    WaitStrategy, YieldingWaitStrategy,
};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct OrderEvent {
    value: i64,
}

#[derive(Clone, Default)]
struct StageProbe {
    seen: Arc<Mutex<Vec<i64>>>,
    done: Arc<AtomicI64>,
}

impl StageProbe {
    fn new() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
            done: Arc::new(AtomicI64::new(-1)),
        }
    }

    fn values(&self) -> Vec<i64> {
        self.seen.lock().clone()
    }
}

struct Stage {
    probe: StageProbe,
    upstream: Vec<StageProbe>,
    violations: Arc<AtomicUsize>,
}

impl Stage {
    fn new(probe: &StageProbe, upstream: &[&StageProbe], violations: &Arc<AtomicUsize>) -> Self {
        Self {
            probe: probe.clone(),
            upstream: upstream.iter().map(|p| (*p).clone()).collect(),
            violations: Arc::clone(violations),
        }
    }
}

impl EventHandler<OrderEvent> for Stage {
    fn on_event(&mut self, event: &OrderEvent, sequence: i64, _end_of_batch: bool) -> Result<()> {
        for upstream in &self.upstream {
            if upstream.done.load(Ordering::Acquire) < sequence {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.probe.seen.lock().push(event.value);
        self.probe.done.store(sequence, Ordering::Release);
        Ok(())
    }
}

fn disruptor(buffer_size: usize, wait_strategy: Box<dyn WaitStrategy>) -> Disruptor<OrderEvent> {
    Disruptor::new(
        DefaultEventFactory::new(),
        buffer_size,
        ProducerType::Single,
        wait_strategy,
    )
    .unwrap()
}

fn publish_values(disruptor: &Disruptor<OrderEvent>, count: i64) -> Vec<i64> {
    let values: Vec<i64> = (0..count).map(|i| i * 7 + 3).collect();
    for &value in &values {
        disruptor.publish_with(|event, _| event.value = value).unwrap();
    }
    values
}

#[test]
fn serial_chain_preserves_order_and_dependencies() {
    let violations = Arc::new(AtomicUsize::new(0));
    let (h1, h2, h3) = (StageProbe::new(), StageProbe::new(), StageProbe::new());

    let mut disruptor = disruptor(4, Box::new(BlockingWaitStrategy::new()));
    disruptor
        .handle_events_with(Stage::new(&h1, &[], &violations))
        .unwrap()
        .then(Stage::new(&h2, &[&h1], &violations))
        .unwrap()
        .then(Stage::new(&h3, &[&h2], &violations))
        .unwrap();
    disruptor.start().unwrap();

    let expected = publish_values(&disruptor, 10);
    disruptor.shutdown().unwrap();

    assert_eq!(h1.values(), expected);
    assert_eq!(h2.values(), expected);
    assert_eq!(h3.values(), expected);
    assert_eq!(violations.load(Ordering::SeqCst), 0);
}

#[test]
fn diamond_joins_both_branches() {
    let violations = Arc::new(AtomicUsize::new(0));
    let (h1, h2, h3) = (StageProbe::new(), StageProbe::new(), StageProbe::new());

    let mut disruptor = disruptor(8, Box::new(YieldingWaitStrategy::new()));
    disruptor
        .handle_events_with_all(vec![
            Box::new(Stage::new(&h1, &[], &violations)),
            Box::new(Stage::new(&h2, &[], &violations)),
        ])
        .unwrap()
        .then(Stage::new(&h3, &[&h1, &h2], &violations))
        .unwrap();
    disruptor.start().unwrap();

    let expected = publish_values(&disruptor, 10);
    disruptor.shutdown().unwrap();

    assert_eq!(h1.values(), expected);
    assert_eq!(h2.values(), expected);
    assert_eq!(h3.values(), expected);
    assert_eq!(violations.load(Ordering::SeqCst), 0);
}

#[test]
fn hexagon_waits_for_both_chains() {
    let violations = Arc::new(AtomicUsize::new(0));
    let probes: Vec<StageProbe> = (0..5).map(|_| StageProbe::new()).collect();
    let (h1, h2, h3, h4, h5) = (&probes[0], &probes[1], &probes[2], &probes[3], &probes[4]);

    let mut disruptor = disruptor(16, Box::new(YieldingWaitStrategy::new()));
    let top: Vec<HandlerId> = disruptor
        .handle_events_with(Stage::new(h1, &[], &violations))
        .unwrap()
        .then(Stage::new(h2, &[h1], &violations))
        .unwrap()
        .into_ids();
    let bottom: Vec<HandlerId> = disruptor
        .handle_events_with(Stage::new(h4, &[], &violations))
        .unwrap()
        .then(Stage::new(h5, &[h4], &violations))
        .unwrap()
        .into_ids();
    let sink = disruptor
        .after(&top)
        .unwrap()
        .and(&bottom)
        .unwrap()
        .handle_events_with(Stage::new(h3, &[h2, h5], &violations))
        .unwrap()
        .into_ids();
    disruptor.start().unwrap();

    let expected = publish_values(&disruptor, 100);
    disruptor.shutdown().unwrap();

    for probe in &probes {
        assert_eq!(probe.values(), expected);
    }
    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert_eq!(disruptor.sequence_value_for(sink[0]).unwrap(), 99);
}

#[test]
fn multi_producer_chain_sees_every_event_once() {
    let violations = Arc::new(AtomicUsize::new(0));
    let (h1, h2) = (StageProbe::new(), StageProbe::new());

    let mut disruptor = Disruptor::new(
        DefaultEventFactory::<OrderEvent>::new(),
        64,
        ProducerType::Multi,
        Box::new(YieldingWaitStrategy::new()),
    )
    .unwrap();
    disruptor
        .handle_events_with(Stage::new(&h1, &[], &violations))
        .unwrap()
        .then(Stage::new(&h2, &[&h1], &violations))
        .unwrap();
    disruptor.start().unwrap();

    std::thread::scope(|scope| {
        for producer_id in 0..4i64 {
            let producer = disruptor.producer();
            scope.spawn(move || {
                for i in 0..250 {
                    producer
                        .publish_with(|event, _| event.value = producer_id * 1_000 + i)
                        .unwrap();
                }
            });
        }
    });
    disruptor.shutdown().unwrap();

    let mut seen = h2.values();
    assert_eq!(seen.len(), 1_000);
    assert_eq!(h1.values(), seen);
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 1_000);
    assert_eq!(violations.load(Ordering::SeqCst), 0);
}
