//! Backpressure and alert responsiveness
//!
//! A slow consumer must throttle the producer to its pace without the
//! producer ever overwriting an unconsumed slot, and every wait strategy
//! must give up promptly once its barrier is alerted.

use seqflow::disruptor::{
    BlockingWaitStrategy, BusySpinWaitStrategy, DefaultEventFactory, Disruptor, DisruptorError, EventHandler,
    PhasedBackoffWaitStrategy, Producer, ProducerType, Result, Sequence, SequenceBarrier, SleepingWaitStrategy,
    TimeoutBlockingWaitStrategy, WaitStrategy, YieldingWaitStrategy,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const BUFFER_SIZE: usize = 8;
const HANDLER_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
struct Slot {
    value: i64,
}

/// Sleeps per event and releases each slot as soon as it is done
#[derive(Default)]
struct SlowHandler {
    sequence: Option<Arc<Sequence>>,
}

impl EventHandler<Slot> for SlowHandler {
    fn on_event(&mut self, _event: &Slot, sequence: i64, _end_of_batch: bool) -> Result<()> {
        thread::sleep(HANDLER_DELAY);
        if let Some(own) = &self.sequence {
            own.set(sequence);
        }
        Ok(())
    }

    fn set_sequence_callback(&mut self, sequence: Arc<Sequence>) {
        self.sequence = Some(sequence);
    }
}

#[test]
fn slow_consumer_throttles_producer() {
    let mut disruptor = Disruptor::new(
        DefaultEventFactory::<Slot>::new(),
        BUFFER_SIZE,
        ProducerType::Single,
        Box::new(BlockingWaitStrategy::new()),
    )
    .unwrap();
    let id = disruptor.handle_events_with(SlowHandler::default()).unwrap().ids()[0];
    disruptor.start().unwrap();

    let mut throttled = Duration::ZERO;
    let claims = 3 * BUFFER_SIZE as i64;
    for value in 0..claims {
        let started = Instant::now();
        let sequence = disruptor.publish_with(|slot, _| slot.value = value).unwrap();
        let elapsed = started.elapsed();

        // the slot just claimed never laps the consumer
        let consumed = disruptor.sequence_value_for(id).unwrap();
        assert!(
            sequence - consumed <= BUFFER_SIZE as i64,
            "claimed {sequence} while consumer was at {consumed}"
        );

        if value >= 2 * BUFFER_SIZE as i64 {
            throttled += elapsed;
        }
    }

    let average = throttled / BUFFER_SIZE as u32;
    assert!(
        average >= HANDLER_DELAY * 6 / 10,
        "producer was not throttled, average claim took {average:?}"
    );

    disruptor.shutdown().unwrap();
    assert_eq!(disruptor.sequence_value_for(id).unwrap(), claims - 1);
}

#[test]
fn try_publish_fails_instead_of_waiting() {
    let mut disruptor = Disruptor::new(
        DefaultEventFactory::<Slot>::new(),
        BUFFER_SIZE,
        ProducerType::Multi,
        Box::new(BlockingWaitStrategy::new()),
    )
    .unwrap();
    disruptor.handle_events_with(SlowHandler::default()).unwrap();
    disruptor.start().unwrap();

    let mut rejected = false;
    for value in 0..(4 * BUFFER_SIZE as i64) {
        match disruptor.try_publish_with(|slot, _| slot.value = value) {
            Ok(_) => {}
            Err(DisruptorError::InsufficientCapacity) => {
                rejected = true;
                break;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert!(rejected);

    disruptor.shutdown().unwrap();
}

fn strategies() -> Vec<(&'static str, Arc<dyn WaitStrategy>)> {
    let blocking: Arc<dyn WaitStrategy> = Arc::new(BlockingWaitStrategy::new());
    let timeout_blocking: Arc<dyn WaitStrategy> =
        Arc::new(TimeoutBlockingWaitStrategy::new(Duration::from_millis(5)));
    let busy_spin: Arc<dyn WaitStrategy> = Arc::new(BusySpinWaitStrategy::new());
    let yielding: Arc<dyn WaitStrategy> = Arc::new(YieldingWaitStrategy::new());
    let sleeping: Arc<dyn WaitStrategy> = Arc::new(SleepingWaitStrategy::new());
    let phased_backoff: Arc<dyn WaitStrategy> = Arc::new(PhasedBackoffWaitStrategy::with_lock(
        Duration::from_micros(100),
        Duration::from_millis(1),
    ));

    vec![
        ("blocking", blocking),
        ("timeout_blocking", timeout_blocking),
        ("busy_spin", busy_spin),
        ("yielding", yielding),
        ("sleeping", sleeping),
        ("phased_backoff", phased_backoff),
    ]
}

#[test]
fn every_wait_strategy_returns_promptly_on_alert() {
    for (name, strategy) in strategies() {
        let producer = Producer::create(ProducerType::Single, DefaultEventFactory::<Slot>::new(), 16, strategy)
            .unwrap();
        let barrier = producer.new_barrier(&[]);

        let waiter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || loop {
                match barrier.wait_for(0) {
                    Err(DisruptorError::Timeout) => continue,
                    other => break other,
                }
            })
        };

        thread::sleep(Duration::from_millis(50));
        let alerted_at = Instant::now();
        barrier.alert();
        let outcome = waiter.join().unwrap();
        let reaction = alerted_at.elapsed();

        assert!(
            matches!(outcome, Err(DisruptorError::Alert)),
            "{name} returned {outcome:?} instead of an alert"
        );
        assert!(reaction < Duration::from_secs(1), "{name} took {reaction:?} to notice the alert");
    }
}

#[test]
fn waiting_consumer_wakes_on_publish() {
    for (name, strategy) in strategies() {
        let producer = Producer::create(ProducerType::Multi, DefaultEventFactory::<Slot>::new(), 16, strategy)
            .unwrap();
        let barrier = producer.new_barrier(&[]);

        let waiter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || loop {
                match barrier.wait_for(2) {
                    Err(DisruptorError::Timeout) => continue,
                    other => break other,
                }
            })
        };

        thread::sleep(Duration::from_millis(20));
        producer
            .publish_events(3, |batch| {
                for (value, slot) in batch.enumerate() {
                    slot.value = value as i64;
                }
            })
            .unwrap();

        assert_eq!(waiter.join().unwrap().unwrap(), 2, "{name} did not wake on publish");
    }
}
