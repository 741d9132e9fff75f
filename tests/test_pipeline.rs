use parking_lot::Mutex;
use station_pipeline::{
    bounded, Finalizer, Logger, MapStation, Passthrough, Pipeline, PipelineBuilder,
    PipelineConfig, Receiver, StageConfig, Station, TracingLogger,
};
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Spawns a producer that sends `items` and then closes the queue
fn source<T, I>(items: I) -> (Receiver<T>, thread::JoinHandle<()>)
where
    T: Send + 'static,
    I: IntoIterator<Item = T> + Send + 'static,
{
    let (tx, rx) = bounded(1);
    let handle = thread::spawn(move || {
        for item in items {
            tx.send(item).expect("Send failed");
        }
    });
    (rx, handle)
}

#[derive(Clone, Default)]
struct CaptureLogger {
    lines: Arc<Mutex<Vec<String>>>,
}

impl Logger for CaptureLogger {
    fn log(&self, args: fmt::Arguments<'_>) {
        self.lines.lock().push(args.to_string());
    }
}

/// Items of the end-to-end scenario: plain numbers and per-station tallies
#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Int(i64),
    Tally(i64),
}

struct Squares;

impl Station<Value> for Squares {
    fn process(&mut self, item: Value, emit: &mut dyn FnMut(Value)) {
        if let Value::Int(v) = item {
            emit(Value::Int(v * v));
        }
    }

    fn name(&self) -> &str {
        "squares"
    }
}

struct Evens;

impl Station<Value> for Evens {
    fn process(&mut self, item: Value, emit: &mut dyn FnMut(Value)) {
        if let Value::Int(v) = item {
            if v % 2 == 0 {
                emit(item);
            }
        }
    }
}

struct FirstN {
    limit: usize,
    handled: usize,
}

impl Station<Value> for FirstN {
    fn process(&mut self, item: Value, emit: &mut dyn FnMut(Value)) {
        if self.handled >= self.limit {
            return;
        }
        emit(item);
        self.handled += 1;
    }
}

struct Sum {
    sum: Arc<AtomicI64>,
    finalized: Arc<AtomicI64>,
}

impl Station<Value> for Sum {
    fn process(&mut self, item: Value, emit: &mut dyn FnMut(Value)) {
        if let Value::Int(v) = item {
            self.sum.fetch_add(v, Ordering::SeqCst);
            emit(item);
        }
    }
}

impl Finalizer<Value> for Sum {
    fn finalize(&mut self, emit: &mut dyn FnMut(Value)) {
        emit(Value::Tally(self.finalized.fetch_add(1, Ordering::SeqCst) + 1));
    }
}

struct CatchAll {
    tallies: Arc<Mutex<Vec<i64>>>,
}

impl Station<Value> for CatchAll {
    fn process(&mut self, item: Value, _emit: &mut dyn FnMut(Value)) {
        if let Value::Tally(v) = item {
            self.tallies.lock().push(v);
        }
    }
}

struct LoadTestStation {
    count: Arc<AtomicUsize>,
}

impl Station<u64> for LoadTestStation {
    fn process(&mut self, item: u64, emit: &mut dyn FnMut(u64)) {
        self.count.fetch_add(1, Ordering::Relaxed);
        emit(item);
    }
}

#[test]
fn test_no_stages_all_values_logged() {
    init_tracing();
    let (input, producer) = source(0..10);
    let logger = CaptureLogger::default();

    PipelineBuilder::new().logger(logger.clone()).build(input).run();
    producer.join().unwrap();

    let expected: Vec<String> = (0..10)
        .map(|i| format!("value at end of pipeline: {i}"))
        .collect();
    assert_eq!(*logger.lines.lock(), expected);
}

#[test]
fn test_config_struct_constructs_pipeline() {
    let (input, producer) = source(0..5u8);
    let logger = CaptureLogger::default();
    let config = PipelineConfig::new(
        Arc::new(logger.clone()),
        vec![
            StageConfig::new("first").station(Passthrough),
            StageConfig::new("inert"),
        ],
    );

    let pipeline = Pipeline::new(input, config);
    assert_eq!(pipeline.stage_count(), 1);
    pipeline.run();
    producer.join().unwrap();

    assert_eq!(logger.lines.lock().len(), 5);
}

#[test]
fn test_single_station_finalizes_after_upstream_closes() {
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl Station<i32> for Recorder {
        fn process(&mut self, item: i32, emit: &mut dyn FnMut(i32)) {
            self.events.lock().push(format!("do {item}"));
            emit(item);
            emit(item + 100);
        }
    }

    impl Finalizer<i32> for Recorder {
        fn finalize(&mut self, emit: &mut dyn FnMut(i32)) {
            self.events.lock().push("finalize".to_string());
            emit(-1);
        }
    }

    let events = Arc::new(Mutex::new(Vec::new()));
    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&collected);
    let (input, producer) = source(vec![1, 2, 3]);

    PipelineBuilder::new()
        .add_stage(StageConfig::new("recorder").finalizing_station(Recorder {
            events: Arc::clone(&events),
        }))
        .add_stage(StageConfig::new("collect").station(MapStation::new(
            "collect",
            move |v: i32| {
                sink.lock().push(v);
                v
            },
        )))
        .build(input)
        .run();
    producer.join().unwrap();

    assert_eq!(*collected.lock(), vec![1, 101, 2, 102, 3, 103, -1]);
    assert_eq!(*events.lock(), vec!["do 1", "do 2", "do 3", "finalize"]);
}

#[test]
fn test_fan_out_no_starvation_and_no_loss() {
    struct Slow {
        count: Arc<AtomicUsize>,
        emitted: Arc<AtomicUsize>,
    }

    impl Station<u32> for Slow {
        fn process(&mut self, item: u32, emit: &mut dyn FnMut(u32)) {
            self.count.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1));
            for _ in 0..item % 3 {
                self.emitted.fetch_add(1, Ordering::SeqCst);
                emit(item);
            }
        }
    }

    impl Finalizer<u32> for Slow {
        fn finalize(&mut self, emit: &mut dyn FnMut(u32)) {
            self.emitted.fetch_add(1, Ordering::SeqCst);
            emit(0);
        }
    }

    let emitted = Arc::new(AtomicUsize::new(0));
    let counts: Vec<_> = (0..5).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    let stage = counts.iter().fold(
        StageConfig::new("fan").output_capacity(4),
        |stage, count| {
            stage.finalizing_station(Slow {
                count: Arc::clone(count),
                emitted: Arc::clone(&emitted),
            })
        },
    );
    let logger = CaptureLogger::default();
    let (input, producer) = source(0..100u32);

    let pipeline = PipelineBuilder::new()
        .logger(logger.clone())
        .add_stage(stage)
        .build(input);
    let metrics = pipeline.stage_metrics(0).unwrap().clone();
    pipeline.run();
    producer.join().unwrap();

    for count in &counts {
        assert!(count.load(Ordering::SeqCst) > 0, "a fanned-out station handled 0 items");
    }
    let total: usize = counts.iter().map(|c| c.load(Ordering::SeqCst)).sum();
    assert_eq!(total, 100);
    assert_eq!(logger.lines.lock().len(), emitted.load(Ordering::SeqCst));
    assert_eq!(metrics.total_emitted() as usize, emitted.load(Ordering::SeqCst));
    assert_eq!(metrics.total_finalized(), 5);
}

#[test]
fn test_pipeline_example() {
    init_tracing();
    let sum = Arc::new(AtomicI64::new(0));
    let finalized = Arc::new(AtomicI64::new(0));
    let tallies = Arc::new(Mutex::new(Vec::new()));

    let sums = (0..5).fold(StageConfig::new("sums"), |stage, _| {
        stage.finalizing_station(Sum {
            sum: Arc::clone(&sum),
            finalized: Arc::clone(&finalized),
        })
    });

    let (input, producer) = source((0..50).map(Value::Int));
    PipelineBuilder::new()
        .logger(TracingLogger)
        .add_stage(StageConfig::new("squares").station(Squares))
        .add_stage(StageConfig::new("evens").station(Evens))
        .add_stage(StageConfig::new("ignored"))
        .add_stage(StageConfig::new("first-n").station(FirstN {
            limit: 10,
            handled: 0,
        }))
        .add_stage(sums)
        .add_stage(StageConfig::new("catch-all").station(CatchAll {
            tallies: Arc::clone(&tallies),
        }))
        .build(input)
        .run();
    producer.join().unwrap();

    assert_eq!(sum.load(Ordering::SeqCst), 1140);
    assert_eq!(finalized.load(Ordering::SeqCst), 5);
    let mut tallies = tallies.lock().clone();
    tallies.sort_unstable();
    assert_eq!(tallies, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_drop_policy_accounts_for_every_item() {
    struct Burst;

    impl Station<u32> for Burst {
        fn process(&mut self, item: u32, emit: &mut dyn FnMut(u32)) {
            for i in 0..50 {
                emit(item * 50 + i);
            }
        }
    }

    let diverted = Arc::new(Mutex::new(Vec::new()));
    let received = Arc::new(Mutex::new(Vec::new()));
    let diverted_sink = Arc::clone(&diverted);
    let received_sink = Arc::clone(&received);
    let (input, producer) = source(0..4u32);

    let pipeline = PipelineBuilder::new()
        .add_stage(
            StageConfig::new("burst")
                .station(Burst)
                .output_capacity(4)
                .drop_with_callback(move |item| diverted_sink.lock().push(item)),
        )
        .add_stage(StageConfig::new("slow").station(MapStation::new(
            "slow",
            move |item: u32| {
                thread::sleep(Duration::from_millis(1));
                received_sink.lock().push(item);
                item
            },
        )))
        .build(input);
    let metrics = pipeline.stage_metrics(0).unwrap().clone();
    pipeline.run();
    producer.join().unwrap();

    let diverted = diverted.lock().clone();
    let received = received.lock().clone();
    assert!(!diverted.is_empty(), "slow consumer should force drops");
    assert_eq!(diverted.len() + received.len(), 200);
    assert_eq!(metrics.total_dropped() as usize, diverted.len());
    assert_eq!(metrics.total_emitted() as usize, received.len());

    let mut all: Vec<u32> = diverted.iter().chain(received.iter()).copied().collect();
    all.sort_unstable();
    assert_eq!(all, (0..200).collect::<Vec<_>>());
}

#[test]
fn test_block_policy_loses_nothing() {
    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    let (input, producer) = source(0..500u32);

    let pipeline = PipelineBuilder::new()
        .add_stage(StageConfig::new("fast").station(Passthrough).output_capacity(2))
        .add_stage(StageConfig::new("slow").station(MapStation::new(
            "slow",
            move |item: u32| {
                if item % 50 == 0 {
                    thread::sleep(Duration::from_millis(2));
                }
                counter.fetch_add(1, Ordering::SeqCst);
                item
            },
        )))
        .build(input);
    let metrics = pipeline.stage_metrics(0).unwrap().clone();
    pipeline.run();
    producer.join().unwrap();

    assert_eq!(received.load(Ordering::SeqCst), 500);
    assert_eq!(metrics.total_dropped(), 0);
    assert!(metrics.total_blocks() > 0);
}

fn run_load(stations: usize, items: u64) {
    let counts: Vec<_> = (0..stations).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    let group = counts.iter().fold(StageConfig::new("load"), |stage, count| {
        stage.station(LoadTestStation {
            count: Arc::clone(count),
        })
    });

    let discarded = Arc::new(AtomicUsize::new(0));
    let backdoor = Arc::clone(&discarded);
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let (input, producer) = source(0..items);

    PipelineBuilder::new()
        .add_stage(group.drop_with_callback(move |_| {
            backdoor.fetch_add(1, Ordering::Relaxed);
        }))
        .add_stage(StageConfig::new("passthrough").station(Passthrough).output_capacity(1000))
        .add_stage(StageConfig::new("final").station(MapStation::new(
            "final",
            move |item: u64| {
                counter.fetch_add(1, Ordering::Relaxed);
                item
            },
        )))
        .build(input)
        .run();
    producer.join().unwrap();

    for count in &counts {
        assert!(count.load(Ordering::Relaxed) > 0, "a fanned-out station handled 0 items");
    }
    let handled = discarded.load(Ordering::Relaxed) + delivered.load(Ordering::Relaxed);
    assert_eq!(handled as u64, items);
}

#[test]
fn test_fan_out_load_small() {
    run_load(64, 100_000);
}

#[test]
#[ignore]
fn test_fan_out_load() {
    run_load(1024, 10_000_000);
}
