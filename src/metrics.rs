use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Each worker records one `process` latency out of this many items
pub const LATENCY_SAMPLE_INTERVAL: u64 = 64;

const LATENCY_WINDOW: usize = 1000;

/// Sliding window of latency samples shared by the workers of one stage
#[derive(Debug, Clone)]
pub struct PercentileTracker {
    samples: Arc<Mutex<VecDeque<u64>>>,
    window_size: usize,
}

impl PercentileTracker {
    /// Create a tracker keeping the last `window_size` samples
    pub fn new(window_size: usize) -> Self {
        Self {
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(window_size))),
            window_size: window_size.max(1),
        }
    }

    /// Record a sample in nanoseconds
    pub fn record(&self, nanos: u64) {
        let mut samples = self.samples.lock();
        if samples.len() >= self.window_size {
            samples.pop_front();
        }
        samples.push_back(nanos);
    }

    /// Percentile `p` (0.0-1.0) of the window, in microseconds
    pub fn percentile_us(&self, p: f64) -> f64 {
        let mut sorted: Vec<u64> = self.samples.lock().iter().copied().collect();
        if sorted.is_empty() {
            return 0.0;
        }
        sorted.sort_unstable();

        let idx = ((sorted.len() as f64 * p).ceil() as usize)
            .saturating_sub(1)
            .min(sorted.len() - 1);
        sorted[idx] as f64 / 1000.0
    }

    /// Number of samples currently held
    pub fn count(&self) -> usize {
        self.samples.lock().len()
    }
}

/// Counters for one stage, shared by all of its workers and merge routines.
///
/// Cloning is cheap and every clone observes the same counters, so a handle
/// taken before [`Pipeline::run`](crate::Pipeline::run) can be read while the
/// pipeline is draining or after it returns.
#[derive(Debug, Clone)]
pub struct StageMetrics {
    /// Items handed to a station's `process`
    processed: Arc<AtomicU64>,
    /// Items that landed in the stage output queue
    emitted: Arc<AtomicU64>,
    /// Items diverted to the overflow callback
    dropped: Arc<AtomicU64>,
    /// Emits that found the output full under the `Block` policy
    blocks: Arc<AtomicU64>,
    /// Finalize hooks that ran
    finalized: Arc<AtomicU64>,
    latency: PercentileTracker,
    start_time: Instant,
}

impl StageMetrics {
    pub fn new() -> Self {
        Self {
            processed: Arc::new(AtomicU64::new(0)),
            emitted: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            blocks: Arc::new(AtomicU64::new(0)),
            finalized: Arc::new(AtomicU64::new(0)),
            latency: PercentileTracker::new(LATENCY_WINDOW),
            start_time: Instant::now(),
        }
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emitted(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_block(&self) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_finalized(&self) {
        self.finalized.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a `process` latency in nanoseconds
    pub fn record_latency(&self, nanos: u64) {
        self.latency.record(nanos);
    }

    pub fn total_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn total_emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    pub fn total_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn total_blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    pub fn total_finalized(&self) -> u64 {
        self.finalized.load(Ordering::Relaxed)
    }

    /// Items processed per second since the metrics were created
    pub fn throughput_ips(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            0.0
        } else {
            self.total_processed() as f64 / elapsed
        }
    }

    pub fn latency_tracker(&self) -> &PercentileTracker {
        &self.latency
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_processed: self.total_processed(),
            total_emitted: self.total_emitted(),
            total_dropped: self.total_dropped(),
            total_blocks: self.total_blocks(),
            total_finalized: self.total_finalized(),
            throughput_ips: self.throughput_ips(),
            latency_p50_us: self.latency.percentile_us(0.50),
            latency_p95_us: self.latency.percentile_us(0.95),
            latency_p99_us: self.latency.percentile_us(0.99),
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for StageMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of a stage's metrics
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub total_processed: u64,
    pub total_emitted: u64,
    pub total_dropped: u64,
    pub total_blocks: u64,
    pub total_finalized: u64,
    pub throughput_ips: f64,
    pub latency_p50_us: f64,
    pub latency_p95_us: f64,
    pub latency_p99_us: f64,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Format metrics as a human-readable string
    pub fn format(&self) -> String {
        format!(
            "Processed: {}, Emitted: {}, Dropped: {}, Blocks: {}, Finalized: {}, \
             Throughput: {:.2} items/s, Latency P50: {:.2}µs, P95: {:.2}µs, P99: {:.2}µs, \
             Elapsed: {:.2}s",
            self.total_processed,
            self.total_emitted,
            self.total_dropped,
            self.total_blocks,
            self.total_finalized,
            self.throughput_ips,
            self.latency_p50_us,
            self.latency_p95_us,
            self.latency_p99_us,
            self.elapsed.as_secs_f64()
        )
    }
}
