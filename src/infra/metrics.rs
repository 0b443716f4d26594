//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations so gesture handling never blocks on a
//! mutex. Reporting swaps the periodic counters to get a consistent snapshot.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only and must not be used for coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Persistence latency bucket boundaries (milliseconds)
/// Buckets: ≤10, ≤25, ≤50, ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, ≤10000, >10000
const BUCKET_BOUNDS: [u64; 10] = [10, 25, 50, 100, 250, 500, 1000, 2500, 5000, 10000];
const NUM_BUCKETS: usize = 11;

/// Number of histogram buckets (exported for summaries)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [10, 25, 50, 100, 250, 500, 1000, 2500, 5000, 10000, 20000];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Gesture sessions armed (monotonic)
    gestures_started: AtomicU64,
    /// Gestures that dispatched a commit (monotonic)
    gestures_committed: AtomicU64,
    /// Gestures cancelled without mutation (monotonic)
    gestures_cancelled: AtomicU64,
    /// Drops refused because the live conflict flag was set (monotonic)
    gestures_conflict_rejected: AtomicU64,
    /// Pointer samples processed while dragging (reset on report)
    drag_samples_since_report: AtomicU64,
    /// Mutations confirmed by the store (monotonic)
    mutations_committed: AtomicU64,
    /// Mutations rolled back after a store failure or timeout (monotonic)
    mutations_rolled_back: AtomicU64,
    /// Subset of rollbacks caused by the persistence timeout (monotonic)
    mutations_timed_out: AtomicU64,
    /// Mutations refused before being applied (monotonic)
    mutations_rejected: AtomicU64,
    /// Persistence latency histogram (reset on report)
    persist_latency_buckets: [AtomicU64; NUM_BUCKETS],
    persist_latency_sum_ms: AtomicU64,
    persist_latency_max_ms: AtomicU64,
    /// Route plans produced (monotonic)
    route_plans: AtomicU64,
    /// Route plans accepted and charged (monotonic)
    route_charges: AtomicU64,
    /// Route requests refused for missing credits (monotonic)
    route_insufficient_funds: AtomicU64,
    /// Route requests refused for missing coordinates (monotonic)
    route_insufficient_data: AtomicU64,
    /// Notices dropped because the channel was full (monotonic)
    notices_dropped: AtomicU64,
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            gestures_started: AtomicU64::new(0),
            gestures_committed: AtomicU64::new(0),
            gestures_cancelled: AtomicU64::new(0),
            gestures_conflict_rejected: AtomicU64::new(0),
            drag_samples_since_report: AtomicU64::new(0),
            mutations_committed: AtomicU64::new(0),
            mutations_rolled_back: AtomicU64::new(0),
            mutations_timed_out: AtomicU64::new(0),
            mutations_rejected: AtomicU64::new(0),
            persist_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            persist_latency_sum_ms: AtomicU64::new(0),
            persist_latency_max_ms: AtomicU64::new(0),
            route_plans: AtomicU64::new(0),
            route_charges: AtomicU64::new(0),
            route_insufficient_funds: AtomicU64::new(0),
            route_insufficient_data: AtomicU64::new(0),
            notices_dropped: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_gesture_started(&self) {
        self.gestures_started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_gesture_committed(&self) {
        self.gestures_committed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_gesture_cancelled(&self) {
        self.gestures_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_gesture_conflict_rejected(&self) {
        self.gestures_conflict_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_drag_sample(&self) {
        self.drag_samples_since_report.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_mutation_committed(&self) {
        self.mutations_committed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_mutation_rolled_back(&self, timed_out: bool) {
        self.mutations_rolled_back.fetch_add(1, Ordering::Relaxed);
        if timed_out {
            self.mutations_timed_out.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_mutation_rejected(&self) {
        self.mutations_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long one store update took (lock-free)
    #[inline]
    pub fn record_persist_latency(&self, latency_ms: u64) {
        self.persist_latency_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
        self.persist_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        update_atomic_max(&self.persist_latency_max_ms, latency_ms);
    }

    #[inline]
    pub fn record_route_plan(&self) {
        self.route_plans.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_route_charge(&self) {
        self.route_charges.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_route_insufficient_funds(&self) {
        self.route_insufficient_funds.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_route_insufficient_data(&self) {
        self.route_insufficient_data.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_notice_dropped(&self) {
        self.notices_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mutations_committed(&self) -> u64 {
        self.mutations_committed.load(Ordering::Relaxed)
    }

    pub fn mutations_rolled_back(&self) -> u64 {
        self.mutations_rolled_back.load(Ordering::Relaxed)
    }

    pub fn mutations_timed_out(&self) -> u64 {
        self.mutations_timed_out.load(Ordering::Relaxed)
    }

    pub fn gestures_conflict_rejected(&self) -> u64 {
        self.gestures_conflict_rejected.load(Ordering::Relaxed)
    }

    pub fn route_charges(&self) -> u64 {
        self.route_charges.load(Ordering::Relaxed)
    }

    pub fn notices_dropped(&self) -> u64 {
        self.notices_dropped.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    pub fn report(&self) -> MetricsSummary {
        let drag_samples = self.drag_samples_since_report.swap(0, Ordering::Relaxed);
        let persist_buckets = swap_buckets(&self.persist_latency_buckets);
        let persist_sum = self.persist_latency_sum_ms.swap(0, Ordering::Relaxed);
        let persist_max = self.persist_latency_max_ms.swap(0, Ordering::Relaxed);
        let persist_count: u64 = persist_buckets.iter().sum();

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let drag_samples_per_sec = if elapsed.as_secs_f64() > 0.0 {
            drag_samples as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            gestures_started: self.gestures_started.load(Ordering::Relaxed),
            gestures_committed: self.gestures_committed.load(Ordering::Relaxed),
            gestures_cancelled: self.gestures_cancelled.load(Ordering::Relaxed),
            gestures_conflict_rejected: self.gestures_conflict_rejected.load(Ordering::Relaxed),
            drag_samples_per_sec,
            mutations_committed: self.mutations_committed.load(Ordering::Relaxed),
            mutations_rolled_back: self.mutations_rolled_back.load(Ordering::Relaxed),
            mutations_timed_out: self.mutations_timed_out.load(Ordering::Relaxed),
            mutations_rejected: self.mutations_rejected.load(Ordering::Relaxed),
            persist_buckets,
            persist_avg_ms: if persist_count > 0 { persist_sum / persist_count } else { 0 },
            persist_max_ms: persist_max,
            persist_p99_ms: percentile_from_buckets(&persist_buckets, 0.99),
            route_plans: self.route_plans.load(Ordering::Relaxed),
            route_charges: self.route_charges.load(Ordering::Relaxed),
            route_insufficient_funds: self.route_insufficient_funds.load(Ordering::Relaxed),
            route_insufficient_data: self.route_insufficient_data.load(Ordering::Relaxed),
            notices_dropped: self.notices_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub gestures_started: u64,
    pub gestures_committed: u64,
    pub gestures_cancelled: u64,
    pub gestures_conflict_rejected: u64,
    pub drag_samples_per_sec: f64,
    pub mutations_committed: u64,
    pub mutations_rolled_back: u64,
    pub mutations_timed_out: u64,
    pub mutations_rejected: u64,
    /// Persistence latency histogram
    /// Bounds: ≤10, ≤25, ≤50, ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, ≤10000, >10000 ms
    pub persist_buckets: [u64; NUM_BUCKETS],
    pub persist_avg_ms: u64,
    pub persist_max_ms: u64,
    pub persist_p99_ms: u64,
    pub route_plans: u64,
    pub route_charges: u64,
    pub route_insufficient_funds: u64,
    pub route_insufficient_data: u64,
    pub notices_dropped: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            gestures_started = %self.gestures_started,
            gestures_committed = %self.gestures_committed,
            gestures_cancelled = %self.gestures_cancelled,
            gestures_conflict_rejected = %self.gestures_conflict_rejected,
            drag_samples_per_sec = %format!("{:.1}", self.drag_samples_per_sec),
            mutations_committed = %self.mutations_committed,
            mutations_rolled_back = %self.mutations_rolled_back,
            mutations_timed_out = %self.mutations_timed_out,
            mutations_rejected = %self.mutations_rejected,
            persist_avg_ms = %self.persist_avg_ms,
            persist_max_ms = %self.persist_max_ms,
            persist_p99_ms = %self.persist_p99_ms,
            route_plans = %self.route_plans,
            route_charges = %self.route_charges,
            route_insufficient_funds = %self.route_insufficient_funds,
            route_insufficient_data = %self.route_insufficient_data,
            notices_dropped = %self.notices_dropped,
            "metrics"
        );
    }
}
