//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
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
    std::array::from_fn(|i| buckets[i].swap(0, Ordering::Relaxed))
}

#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    std::array::from_fn(|i| buckets[i].load(Ordering::Relaxed))
}

/// Upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Last bucket uses 2x the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// Monotonic counters are never reset. The transition latency histogram is
/// periodic: `report()` swaps it to zero, `snapshot()` only reads it.
pub struct Metrics {
    packages_created: AtomicU64,
    transitions_applied: AtomicU64,
    transitions_rejected: AtomicU64,
    /// Store write latency for accepted transitions (reset on report)
    transition_latency_buckets: [AtomicU64; NUM_BUCKETS],
    transition_latency_sum_us: AtomicU64,
    transition_latency_max_us: AtomicU64,
    events_published: AtomicU64,
    /// Events dropped because the bus channel was full
    events_dropped: AtomicU64,
    /// Handler errors and panics
    handler_failures: AtomicU64,
    notifications_sent: AtomicU64,
    simulations_started: AtomicU64,
    simulations_finished: AtomicU64,
    streams_opened: AtomicU64,
    /// Currently connected stream subscribers (gauge)
    active_streams: AtomicU64,
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            packages_created: AtomicU64::new(0),
            transitions_applied: AtomicU64::new(0),
            transitions_rejected: AtomicU64::new(0),
            transition_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            transition_latency_sum_us: AtomicU64::new(0),
            transition_latency_max_us: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            simulations_started: AtomicU64::new(0),
            simulations_finished: AtomicU64::new(0),
            streams_opened: AtomicU64::new(0),
            active_streams: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_package_created(&self) {
        self.packages_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accepted transition and how long the locked write took
    #[inline]
    pub fn record_transition_applied(&self, latency_us: u64) {
        self.transitions_applied.fetch_add(1, Ordering::Relaxed);
        self.transition_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.transition_latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.transition_latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_transition_rejected(&self) {
        self.transitions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_notification_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_simulation_started(&self) {
        self.simulations_started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_simulation_finished(&self) {
        self.simulations_finished.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn stream_opened(&self) {
        self.streams_opened.fetch_add(1, Ordering::Relaxed);
        self.active_streams.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn stream_closed(&self) {
        // Saturating: a close without a matching open must not wrap
        let _ = self.active_streams.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
            n.checked_sub(1)
        });
    }

    pub fn packages_created(&self) -> u64 {
        self.packages_created.load(Ordering::Relaxed)
    }

    pub fn transitions_applied(&self) -> u64 {
        self.transitions_applied.load(Ordering::Relaxed)
    }

    pub fn transitions_rejected(&self) -> u64 {
        self.transitions_rejected.load(Ordering::Relaxed)
    }

    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    pub fn handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }

    pub fn notifications_sent(&self) -> u64 {
        self.notifications_sent.load(Ordering::Relaxed)
    }

    pub fn active_streams(&self) -> u64 {
        self.active_streams.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self, running_simulations: usize) -> MetricsSummary {
        let latency_buckets = swap_buckets(&self.transition_latency_buckets);
        let latency_sum = self.transition_latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.transition_latency_max_us.swap(0, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };
        let window: u64 = latency_buckets.iter().sum();
        let transitions_per_sec = if elapsed.as_secs_f64() > 0.0 {
            window as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        self.summarize(latency_buckets, latency_sum, latency_max, transitions_per_sec, running_simulations)
    }

    /// Same figures as `report()` without resetting anything
    pub fn snapshot(&self, running_simulations: usize) -> MetricsSummary {
        let latency_buckets = load_buckets(&self.transition_latency_buckets);
        let latency_sum = self.transition_latency_sum_us.load(Ordering::Relaxed);
        let latency_max = self.transition_latency_max_us.load(Ordering::Relaxed);
        self.summarize(latency_buckets, latency_sum, latency_max, 0.0, running_simulations)
    }

    fn summarize(
        &self,
        latency_buckets: [u64; NUM_BUCKETS],
        latency_sum: u64,
        latency_max: u64,
        transitions_per_sec: f64,
        running_simulations: usize,
    ) -> MetricsSummary {
        let window: u64 = latency_buckets.iter().sum();
        let avg = if window > 0 { latency_sum / window } else { 0 };

        MetricsSummary {
            packages_created: self.packages_created.load(Ordering::Relaxed),
            transitions_applied: self.transitions_applied.load(Ordering::Relaxed),
            transitions_rejected: self.transitions_rejected.load(Ordering::Relaxed),
            transitions_per_sec,
            transition_lat_buckets: latency_buckets,
            transition_lat_avg_us: avg,
            transition_lat_max_us: latency_max,
            transition_lat_p50_us: percentile_from_buckets(&latency_buckets, 0.50),
            transition_lat_p99_us: percentile_from_buckets(&latency_buckets, 0.99),
            events_published: self.events_published.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            simulations_started: self.simulations_started.load(Ordering::Relaxed),
            simulations_finished: self.simulations_finished.load(Ordering::Relaxed),
            running_simulations,
            streams_opened: self.streams_opened.load(Ordering::Relaxed),
            active_streams: self.active_streams.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for the Prometheus writer)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug)]
pub struct MetricsSummary {
    pub packages_created: u64,
    pub transitions_applied: u64,
    pub transitions_rejected: u64,
    /// Accepted transitions per second since the previous report
    pub transitions_per_sec: f64,
    /// Transition write latency histogram
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub transition_lat_buckets: [u64; NUM_BUCKETS],
    pub transition_lat_avg_us: u64,
    pub transition_lat_max_us: u64,
    pub transition_lat_p50_us: u64,
    pub transition_lat_p99_us: u64,
    pub events_published: u64,
    pub events_dropped: u64,
    pub handler_failures: u64,
    pub notifications_sent: u64,
    pub simulations_started: u64,
    pub simulations_finished: u64,
    /// Simulator tasks alive at report time
    pub running_simulations: usize,
    pub streams_opened: u64,
    pub active_streams: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            packages_created = %self.packages_created,
            transitions = %self.transitions_applied,
            rejected = %self.transitions_rejected,
            transitions_per_sec = format!("{:.1}", self.transitions_per_sec),
            p99_us = %self.transition_lat_p99_us,
            events_dropped = %self.events_dropped,
            handler_failures = %self.handler_failures,
            notifications = %self.notifications_sent,
            simulations = %self.running_simulations,
            streams = %self.active_streams,
            "metrics"
        );
    }
}
