//! Cycle metrics aggregation
//!
//! Tracks per-cycle stats into a bounded rolling window and exposes an
//! immutable snapshot on demand. Owned by the poller task; snapshots travel
//! out over the control channel so nothing here ever blocks the loop.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

/// Cycles kept in the moving-average window
const WINDOW_SIZE: usize = 10;
/// How often cycles/second is recomputed
const RATE_INTERVAL: Duration = Duration::from_secs(1);

/// Stats recorded for one completed cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleMetrics {
    /// Wall-clock cycle duration in milliseconds
    #[serde(rename = "duration-ms")]
    pub duration_ms: u64,

    /// Batches dispatched to the reader
    #[serde(rename = "batch-count")]
    pub batch_count: usize,

    /// Items submitted across all batches
    #[serde(rename = "item-count")]
    pub item_count: usize,

    /// Items withheld by priority throttling
    #[serde(rename = "skipped-item-count")]
    pub skipped_item_count: usize,
}

/// Immutable aggregate snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Moving average cycle duration over the window, in milliseconds
    #[serde(rename = "avg-cycle-ms")]
    pub avg_cycle_ms: f64,

    /// Cycles per second, recomputed once per real second
    #[serde(rename = "cycles-per-sec")]
    pub cycles_per_sec: f64,

    /// Total completed cycles this session
    #[serde(rename = "total-cycles")]
    pub total_cycles: u64,

    /// Cumulative cycles skipped by the overlap guard
    #[serde(rename = "skipped-cycles")]
    pub skipped_cycles: u64,

    /// Batch count of the most recent cycle
    #[serde(rename = "last-batch-count")]
    pub last_batch_count: usize,

    /// Item count of the most recent cycle
    #[serde(rename = "last-item-count")]
    pub last_item_count: usize,
}

/// Rolling aggregator owned by the poller task
#[derive(Debug)]
pub struct MetricsAggregator {
    window: VecDeque<u64>,
    total_cycles: u64,
    skipped_cycles: u64,
    last_batch_count: usize,
    last_item_count: usize,
    cycles_per_sec: f64,
    rate_counter: u64,
    rate_window_start: Instant,
}

impl MetricsAggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self {
            window: VecDeque::with_capacity(WINDOW_SIZE),
            total_cycles: 0,
            skipped_cycles: 0,
            last_batch_count: 0,
            last_item_count: 0,
            cycles_per_sec: 0.0,
            rate_counter: 0,
            rate_window_start: Instant::now(),
        }
    }

    /// Reset all counters for a new session
    pub fn reset(&mut self) {
        debug!("MetricsAggregator::reset: called");
        self.window.clear();
        self.total_cycles = 0;
        self.skipped_cycles = 0;
        self.last_batch_count = 0;
        self.last_item_count = 0;
        self.cycles_per_sec = 0.0;
        self.rate_counter = 0;
        self.rate_window_start = Instant::now();
    }

    /// Record one completed cycle
    pub fn record_cycle(&mut self, cycle: CycleMetrics) {
        debug!(
            duration_ms = cycle.duration_ms,
            batches = cycle.batch_count,
            items = cycle.item_count,
            "MetricsAggregator::record_cycle: called"
        );
        if self.window.len() == WINDOW_SIZE {
            self.window.pop_front();
        }
        self.window.push_back(cycle.duration_ms);

        self.total_cycles += 1;
        self.last_batch_count = cycle.batch_count;
        self.last_item_count = cycle.item_count;

        // Cycles/second, recomputed once the rate window elapses
        self.rate_counter += 1;
        let elapsed = self.rate_window_start.elapsed();
        if elapsed >= RATE_INTERVAL {
            self.cycles_per_sec = self.rate_counter as f64 / elapsed.as_secs_f64();
            self.rate_counter = 0;
            self.rate_window_start = Instant::now();
        }
    }

    /// Record a cycle skipped by the overlap guard
    pub fn record_skip(&mut self) {
        self.skipped_cycles += 1;
        debug!(skipped = self.skipped_cycles, "MetricsAggregator::record_skip: called");
    }

    /// Immutable snapshot for external observers
    pub fn snapshot(&self) -> MetricsSnapshot {
        let avg_cycle_ms = if self.window.is_empty() {
            0.0
        } else {
            self.window.iter().sum::<u64>() as f64 / self.window.len() as f64
        };

        MetricsSnapshot {
            avg_cycle_ms,
            cycles_per_sec: self.cycles_per_sec,
            total_cycles: self.total_cycles,
            skipped_cycles: self.skipped_cycles,
            last_batch_count: self.last_batch_count,
            last_item_count: self.last_item_count,
        }
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}
