//! Load estimation from cycle durations
//!
//! Maintains a smoothed 0..1 signal approximating how saturated the read
//! path is. The smoothing weights and update interval are heuristic tuning
//! constants, not invariants.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Weight of the previous estimate in the smoothing step
const SMOOTHING_CARRY: f64 = 0.7;
/// Weight of the newest sample in the smoothing step
const SMOOTHING_SAMPLE: f64 = 0.3;
/// Minimum real time between estimate updates
const UPDATE_INTERVAL: Duration = Duration::from_secs(5);

/// Smoothed load estimate fed by cycle durations
///
/// Updates are rate-limited so a single slow cycle does not whipsaw the
/// batch builder; between updates the estimate is held constant.
#[derive(Debug)]
pub struct LoadEstimator {
    load: f64,
    last_update: Option<Instant>,
}

impl LoadEstimator {
    /// Seed value applied at session start
    pub const SEED: f64 = 0.5;

    /// Create an estimator seeded for a fresh session
    pub fn new() -> Self {
        Self {
            load: Self::SEED,
            last_update: None,
        }
    }

    /// Reset to the seed value (new session)
    pub fn reset(&mut self) {
        debug!("LoadEstimator::reset: called");
        self.load = Self::SEED;
        self.last_update = None;
    }

    /// Current estimate in [0, 1]
    pub fn current(&self) -> f64 {
        self.load
    }

    /// Feed one cycle's wall-clock duration
    ///
    /// No-op unless the rate-limit window has elapsed since the last update.
    pub fn record(&mut self, cycle_duration: Duration, target_interval: Duration) {
        if let Some(last) = self.last_update
            && last.elapsed() < UPDATE_INTERVAL
        {
            return;
        }

        let sample = (cycle_duration.as_secs_f64() / target_interval.as_secs_f64()).min(1.0);
        self.load = self.load * SMOOTHING_CARRY + sample * SMOOTHING_SAMPLE;
        self.last_update = Some(Instant::now());
        debug!(load = self.load, sample, "LoadEstimator::record: updated");
    }

    /// Force the estimate (tests and diagnostics)
    #[cfg(test)]
    pub fn force(&mut self, load: f64) {
        self.load = load.clamp(0.0, 1.0);
    }
}

impl Default for LoadEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_at_half() {
        let estimator = LoadEstimator::new();
        assert_eq!(estimator.current(), 0.5);
    }

    #[tokio::test]
    async fn test_first_sample_updates_immediately() {
        let mut estimator = LoadEstimator::new();
        // A cycle taking exactly the interval pushes the estimate up
        estimator.record(Duration::from_millis(100), Duration::from_millis(100));
        assert!(estimator.current() > 0.5);
        assert!(estimator.current() <= 1.0);
    }

    #[tokio::test]
    async fn test_updates_are_rate_limited() {
        let mut estimator = LoadEstimator::new();
        estimator.record(Duration::from_millis(100), Duration::from_millis(100));
        let after_first = estimator.current();

        // Second sample inside the window is ignored
        estimator.record(Duration::from_millis(1), Duration::from_millis(100));
        assert_eq!(estimator.current(), after_first);
    }

    #[tokio::test]
    async fn test_sample_is_clamped_to_one() {
        let mut estimator = LoadEstimator::new();
        // A cycle ten times slower than the interval still samples at 1.0
        estimator.record(Duration::from_millis(1000), Duration::from_millis(100));
        let expected = 0.5 * 0.7 + 1.0 * 0.3;
        assert!((estimator.current() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_reset_restores_seed() {
        let mut estimator = LoadEstimator::new();
        estimator.record(Duration::from_millis(1000), Duration::from_millis(100));
        estimator.reset();
        assert_eq!(estimator.current(), 0.5);
    }
}
