//! Circuit breaker for repeated cycle failures

use tracing::{debug, warn};

/// Counts consecutive cycle failures and trips past a threshold
///
/// Tripping is terminal for the session - the caller must start a new
/// session to resume; there is no auto-recovery.
#[derive(Debug)]
pub struct CircuitBreaker {
    consecutive_failures: u32,
    threshold: u32,
}

impl CircuitBreaker {
    /// Create a breaker with the given trip threshold
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive_failures: 0,
            threshold,
        }
    }

    /// Record a successful cycle, resetting the streak
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Record a failed cycle; returns true when the breaker trips
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;
        debug!(
            consecutive = self.consecutive_failures,
            threshold = self.threshold,
            "CircuitBreaker::record_failure: called"
        );
        if self.is_tripped() {
            warn!(failures = self.consecutive_failures, "Circuit breaker tripped");
            true
        } else {
            false
        }
    }

    /// True once the failure streak has reached the threshold
    pub fn is_tripped(&self) -> bool {
        self.consecutive_failures >= self.threshold
    }

    /// Current failure streak
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Reset for a new session
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trips_at_threshold() {
        let mut breaker = CircuitBreaker::new(5);

        for _ in 0..4 {
            assert!(!breaker.record_failure());
        }
        assert!(!breaker.is_tripped());

        assert!(breaker.record_failure());
        assert!(breaker.is_tripped());
        assert_eq!(breaker.consecutive_failures(), 5);
    }

    #[test]
    fn test_success_resets_streak() {
        let mut breaker = CircuitBreaker::new(3);

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();

        assert_eq!(breaker.consecutive_failures(), 0);
        assert!(!breaker.is_tripped());
    }

    #[test]
    fn test_reset() {
        let mut breaker = CircuitBreaker::new(2);
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.is_tripped());

        breaker.reset();
        assert!(!breaker.is_tripped());
    }
}
