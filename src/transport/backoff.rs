//! Reconnection backoff.
//!
//! Delays follow the Fibonacci sequence `0, 1, 1, 2, 3, 5, 8, …` steps,
//! capped at a maximum duration that need not be a whole number of steps.
//! The attempt counter resets once a connection is established again.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Default length of one backoff step.
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Default cap on a single backoff delay.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(120);

// ============================================================================
// Functions
// ============================================================================

/// Returns the Fibonacci step count for the `attempt`-th retry, capped at `max_steps`.
///
/// `attempt` is zero-based: attempt 0 waits 0 steps.
#[must_use]
pub fn delay_for_attempt(attempt: u32, max_steps: u64) -> u64 {
    let (mut current, mut next) = (0u64, 1u64);

    for _ in 0..attempt {
        if current >= max_steps {
            return max_steps;
        }
        (current, next) = (next, current.saturating_add(next));
    }

    current.min(max_steps)
}

// ============================================================================
// Backoff
// ============================================================================

/// Attempt counter turning consecutive failures into delays.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Consecutive failed connections since the last successful one.
    attempt: u32,
    /// Duration of one Fibonacci step.
    unit: Duration,
    /// Cap on a single delay.
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_UNIT, DEFAULT_MAX_BACKOFF)
    }
}

impl Backoff {
    /// Creates a backoff with the given step length and cap.
    #[inline]
    #[must_use]
    pub fn new(unit: Duration, max: Duration) -> Self {
        Self {
            attempt: 0,
            unit,
            max,
        }
    }

    /// Returns the delay for the next retry and advances the counter.
    pub fn next_delay(&mut self) -> Duration {
        let max_steps = self.max_steps();
        let steps = delay_for_attempt(self.attempt, max_steps);
        self.attempt = self.attempt.saturating_add(1);

        self.unit
            .checked_mul(u32::try_from(steps).unwrap_or(u32::MAX))
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// Resets the counter after a successful connection.
    #[inline]
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Returns the number of retries since the last reset.
    #[inline]
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Cap expressed in steps, rounded up so the `Duration` clamp in
    /// [`next_delay`](Self::next_delay) can reach `max` exactly.
    fn max_steps(&self) -> u64 {
        if self.unit.is_zero() {
            return 0;
        }
        let steps = self.max.as_nanos().div_ceil(self.unit.as_nanos());
        u64::try_from(steps).unwrap_or(u64::MAX)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_fibonacci_sequence() {
        let delays: Vec<u64> = (0..12).map(|n| delay_for_attempt(n, 120)).collect();
        assert_eq!(delays, vec![0, 1, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89]);
    }

    #[test]
    fn test_delay_is_capped() {
        assert_eq!(delay_for_attempt(12, 120), 120);
        assert_eq!(delay_for_attempt(50, 120), 120);
        assert_eq!(delay_for_attempt(u32::MAX, 120), 120);
    }

    #[test]
    fn test_backoff_in_seconds() {
        let mut backoff = Backoff::default();
        let delays: Vec<u64> = (0..14).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(
            delays,
            vec![0, 1, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 120, 120]
        );
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::default();
        for _ in 0..5 {
            backoff.next_delay();
        }
        assert_eq!(backoff.attempt(), 5);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::ZERO);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_custom_unit() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(25));
        let delays: Vec<Duration> = (0..6).map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::ZERO,
                Duration::from_millis(10),
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(25),
                Duration::from_millis(25),
            ]
        );
    }

    proptest! {
        #[test]
        fn prop_delay_never_exceeds_cap(attempt in 0u32..10_000, cap in 0u64..1_000) {
            prop_assert!(delay_for_attempt(attempt, cap) <= cap);
        }

        #[test]
        fn prop_delay_is_monotonic(attempt in 0u32..200, cap in 1u64..10_000) {
            prop_assert!(delay_for_attempt(attempt, cap) <= delay_for_attempt(attempt + 1, cap));
        }
    }
}
