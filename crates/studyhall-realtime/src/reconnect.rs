//! Reconnect backoff schedule and failure-attempt tracking.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Attempt-dependent delay table for reconnection.
///
/// Each tier applies to attempt counts strictly below its bound; attempts at
/// or beyond the last bound use `max_delay`. The default table backs off in
/// steps rather than doubling so that a flapping mobile link settles on a
/// small number of probe rates.
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    /// `(upper_bound, delay)` pairs, ordered by ascending bound.
    tiers: Vec<(u32, Duration)>,
    /// Delay once every tier bound is exceeded.
    max_delay: Duration,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            tiers: vec![
                (5, Duration::from_secs(1)),
                (15, Duration::from_secs(5)),
                (40, Duration::from_secs(10)),
            ],
            max_delay: Duration::from_secs(60),
        }
    }
}

impl BackoffSchedule {
    /// Create a schedule from `(upper_bound, delay)` tiers and a final delay.
    ///
    /// Tiers must be ordered by ascending bound.
    pub fn new(tiers: Vec<(u32, Duration)>, max_delay: Duration) -> Self {
        debug_assert!(tiers.windows(2).all(|w| w[0].0 < w[1].0));
        Self { tiers, max_delay }
    }

    /// Delay to wait before the given reconnect attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        for (bound, delay) in &self.tiers {
            if attempt < *bound {
                return *delay;
            }
        }
        self.max_delay
    }
}

/// Failure memory for the reconnect scheduler.
///
/// The counter increments on every failed or abnormally closed session and
/// resets to zero when a well-formed event arrives (the first event after a
/// reconnect signals recovery) or when the subscription registry issues a
/// fresh refresh. Not persisted across restarts.
#[derive(Debug, Default)]
pub struct ReconnectState {
    attempts: AtomicU32,
}

impl ReconnectState {
    /// Create a state with zero recorded failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure and return the new attempt count.
    pub fn record_failure(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Clear the failure memory.
    pub fn reset(&self) {
        self.attempts.store(0, Ordering::SeqCst);
    }

    /// Current attempt count.
    pub fn current(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_schedule_tiers() {
        let schedule = BackoffSchedule::default();
        let expectations = [
            (0, 1),
            (4, 1),
            (5, 5),
            (14, 5),
            (15, 10),
            (39, 10),
            (40, 60),
            (100, 60),
        ];
        for (attempt, seconds) in expectations {
            assert_eq!(
                schedule.delay_for(attempt),
                Duration::from_secs(seconds),
                "attempt {attempt}"
            );
        }
    }

    #[test]
    fn test_custom_schedule() {
        let schedule = BackoffSchedule::new(
            vec![(2, Duration::from_millis(10))],
            Duration::from_millis(50),
        );
        assert_eq!(schedule.delay_for(1), Duration::from_millis(10));
        assert_eq!(schedule.delay_for(2), Duration::from_millis(50));
    }

    #[test]
    fn test_attempt_counter() {
        let state = ReconnectState::new();
        assert_eq!(state.current(), 0);
        assert_eq!(state.record_failure(), 1);
        assert_eq!(state.record_failure(), 2);
        assert_eq!(state.current(), 2);

        state.reset();
        assert_eq!(state.current(), 0);
    }

    #[test]
    fn test_event_resets_after_repeated_failures() {
        let state = ReconnectState::new();
        for _ in 0..7 {
            state.record_failure();
        }
        assert_eq!(state.current(), 7);
        state.reset();
        assert_eq!(state.current(), 0);
    }

    proptest! {
        #[test]
        fn prop_delay_is_monotonic(a in 0u32..200, b in 0u32..200) {
            let schedule = BackoffSchedule::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(schedule.delay_for(lo) <= schedule.delay_for(hi));
        }
    }
}
