//! Configuration for the realtime hub.

use crate::reconnect::BackoffSchedule;
use std::time::Duration;

/// Tunable knobs for the subscription multiplexer.
///
/// The defaults are the production values; tests shrink the windows instead
/// of sleeping for real durations.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// How long registry mutations settle before the session is refreshed.
    /// Rapid subscribe/unsubscribe bursts within this window coalesce into a
    /// single reconnect.
    pub debounce: Duration,

    /// Delay table for reconnect attempts.
    pub backoff: BackoffSchedule,

    /// Reconnect attempts allowed before the scheduler gives up. Once
    /// exceeded, no automatic reconnection happens until the subscription
    /// set changes again.
    pub max_attempts: u32,

    /// Capacity of the broadcast event bus. When a subscriber lags past this
    /// many undelivered events, its oldest events are dropped.
    pub bus_capacity: usize,

    /// Capacity of each subscription's delivery queue.
    pub subscriber_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(250),
            backoff: BackoffSchedule::default(),
            max_attempts: 100,
            bus_capacity: 1024,
            subscriber_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RealtimeConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(250));
        assert_eq!(config.max_attempts, 100);
        assert_eq!(config.bus_capacity, 1024);
        assert_eq!(config.subscriber_capacity, 256);
    }
}
