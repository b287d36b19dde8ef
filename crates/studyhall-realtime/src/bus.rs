//! Broadcast event bus.
//!
//! Fan-out point between the frame dispatcher and the per-subscription
//! routers. Built on `tokio::sync::broadcast`, so every subscriber has an
//! independent bounded buffer: a slow consumer lags and loses its *oldest*
//! undelivered events rather than stalling the dispatcher or its peers.

use crate::event::RawEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Bus carrying decoded events to all subscription routers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RawEvent>,
    published: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a bus with the given per-subscriber buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Never blocks. Events published while no subscriber exists are
    /// dropped.
    pub fn publish(&self, event: RawEvent) {
        self.published.fetch_add(1, Ordering::Relaxed);
        // send only fails when there are no receivers, which is fine.
        let _ = self.tx.send(event);
    }

    /// Attach a new independent reader.
    pub fn subscribe(&self) -> broadcast::Receiver<RawEvent> {
        self.tx.subscribe()
    }

    /// Total events published since creation.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    fn event(channel: &str, n: u64) -> RawEvent {
        RawEvent {
            channels: vec![channel.to_string()],
            payload: serde_json::json!({ "n": n }),
        }
    }

    #[tokio::test]
    async fn test_fan_out_to_independent_readers() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(event("x", 1));

        assert_eq!(a.recv().await.unwrap().payload["n"], 1);
        assert_eq!(b.recv().await.unwrap().payload["n"], 1);
    }

    #[tokio::test]
    async fn test_lagging_reader_drops_oldest() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for n in 0..5 {
            bus.publish(event("x", n));
        }

        // The reader fell behind; it is told how much it missed, then
        // resumes from the oldest retained event.
        match rx.recv().await {
            Err(RecvError::Lagged(missed)) => assert_eq!(missed, 3),
            other => panic!("expected lag, got {other:?}"),
        }
        assert_eq!(rx.recv().await.unwrap().payload["n"], 3);
        assert_eq!(rx.recv().await.unwrap().payload["n"], 4);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_publish_without_readers_is_counted() {
        let bus = EventBus::new(4);
        bus.publish(event("x", 1));
        assert_eq!(bus.published(), 1);
    }
}
