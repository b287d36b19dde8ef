//! # Studyhall Realtime
//!
//! Realtime subscription multiplexer for the Studyhall study planner.
//!
//! This crate maintains one WebSocket session to the realtime gateway and
//! multiplexes any number of independent logical subscriptions over it,
//! coalescing rapid subscription changes into a single reconnect and
//! recovering transparently from network loss with bounded backoff.
//!
//! ## Features
//!
//! - **Subscription Hub**: register/remove subscriptions without blocking
//! - **Debounced Refresh**: bursts of registry changes cause one reconnect
//! - **Channel Routing**: each subscription sees only its channels' events
//! - **Bounded Reconnect**: attempt-dependent backoff with a give-up ceiling
//! - **Typed Payloads**: optional serde decoding with lenient skip-on-error
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use studyhall_realtime::{GatewayTransport, RealtimeConfig, RealtimeHub};
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = Arc::new(GatewayTransport::new(
//!         "wss://realtime.studyhall.app",
//!         "proj_1234",
//!     ));
//!     let hub = RealtimeHub::new(transport, RealtimeConfig::default());
//!
//!     let (id, mut events) = hub.subscribe(["plans:42", "decks:42"]);
//!     while let Some(event) = events.recv().await {
//!         println!("{:?} on {:?}", event.payload, event.channels);
//!     }
//!     hub.unsubscribe(id);
//! }
//! ```
//!
//! ## Gateway Protocol
//!
//! Sessions are opened against
//! `<base>/realtime?project=<id>&channels=<c>&channels=<c>...`. Inbound
//! text frames carry a fixed JSON envelope:
//!
//! ```json
//! // A realtime event published on one or more channels
//! {"type": "event", "data": {"channels": ["plans:42"], "payload": {...}}}
//!
//! // A server-reported error (session stays open)
//! {"type": "error", "data": {"code": "quota_exceeded"}}
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                RealtimeHub                    │
//! │  subscriptions map ──▶ debounced refresh     │
//! │                           │                   │
//! │                 ┌─────────▼─────────┐        │
//! │                 │   session task     │        │
//! │                 │ (one live session, │        │
//! │                 │  backoff on loss)  │        │
//! │                 └─────────┬─────────┘        │
//! │                           │ frames            │
//! │                 ┌─────────▼─────────┐        │
//! │                 │   broadcast bus    │        │
//! │                 └──┬──────┬──────┬──┘        │
//! │              router│router│router│            │
//! │                    ▼      ▼      ▼            │
//! │              per-subscription event streams   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Delivery is at-most-once: events that would have arrived while
//! disconnected are not replayed, and a subscriber that lags behind the bus
//! capacity loses its oldest undelivered events rather than stalling the
//! dispatcher.

pub mod bus;
pub mod channel;
pub mod config;
mod dispatch;
pub mod error;
pub mod event;
pub mod fault;
pub mod hub;
pub mod reconnect;
mod session;
pub mod subscription;
pub mod transport;

// Re-export main types
pub use bus::EventBus;
pub use channel::{aggregate, ChannelSet};
pub use config::RealtimeConfig;
pub use error::{RealtimeError, TransportError};
pub use event::{EventBody, GatewayEnvelope, RawEvent};
pub use fault::{FaultSink, TracingFaultSink};
pub use hub::{HubStats, RealtimeHub};
pub use reconnect::{BackoffSchedule, ReconnectState};
pub use subscription::{EventStream, JsonPayload, PayloadDecoder, SubscriptionId};
pub use transport::{
    AlwaysReachable, Frame, GatewayTransport, Reachability, SessionStream, SessionTransport,
    WatchReachability,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api() {
        // Main configuration types are accessible with sane defaults.
        let config = RealtimeConfig::default();
        assert_eq!(config.max_attempts, 100);
        assert_eq!(
            config.backoff.delay_for(0),
            std::time::Duration::from_secs(1)
        );
    }
}
