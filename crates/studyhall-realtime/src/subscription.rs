//! Logical subscriptions: handles, payload decoders and delivery streams.

use crate::channel::ChannelSet;
use crate::event::RawEvent;
use futures::Stream;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Opaque handle identifying one logical subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Pluggable payload decoder for typed subscriptions.
///
/// Returning `None` marks the event as not-of-interest for this
/// subscription; it is skipped silently rather than treated as an error, so
/// schema drift on one channel cannot break a consumer.
pub trait PayloadDecoder<T>: Send + 'static {
    /// Decode a payload, or `None` when it does not apply.
    fn decode(&self, payload: &serde_json::Value) -> Option<T>;
}

/// Decoder that deserializes payloads with serde, dropping mismatches.
pub struct JsonPayload<T>(PhantomData<fn() -> T>);

impl<T> Default for JsonPayload<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: DeserializeOwned + Send + 'static> PayloadDecoder<T> for JsonPayload<T> {
    fn decode(&self, payload: &serde_json::Value) -> Option<T> {
        serde_json::from_value(payload.clone()).ok()
    }
}

/// Push-based stream of events delivered to one subscription.
///
/// Consumers only ever see event values; transport failures are retried or
/// reported elsewhere and never terminate the stream.
pub struct EventStream<T = RawEvent> {
    rx: mpsc::Receiver<T>,
}

impl<T> EventStream<T> {
    pub(crate) fn new(rx: mpsc::Receiver<T>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once the subscription is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Result<T, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }
}

impl<T> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

/// Registry entry for one active subscription.
pub(crate) struct SubEntry {
    pub(crate) channels: ChannelSet,
    pub(crate) router: JoinHandle<()>,
}

/// Deliver bus events intersecting `channels` into `tx`, mapped by `map`.
///
/// Runs until the consumer drops its stream or the bus closes. A consumer
/// that falls behind the bus capacity loses its oldest events; the
/// dispatcher and other subscriptions are unaffected.
pub(crate) async fn route_events<T, F>(
    mut bus_rx: broadcast::Receiver<RawEvent>,
    channels: ChannelSet,
    tx: mpsc::Sender<T>,
    map: F,
) where
    T: Send + 'static,
    F: Fn(&RawEvent) -> Option<T> + Send + 'static,
{
    loop {
        match bus_rx.recv().await {
            Ok(event) => {
                if !event.intersects(&channels) {
                    continue;
                }
                let Some(value) = map(&event) else { continue };
                if tx.send(value).await.is_err() {
                    debug!("subscription stream dropped, stopping router");
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "subscription lagging, oldest events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
