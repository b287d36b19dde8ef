//! Realtime hub: the public subscription registry.
//!
//! The hub tracks every logical subscription, debounces registry mutations
//! into a single session refresh, and hands out per-subscription event
//! streams. All public calls return immediately; session work happens on
//! background tasks.

use crate::bus::EventBus;
use crate::channel::{self, ChannelSet};
use crate::config::RealtimeConfig;
use crate::event::RawEvent;
use crate::fault::{FaultSink, TracingFaultSink};
use crate::reconnect::ReconnectState;
use crate::session::{self, SessionHandle, SessionParts};
use crate::subscription::{
    route_events, EventStream, JsonPayload, PayloadDecoder, SubEntry, SubscriptionId,
};
use crate::transport::{AlwaysReachable, Reachability, SessionTransport};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Client-side multiplexer for the Studyhall realtime gateway.
///
/// One hub maintains at most one gateway session and fans its events out to
/// any number of logical subscriptions. Rapid subscribe/unsubscribe bursts
/// coalesce into a single reconnect; network loss is recovered with bounded
/// backoff. Cloning the hub shares the underlying state.
///
/// Must be created within a Tokio runtime.
#[derive(Clone)]
pub struct RealtimeHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    config: RealtimeConfig,
    subscriptions: RwLock<HashMap<SubscriptionId, SubEntry>>,
    /// Channel set most recently handed to the session task.
    last_requested: Mutex<ChannelSet>,
    /// Generation of the newest scheduled refresh; older timers bail out.
    refresh_gen: AtomicU64,
    session: SessionHandle,
    bus: EventBus,
    attempts: Arc<ReconnectState>,
    sessions_opened: Arc<AtomicU64>,
    closed: AtomicBool,
}

impl Drop for HubInner {
    fn drop(&mut self) {
        self.session.shutdown_nowait();
    }
}

/// Hub statistics.
#[derive(Debug, Clone, Default)]
pub struct HubStats {
    /// Currently registered subscriptions.
    pub active_subscriptions: usize,
    /// Sessions established since creation.
    pub sessions_opened: u64,
    /// Events published to the bus since creation.
    pub events_published: u64,
    /// Consecutive failed reconnect attempts.
    pub reconnect_attempts: u32,
    /// Whether a session is currently live.
    pub connected: bool,
}

impl RealtimeHub {
    /// Create a hub with the default reachability oracle and fault sink.
    pub fn new(transport: Arc<dyn SessionTransport>, config: RealtimeConfig) -> Self {
        Self::new_with(
            transport,
            Arc::new(AlwaysReachable),
            Arc::new(TracingFaultSink),
            config,
        )
    }

    /// Create a hub with explicit collaborators.
    pub fn new_with(
        transport: Arc<dyn SessionTransport>,
        reachability: Arc<dyn Reachability>,
        faults: Arc<dyn FaultSink>,
        config: RealtimeConfig,
    ) -> Self {
        let bus = EventBus::new(config.bus_capacity);
        let attempts = Arc::new(ReconnectState::new());
        let sessions_opened = Arc::new(AtomicU64::new(0));
        let session = session::spawn(SessionParts {
            transport,
            reachability,
            faults,
            config: config.clone(),
            bus: bus.clone(),
            attempts: attempts.clone(),
            sessions_opened: sessions_opened.clone(),
        });

        Self {
            inner: Arc::new(HubInner {
                config,
                subscriptions: RwLock::new(HashMap::new()),
                last_requested: Mutex::new(ChannelSet::new()),
                refresh_gen: AtomicU64::new(0),
                session,
                bus,
                attempts,
                sessions_opened,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribe to raw events on the given channels.
    ///
    /// Returns the subscription handle and its event stream. The
    /// subscription is inert until `channels` is non-empty. Never blocks;
    /// the session is refreshed after the debounce window settles.
    pub fn subscribe<I, S>(&self, channels: I) -> (SubscriptionId, EventStream<RawEvent>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.register(channels.into_iter().collect(), |event: &RawEvent| {
            Some(event.clone())
        })
    }

    /// Subscribe with a serde-decoded payload type.
    ///
    /// Payloads that fail to decode are skipped for this subscription only.
    pub fn subscribe_typed<T, I, S>(&self, channels: I) -> (SubscriptionId, EventStream<T>)
    where
        T: DeserializeOwned + Send + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscribe_with(channels, JsonPayload::<T>::default())
    }

    /// Subscribe with a custom payload decoder.
    pub fn subscribe_with<T, I, S, D>(
        &self,
        channels: I,
        decoder: D,
    ) -> (SubscriptionId, EventStream<T>)
    where
        T: Send + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
        D: PayloadDecoder<T>,
    {
        self.register(channels.into_iter().collect(), move |event: &RawEvent| {
            decoder.decode(&event.payload)
        })
    }

    fn register<T, F>(&self, channels: ChannelSet, map: F) -> (SubscriptionId, EventStream<T>)
    where
        T: Send + 'static,
        F: Fn(&RawEvent) -> Option<T> + Send + 'static,
    {
        let id = SubscriptionId::new();
        let (tx, rx) = mpsc::channel(self.inner.config.subscriber_capacity);
        let router = tokio::spawn(route_events(
            self.inner.bus.subscribe(),
            channels.clone(),
            tx,
            map,
        ));

        self.inner
            .subscriptions
            .write()
            .insert(id, SubEntry { channels, router });
        debug!(subscription = %id, "subscription registered");

        self.schedule_refresh();
        (id, EventStream::new(rx))
    }

    /// Remove a subscription. Idempotent on unknown handles.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        match self.inner.subscriptions.write().remove(&id) {
            Some(entry) => {
                entry.router.abort();
                debug!(subscription = %id, "subscription removed");
                self.schedule_refresh();
            }
            None => debug!(subscription = %id, "unsubscribe for unknown handle ignored"),
        }
    }

    /// Force a debounced re-evaluation of the session without changing the
    /// registry. Used when channel membership changes indirectly.
    pub fn refresh_session(&self) {
        self.schedule_refresh();
    }

    /// Whether a gateway session is currently live.
    pub fn is_connected(&self) -> bool {
        self.inner.session.is_connected()
    }

    /// Snapshot of hub statistics.
    pub fn stats(&self) -> HubStats {
        HubStats {
            active_subscriptions: self.inner.subscriptions.read().len(),
            sessions_opened: self.inner.sessions_opened.load(Ordering::Relaxed),
            events_published: self.inner.bus.published(),
            reconnect_attempts: self.inner.attempts.current(),
            connected: self.is_connected(),
        }
    }

    /// Tear down the session and every subscription.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let entries: Vec<SubEntry> = {
            let mut subs = self.inner.subscriptions.write();
            subs.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            entry.router.abort();
        }
        self.inner.session.shutdown().await;
    }

    /// Schedule a debounced session refresh.
    ///
    /// Every call supersedes the previous pending one: the timer that fires
    /// checks it is still the newest generation before acting, so a burst of
    /// registry mutations produces one refresh carrying the settled set.
    fn schedule_refresh(&self) {
        if self.inner.closed.load(Ordering::SeqCst) {
            return;
        }
        let generation = self.inner.refresh_gen.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = self.inner.clone();

        tokio::spawn(async move {
            tokio::time::sleep(inner.config.debounce).await;
            if inner.refresh_gen.load(Ordering::SeqCst) != generation {
                // Superseded by a newer mutation.
                return;
            }
            if inner.closed.load(Ordering::SeqCst) {
                return;
            }

            let aggregate = {
                let subs = inner.subscriptions.read();
                channel::aggregate(subs.values().map(|entry| &entry.channels))
            };
            let refresh = {
                let mut last = inner.last_requested.lock();
                let changed = *last != aggregate;
                if changed {
                    *last = aggregate.clone();
                }
                changed || (!inner.session.is_connected() && !aggregate.is_empty())
            };

            if refresh {
                debug!(channels = aggregate.len(), "refreshing session with settled channel set");
                if !inner.session.refresh(aggregate).await {
                    warn!("session task gone, refresh dropped");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::reconnect::BackoffSchedule;
    use crate::transport::SessionStream;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Transport that always fails with a retriable error.
    struct OfflineGateway;

    #[async_trait]
    impl SessionTransport for OfflineGateway {
        async fn open(
            &self,
            _channels: &ChannelSet,
        ) -> Result<Box<dyn SessionStream>, TransportError> {
            Err(TransportError::Io("offline".to_string()))
        }
    }

    fn test_config() -> RealtimeConfig {
        RealtimeConfig {
            debounce: Duration::from_millis(10),
            backoff: BackoffSchedule::new(vec![], Duration::from_millis(20)),
            max_attempts: 2,
            ..RealtimeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_subscribe_and_unsubscribe_update_registry() {
        let hub = RealtimeHub::new(Arc::new(OfflineGateway), test_config());

        let (id, _events) = hub.subscribe(["plans:1"]);
        assert_eq!(hub.stats().active_subscriptions, 1);

        hub.unsubscribe(id);
        assert_eq!(hub.stats().active_subscriptions, 0);

        hub.close().await;
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_handle_is_idempotent() {
        let hub = RealtimeHub::new(Arc::new(OfflineGateway), test_config());
        let (id, _events) = hub.subscribe(["plans:1"]);

        hub.unsubscribe(id);
        hub.unsubscribe(id);
        assert_eq!(hub.stats().active_subscriptions, 0);

        hub.close().await;
    }

    #[tokio::test]
    async fn test_starts_disconnected_with_empty_stats() {
        let hub = RealtimeHub::new(Arc::new(OfflineGateway), test_config());
        let stats = hub.stats();

        assert!(!stats.connected);
        assert_eq!(stats.sessions_opened, 0);
        assert_eq!(stats.events_published, 0);

        hub.close().await;
    }

    #[tokio::test]
    async fn test_close_is_safe_to_call_twice() {
        let hub = RealtimeHub::new(Arc::new(OfflineGateway), test_config());
        hub.close().await;
        hub.close().await;
    }
}
