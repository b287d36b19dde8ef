//! Transport boundary: session factory, frame stream and reachability gate.
//!
//! The multiplexer treats the gateway connection as an opaque frame stream
//! produced by a [`SessionTransport`] factory. Production uses the WebSocket
//! implementation in [`GatewayTransport`]; tests inject scripted mocks.

use crate::channel::ChannelSet;
use crate::error::TransportError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// An inbound frame, already reduced to what the dispatcher cares about.
#[derive(Debug, Clone)]
pub enum Frame {
    /// A text frame carrying a JSON envelope.
    Text(String),
    /// The peer closed the session.
    Close {
        /// Close code, when the peer sent one.
        code: Option<u16>,
        /// Close reason, possibly empty.
        reason: String,
    },
}

/// One live session's inbound frame stream.
#[async_trait]
pub trait SessionStream: Send {
    /// Next frame, `None` once the stream has ended.
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;

    /// Best-effort graceful close. Dropping the stream also closes it.
    async fn close(&mut self) {}
}

/// Factory for live sessions, parametrized with the channel set the session
/// should listen on.
#[async_trait]
pub trait SessionTransport: Send + Sync + 'static {
    /// Open a session subscribed to the given channels.
    async fn open(&self, channels: &ChannelSet) -> Result<Box<dyn SessionStream>, TransportError>;
}

/// Connectivity oracle the session controller waits on before dialing.
///
/// The mobile shell feeds OS reachability into this; servers and tests can
/// use [`AlwaysReachable`].
#[async_trait]
pub trait Reachability: Send + Sync + 'static {
    /// Resolve once connectivity is reported. May resolve immediately.
    async fn wait_until_reachable(&self);
}

/// Oracle that always reports connectivity.
#[derive(Debug, Default)]
pub struct AlwaysReachable;

#[async_trait]
impl Reachability for AlwaysReachable {
    async fn wait_until_reachable(&self) {}
}

/// Oracle backed by a `watch` channel owned by the host application.
#[derive(Debug, Clone)]
pub struct WatchReachability {
    rx: watch::Receiver<bool>,
}

impl WatchReachability {
    /// Wrap a reachability feed. The sender half belongs to the host.
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl Reachability for WatchReachability {
    async fn wait_until_reachable(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // The oracle went away; dialing and failing beats stalling
                // the session forever.
                tracing::warn!("reachability oracle dropped, proceeding without it");
                return;
            }
        }
    }
}

/// WebSocket session factory for the Studyhall realtime gateway.
///
/// Sessions are opened against
/// `<base_url>/realtime?project=<id>&channels=<c>&channels=<c>...`.
#[derive(Debug, Clone)]
pub struct GatewayTransport {
    base_url: String,
    project: String,
}

impl GatewayTransport {
    /// Create a factory for the given gateway and project.
    pub fn new(base_url: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            project: project.into(),
        }
    }

    /// Session URL for a channel set. Channel order is deterministic.
    fn endpoint(&self, channels: &ChannelSet) -> String {
        let mut url = format!(
            "{}/realtime?project={}",
            self.base_url.trim_end_matches('/'),
            self.project
        );
        for channel in channels.iter() {
            url.push_str("&channels=");
            url.push_str(channel);
        }
        url
    }
}

#[async_trait]
impl SessionTransport for GatewayTransport {
    async fn open(&self, channels: &ChannelSet) -> Result<Box<dyn SessionStream>, TransportError> {
        let url = self.endpoint(channels);
        tracing::debug!(%url, "dialing realtime gateway");

        let (stream, _response) = connect_async(url.as_str()).await.map_err(classify)?;
        Ok(Box::new(WsSession { inner: stream }))
    }
}

/// Live WebSocket session.
struct WsSession {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl SessionStream for WsSession {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some(Ok(Frame::Text(text.to_string())));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.to_string()),
                        None => (None, String::new()),
                    };
                    return Some(Ok(Frame::Close { code, reason }));
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = self.inner.send(Message::Pong(payload)).await;
                }
                // Binary and other control traffic is not part of the
                // gateway contract.
                Some(Ok(_)) => {}
                Some(Err(e)) => return Some(Err(classify(e))),
                None => return None,
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.inner.close(None).await;
    }
}

/// Map a tungstenite error into the retriable/fatal taxonomy.
fn classify(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::Http(response) => {
            TransportError::Rejected(format!("http status {}", response.status()))
        }
        tungstenite::Error::Url(e) => TransportError::InvalidUrl(e.to_string()),
        other => TransportError::Io(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_carries_project_and_channels() {
        let transport = GatewayTransport::new("wss://realtime.studyhall.app/", "proj_7");
        let channels: ChannelSet = ["plans:42", "decks:42"].into_iter().collect();

        assert_eq!(
            transport.endpoint(&channels),
            "wss://realtime.studyhall.app/realtime?project=proj_7&channels=decks:42&channels=plans:42"
        );
    }

    #[test]
    fn test_endpoint_with_empty_set_has_no_channels() {
        let transport = GatewayTransport::new("wss://gw.example", "p");
        assert_eq!(
            transport.endpoint(&ChannelSet::new()),
            "wss://gw.example/realtime?project=p"
        );
    }

    #[tokio::test]
    async fn test_watch_reachability_blocks_until_true() {
        let (tx, rx) = watch::channel(false);
        let gate = WatchReachability::new(rx);

        let waiter = tokio::spawn(async move { gate.wait_until_reachable().await });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        tx.send(true).unwrap();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_watch_reachability_passes_when_already_true() {
        let (_tx, rx) = watch::channel(true);
        WatchReachability::new(rx).wait_until_reachable().await;
    }

    #[tokio::test]
    async fn test_always_reachable() {
        AlwaysReachable.wait_until_reachable().await;
    }
}
