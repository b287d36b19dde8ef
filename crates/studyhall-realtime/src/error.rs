//! Error types for the realtime module.

use thiserror::Error;

/// Errors raised by the transport boundary.
///
/// The session controller retries [`TransportError::Io`] failures through the
/// backoff schedule; every other variant is terminal for the current session.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Retriable I/O failure while opening or reading a session.
    #[error("transport i/o failure: {0}")]
    Io(String),

    /// The gateway rejected the upgrade request (bad credentials, bad
    /// project, protocol mismatch). Retrying will not help.
    #[error("gateway rejected session: {0}")]
    Rejected(String),

    /// The configured gateway URL could not be turned into a request.
    #[error("invalid gateway url: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// Whether the reconnect scheduler should retry after this failure.
    pub fn is_retriable(&self) -> bool {
        matches!(self, TransportError::Io(_))
    }
}

/// Errors that can occur in realtime operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// An inbound frame did not match the gateway envelope contract.
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        assert!(TransportError::Io("reset by peer".to_string()).is_retriable());
        assert!(!TransportError::Rejected("401".to_string()).is_retriable());
        assert!(!TransportError::InvalidUrl("not a url".to_string()).is_retriable());
    }

    #[test]
    fn test_transport_error_wraps_into_realtime_error() {
        let err: RealtimeError = TransportError::Io("timed out".to_string()).into();
        assert!(matches!(err, RealtimeError::Transport(_)));
    }
}
