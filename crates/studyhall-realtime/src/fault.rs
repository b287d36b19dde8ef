//! Fault sink boundary.
//!
//! The multiplexer never surfaces transport or protocol failures to
//! subscription consumers; everything that is not retried transparently is
//! reported here. The host application points this at its crash-reporting
//! pipeline; the default sink logs through `tracing`.

use crate::error::TransportError;

/// Sink for failures the multiplexer cannot (or will not) recover from
/// inline.
pub trait FaultSink: Send + Sync + 'static {
    /// A server-reported `error` frame arrived. The session stays open.
    fn server_error(&self, payload: &serde_json::Value);

    /// A transport-level failure occurred (opening or reading a session).
    fn transport_failure(&self, error: &TransportError);

    /// An inbound text frame did not decode as the gateway envelope. The
    /// session stays open.
    fn envelope_failure(&self, raw: &str, error: &serde_json::Error);
}

/// Default sink that reports faults as structured log events.
#[derive(Debug, Default)]
pub struct TracingFaultSink;

impl FaultSink for TracingFaultSink {
    fn server_error(&self, payload: &serde_json::Value) {
        tracing::warn!(%payload, "gateway reported an error");
    }

    fn transport_failure(&self, error: &TransportError) {
        tracing::warn!(error = %error, "realtime transport failure");
    }

    fn envelope_failure(&self, raw: &str, error: &serde_json::Error) {
        tracing::warn!(error = %error, raw, "undecodable gateway frame");
    }
}
