//! Frame dispatcher: classifies inbound frames and feeds the event bus.

use crate::bus::EventBus;
use crate::error::{RealtimeError, TransportError};
use crate::event::GatewayEnvelope;
use crate::fault::FaultSink;
use crate::reconnect::ReconnectState;
use crate::transport::Frame;
use tracing::debug;

/// What the session task should do after one frame.
#[derive(Debug)]
pub(crate) enum FrameOutcome {
    /// Keep reading.
    Continue,
    /// The session is gone; hand off to the reconnect scheduler.
    Disconnected(String),
}

/// Handle one item from the session's frame stream.
pub(crate) fn handle_frame(
    frame: Option<Result<Frame, TransportError>>,
    bus: &EventBus,
    faults: &dyn FaultSink,
    attempts: &ReconnectState,
) -> FrameOutcome {
    match frame {
        Some(Ok(Frame::Text(text))) => {
            handle_text(&text, bus, faults, attempts);
            FrameOutcome::Continue
        }
        Some(Ok(Frame::Close { code, reason })) => {
            FrameOutcome::Disconnected(match code {
                Some(code) => format!("closed by peer (code {code}): {reason}"),
                None => "closed by peer".to_string(),
            })
        }
        Some(Err(error)) => {
            faults.transport_failure(&error);
            FrameOutcome::Disconnected(error.to_string())
        }
        None => FrameOutcome::Disconnected("frame stream ended".to_string()),
    }
}

/// Decode a text frame and republish it.
///
/// Server `error` frames and undecodable envelopes go to the fault sink
/// without terminating the session; `event` frames clear the reconnect
/// failure memory and land on the bus.
pub(crate) fn handle_text(
    text: &str,
    bus: &EventBus,
    faults: &dyn FaultSink,
    attempts: &ReconnectState,
) {
    match GatewayEnvelope::parse(text) {
        Ok(GatewayEnvelope::Event { data }) => {
            attempts.reset();
            debug!(channels = ?data.channels, "realtime event received");
            bus.publish(data.into());
        }
        Ok(GatewayEnvelope::Error { data }) => {
            faults.server_error(&data);
        }
        Err(RealtimeError::Envelope(error)) => {
            faults.envelope_failure(text, &error);
        }
        // parse only produces Envelope errors.
        Err(_) => {}
    }
}
