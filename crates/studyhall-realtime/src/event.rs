//! Gateway wire envelope and the decoded event type.

use crate::channel::ChannelSet;
use crate::error::RealtimeError;
use serde::Deserialize;

/// Envelope of every inbound text frame.
///
/// The gateway sends JSON objects of the shape
/// `{"type": "error" | "event", "data": <json>}`. For `event` frames the
/// data carries the channel list the event was published on plus an opaque
/// payload. This shape is a fixed external contract.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GatewayEnvelope {
    /// A realtime event published on one or more channels.
    Event {
        /// Channel tags and payload.
        data: EventBody,
    },
    /// A server-reported error. Does not terminate the session.
    Error {
        /// Raw error body, forwarded to the fault sink for diagnostics.
        data: serde_json::Value,
    },
}

/// Body of an `event` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct EventBody {
    /// Channels this event was published on.
    pub channels: Vec<String>,
    /// Opaque event payload.
    pub payload: serde_json::Value,
}

impl GatewayEnvelope {
    /// Parse a text frame into an envelope.
    pub fn parse(text: &str) -> Result<Self, RealtimeError> {
        serde_json::from_str(text).map_err(RealtimeError::Envelope)
    }
}

/// A decoded realtime event as republished on the broadcast bus.
#[derive(Debug, Clone)]
pub struct RawEvent {
    /// Channels this event was published on.
    pub channels: Vec<String>,
    /// Opaque event payload.
    pub payload: serde_json::Value,
}

impl RawEvent {
    /// Whether this event is of interest to a subscription with the given
    /// channel set.
    pub fn intersects(&self, channels: &ChannelSet) -> bool {
        self.channels.iter().any(|c| channels.contains(c))
    }
}

impl From<EventBody> for RawEvent {
    fn from(body: EventBody) -> Self {
        Self {
            channels: body.channels,
            payload: body.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_envelope() {
        let text = r#"{"type":"event","data":{"channels":["x"],"payload":{"a":1}}}"#;
        let envelope = GatewayEnvelope::parse(text).unwrap();

        match envelope {
            GatewayEnvelope::Event { data } => {
                assert_eq!(data.channels, vec!["x"]);
                assert_eq!(data.payload, serde_json::json!({"a": 1}));
            }
            _ => panic!("expected event envelope"),
        }
    }

    #[test]
    fn test_parse_error_envelope() {
        let text = r#"{"type":"error","data":{"code":"forbidden"}}"#;
        let envelope = GatewayEnvelope::parse(text).unwrap();

        match envelope {
            GatewayEnvelope::Error { data } => {
                assert_eq!(data["code"], "forbidden");
            }
            _ => panic!("expected error envelope"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let result = GatewayEnvelope::parse(r#"{"type":"pong","data":{}}"#);
        assert!(matches!(result, Err(RealtimeError::Envelope(_))));
    }

    #[test]
    fn test_parse_rejects_event_without_channels() {
        let result = GatewayEnvelope::parse(r#"{"type":"event","data":{"payload":{}}}"#);
        assert!(matches!(result, Err(RealtimeError::Envelope(_))));
    }

    #[test]
    fn test_raw_event_intersects() {
        let event = RawEvent {
            channels: vec!["plans:1".to_string()],
            payload: serde_json::Value::Null,
        };
        let interested: ChannelSet = ["plans:1", "decks:2"].into_iter().collect();
        let disjoint: ChannelSet = ["decks:2"].into_iter().collect();

        assert!(event.intersects(&interested));
        assert!(!event.intersects(&disjoint));
    }
}
