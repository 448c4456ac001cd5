use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::ws::error::WsError;
use crate::ws::heartbeat::HeartbeatSample;

/// Routing key for an [`InboundEvent`].
///
/// Server-originated types mirror the wire `type`; the remaining variants are produced
/// locally by the connection worker.
#[non_exhaustive]
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::AsRefStr,
    strum_macros::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    Pong,
    ConnectionEstablished,
    SubscriptionConfirmed,
    StatsUpdate,
    TokenDiscovery,
    LiveAlert,
    PriceUpdate,
    MarketStatus,
    TechnicalIndicators,
    Error,
    /// A `heartbeat` frame pushed by the server
    ServerHeartbeat,
    /// Any server type this client does not know about
    Message,
    /// Round-trip sample measured by the heartbeat monitor
    Heartbeat,
    Connected,
    Disconnected,
    Reconnecting,
    #[strum(serialize = "reconnect:failed")]
    ReconnectFailed,
}

/// Payload of an [`InboundEvent`], one variant per event type.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Reply to a `ping`; carries the echoed timestamp when the server provides one
    Pong { timestamp: Option<i64> },
    ConnectionEstablished(Value),
    SubscriptionConfirmed(Value),
    StatsUpdate(Value),
    TokenDiscovery(Value),
    LiveAlert(Value),
    /// A single price update; `bulk_price_update` frames are unrolled into these
    PriceUpdate(Value),
    MarketStatus(Value),
    TechnicalIndicators(Value),
    /// Error reported by the server
    Error { message: String, data: Value },
    ServerHeartbeat(Value),
    /// Server frame with a `type` this client does not know
    Message { kind: String, data: Value },
    Heartbeat(HeartbeatSample),
    Connected,
    Disconnected { code: Option<u16>, reason: String },
    Reconnecting { attempt: u32, delay: Duration },
    ReconnectFailed { attempts: u32 },
    /// Transport-level failure observed by the connection worker
    TransportError { message: String },
}

impl EventKind {
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::Pong { .. } => EventType::Pong,
            Self::ConnectionEstablished(_) => EventType::ConnectionEstablished,
            Self::SubscriptionConfirmed(_) => EventType::SubscriptionConfirmed,
            Self::StatsUpdate(_) => EventType::StatsUpdate,
            Self::TokenDiscovery(_) => EventType::TokenDiscovery,
            Self::LiveAlert(_) => EventType::LiveAlert,
            Self::PriceUpdate(_) => EventType::PriceUpdate,
            Self::MarketStatus(_) => EventType::MarketStatus,
            Self::TechnicalIndicators(_) => EventType::TechnicalIndicators,
            Self::Error { .. } | Self::TransportError { .. } => EventType::Error,
            Self::ServerHeartbeat(_) => EventType::ServerHeartbeat,
            Self::Message { .. } => EventType::Message,
            Self::Heartbeat(_) => EventType::Heartbeat,
            Self::Connected => EventType::Connected,
            Self::Disconnected { .. } => EventType::Disconnected,
            Self::Reconnecting { .. } => EventType::Reconnecting,
            Self::ReconnectFailed { .. } => EventType::ReconnectFailed,
        }
    }

    /// The server payload, for server-originated events.
    #[must_use]
    pub const fn data(&self) -> Option<&Value> {
        match self {
            Self::ConnectionEstablished(data)
            | Self::SubscriptionConfirmed(data)
            | Self::StatsUpdate(data)
            | Self::TokenDiscovery(data)
            | Self::LiveAlert(data)
            | Self::PriceUpdate(data)
            | Self::MarketStatus(data)
            | Self::TechnicalIndicators(data)
            | Self::ServerHeartbeat(data)
            | Self::Error { data, .. }
            | Self::Message { data, .. } => Some(data),
            _ => None,
        }
    }
}

/// An event delivered to subscribers.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// Name of the connection the event belongs to
    pub connection: String,
    pub kind: EventKind,
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    #[must_use]
    pub fn new<S: Into<String>>(connection: S, kind: EventKind) -> Self {
        Self {
            connection: connection.into(),
            kind,
            received_at: Utc::now(),
        }
    }

    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.kind.event_type()
    }
}

/// Decode one inbound frame into zero or more events.
///
/// Accepts `{"type": .., "data": {..}}`, a bare object with `type` at the top level, or a
/// JSON array of either. Returns an empty vector for empty or whitespace-only frames
/// (server keepalives).
pub fn decode(bytes: &[u8]) -> crate::Result<Vec<EventKind>> {
    let trimmed = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map_or(&[][..], |start| &bytes[start..]);

    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_slice(trimmed).map_err(WsError::MessageParse)?;
    match value {
        Value::Object(frame) => decode_frame(frame),
        Value::Array(frames) => {
            let mut events = Vec::with_capacity(frames.len());
            for frame in frames {
                let Value::Object(frame) = frame else {
                    return Err(WsError::InvalidMessage(
                        "array frames must contain only objects".to_owned(),
                    )
                    .into());
                };
                events.extend(decode_frame(frame)?);
            }
            Ok(events)
        }
        other => Err(WsError::InvalidMessage(format!("expected an object, got {other}")).into()),
    }
}

fn decode_frame(mut frame: Map<String, Value>) -> crate::Result<Vec<EventKind>> {
    let kind = match frame.remove("type") {
        Some(Value::String(kind)) => kind,
        _ => return Err(WsError::InvalidMessage("frame has no string `type`".to_owned()).into()),
    };
    let data = frame
        .remove("data")
        .unwrap_or_else(|| Value::Object(frame));

    let event = match kind.as_str() {
        "pong" => EventKind::Pong {
            timestamp: data.get("timestamp").and_then(Value::as_i64),
        },
        "connection_established" => EventKind::ConnectionEstablished(data),
        "subscription_confirmed" => EventKind::SubscriptionConfirmed(data),
        "stats_update" => EventKind::StatsUpdate(data),
        "token_discovery" => EventKind::TokenDiscovery(data),
        "live_alert" => EventKind::LiveAlert(data),
        "price_update" => EventKind::PriceUpdate(data),
        "bulk_price_update" => return unroll_bulk_prices(data),
        "market_status" => EventKind::MarketStatus(data),
        "technical_indicators" => EventKind::TechnicalIndicators(data),
        "heartbeat" => EventKind::ServerHeartbeat(data),
        "error" => EventKind::Error {
            message: error_message(&data),
            data,
        },
        _ => EventKind::Message { kind, data },
    };

    Ok(vec![event])
}

fn unroll_bulk_prices(data: Value) -> crate::Result<Vec<EventKind>> {
    let updates = match data {
        Value::Array(updates) => updates,
        Value::Object(mut object) => match object.remove("updates") {
            Some(Value::Array(updates)) => updates,
            _ => {
                return Err(WsError::InvalidMessage(
                    "bulk_price_update carries no `updates` array".to_owned(),
                )
                .into());
            }
        },
        _ => {
            return Err(
                WsError::InvalidMessage("bulk_price_update data is not an array".to_owned()).into(),
            );
        }
    };

    Ok(updates.into_iter().map(EventKind::PriceUpdate).collect())
}

fn error_message(data: &Value) -> String {
    match data {
        Value::String(message) => message.clone(),
        _ => data
            .get("message")
            .or_else(|| data.get("error"))
            .and_then(Value::as_str)
            .unwrap_or("unknown server error")
            .to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::Kind;

    #[test]
    fn decode_wrapped_price_update() {
        let json = r#"{"type":"price_update","data":{"token_address":"0xabc","price":1.25}}"#;

        let events = decode(json.as_bytes()).unwrap();
        assert_eq!(
            events,
            vec![EventKind::PriceUpdate(
                json!({ "token_address": "0xabc", "price": 1.25 })
            )]
        );
        assert_eq!(events[0].event_type(), EventType::PriceUpdate);
    }

    #[test]
    fn decode_bare_frame_uses_remaining_fields_as_data() {
        let json = r#"{"type":"market_status","open":true,"session":"regular"}"#;

        let events = decode(json.as_bytes()).unwrap();
        assert_eq!(
            events,
            vec![EventKind::MarketStatus(
                json!({ "open": true, "session": "regular" })
            )]
        );
    }

    #[test]
    fn decode_pong_with_and_without_timestamp() {
        let echoed = decode(br#"{"type":"pong","timestamp":1700000000123}"#).unwrap();
        assert_eq!(
            echoed,
            vec![EventKind::Pong {
                timestamp: Some(1_700_000_000_123)
            }]
        );

        let plain = decode(br#"{"type":"pong"}"#).unwrap();
        assert_eq!(plain, vec![EventKind::Pong { timestamp: None }]);
    }

    #[test]
    fn decode_bulk_price_update_unrolls() {
        let json = r#"{
            "type": "bulk_price_update",
            "data": [
                { "token_address": "0x1", "price": 1.0 },
                { "token_address": "0x2", "price": 2.0 }
            ]
        }"#;

        let events = decode(json.as_bytes()).unwrap();
        assert_eq!(events.len(), 2);
        assert!(
            events
                .iter()
                .all(|event| event.event_type() == EventType::PriceUpdate)
        );
        assert_eq!(
            events[1].data().and_then(|data| data.get("token_address")),
            Some(&json!("0x2"))
        );
    }

    #[test]
    fn decode_bulk_price_update_with_updates_field() {
        let json = r#"{"type":"bulk_price_update","updates":[{"price":3.0}]}"#;

        let events = decode(json.as_bytes()).unwrap();
        assert_eq!(events, vec![EventKind::PriceUpdate(json!({ "price": 3.0 }))]);
    }

    #[test]
    fn decode_unknown_type_becomes_message() {
        let json = r#"{"type":"whale_watch","data":{"size":1000}}"#;

        let events = decode(json.as_bytes()).unwrap();
        assert_eq!(
            events,
            vec![EventKind::Message {
                kind: "whale_watch".to_owned(),
                data: json!({ "size": 1000 }),
            }]
        );
        assert_eq!(events[0].event_type(), EventType::Message);
    }

    #[test]
    fn decode_server_error_extracts_message() {
        let json = r#"{"type":"error","data":{"message":"rate limited"}}"#;

        let events = decode(json.as_bytes()).unwrap();
        assert!(matches!(
            &events[0],
            EventKind::Error { message, .. } if message == "rate limited"
        ));
    }

    #[test]
    fn decode_array_of_frames() {
        let json = r#"[{"type":"stats_update","data":{}},{"type":"live_alert","data":{}}]"#;

        let types: Vec<_> = decode(json.as_bytes())
            .unwrap()
            .iter()
            .map(EventKind::event_type)
            .collect();
        assert_eq!(types, vec![EventType::StatsUpdate, EventType::LiveAlert]);
    }

    #[test]
    fn decode_empty_frame_is_keepalive() {
        assert!(decode(b"").unwrap().is_empty());
        assert!(decode(b"   \n").unwrap().is_empty());
    }

    #[test]
    fn decode_invalid_json_is_parse_error() {
        let err = decode(b"{not json").unwrap_err();

        assert_eq!(err.kind(), Kind::WebSocket);
        assert!(matches!(
            err.downcast_ref::<WsError>(),
            Some(WsError::MessageParse(_))
        ));
    }

    #[test]
    fn decode_frame_without_type_is_invalid() {
        let err = decode(br#"{"data":{}}"#).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<WsError>(),
            Some(WsError::InvalidMessage(_))
        ));
    }

    #[test]
    fn event_type_names() {
        assert_eq!(EventType::PriceUpdate.to_string(), "price_update");
        assert_eq!(EventType::ReconnectFailed.as_ref(), "reconnect:failed");
        assert_eq!(<&str>::from(EventType::Heartbeat), "heartbeat");
    }
}
