//! Events exchanged between the live reading channel and its transport

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Opaque telemetry record, exactly as the server sent it
pub type Reading = serde_json::Value;

/// Identifies one connection attempt of a channel.
///
/// Each time the channel opens a transport it allocates a fresh id; events
/// stamped with any other id belong to a torn-down session and are dropped.
pub type SessionId = u64;

/// Socket.IO event names used on the readings namespace
pub mod names {
    pub const AUTHENTICATED: &str = "authenticated";
    pub const SUBSCRIBED: &str = "subscribed";
    pub const UNSUBSCRIBED: &str = "unsubscribed";
    pub const DEVICE_DATA: &str = "device_data";
    pub const ERROR: &str = "error";
    pub const SUBSCRIBE_DEVICE: &str = "subscribe_device";
    pub const UNSUBSCRIBE_DEVICE: &str = "unsubscribe_device";
}

/// Events a transport reports for an open session
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Transport-level connection established
    Connected,
    /// Server accepted the credential
    Authenticated,
    Subscribed,
    Unsubscribed,
    /// New reading for the subscribed device
    Data(Reading),
    /// Explicit error event from the server after connecting
    ServerError(String),
    /// Connection could not be established
    ConnectError(String),
    /// Transport closed, with the Socket.IO disconnect reason
    Disconnected(String),
}

impl InboundEvent {
    /// Map a named Socket.IO event to an inbound event.
    ///
    /// Returns `None` for event names the channel does not consume.
    pub fn from_socket_event(name: &str, payload: Option<serde_json::Value>) -> Option<Self> {
        match name {
            names::AUTHENTICATED => Some(InboundEvent::Authenticated),
            names::SUBSCRIBED => Some(InboundEvent::Subscribed),
            names::UNSUBSCRIBED => Some(InboundEvent::Unsubscribed),
            names::DEVICE_DATA => Some(InboundEvent::Data(
                payload.unwrap_or(serde_json::Value::Null),
            )),
            names::ERROR => Some(InboundEvent::ServerError(error_message(payload))),
            _ => None,
        }
    }
}

/// Extract a human-readable message from an error payload.
///
/// Servers send either a bare string or an object with a `message` field.
pub fn error_message(payload: Option<serde_json::Value>) -> String {
    match payload {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Object(map)) => match map.get("message") {
            Some(serde_json::Value::String(s)) => s.clone(),
            _ => serde_json::Value::Object(map).to_string(),
        },
        Some(other) => other.to_string(),
        None => "Unknown server error".to_string(),
    }
}

/// Payload of subscribe/unsubscribe requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePayload {
    pub device_id: String,
}

/// Requests the channel sends to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    SubscribeDevice { device_id: String },
    UnsubscribeDevice { device_id: String },
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::SubscribeDevice { .. } => names::SUBSCRIBE_DEVICE,
            OutboundEvent::UnsubscribeDevice { .. } => names::UNSUBSCRIBE_DEVICE,
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        let device_id = match self {
            OutboundEvent::SubscribeDevice { device_id }
            | OutboundEvent::UnsubscribeDevice { device_id } => device_id.clone(),
        };
        serde_json::json!(DevicePayload { device_id })
    }
}

/// An inbound event tagged with the session it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub session: SessionId,
    pub event: InboundEvent,
}

/// Handed to a transport when a session is opened; every event it emits is
/// stamped with that session's id.
#[derive(Debug, Clone)]
pub struct EventSink {
    session: SessionId,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    pub fn new(session: SessionId, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Report an event. Returns `false` once the channel has gone away.
    pub fn emit(&self, event: InboundEvent) -> bool {
        self.tx
            .send(SessionEvent {
                session: self.session,
                event,
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_device_data_payload_is_verbatim() {
        let event = InboundEvent::from_socket_event("device_data", Some(json!({"temp": 22})));
        assert_eq!(event, Some(InboundEvent::Data(json!({"temp": 22}))));
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        assert_eq!(InboundEvent::from_socket_event("pong_stats", None), None);
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(error_message(Some(json!("boom"))), "boom");
        assert_eq!(
            error_message(Some(json!({"message": "device offline"}))),
            "device offline"
        );
        assert_eq!(error_message(Some(json!({"code": 7}))), r#"{"code":7}"#);
        assert_eq!(error_message(None), "Unknown server error");
    }

    #[test]
    fn test_outbound_payload_uses_camel_case() {
        let event = OutboundEvent::SubscribeDevice {
            device_id: "dev-1".to_string(),
        };
        assert_eq!(event.name(), "subscribe_device");
        assert_eq!(event.payload(), json!({"deviceId": "dev-1"}));
    }

    #[test]
    fn test_sink_stamps_session() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(7, tx);
        assert!(sink.emit(InboundEvent::Connected));
        let received = rx.try_recv().unwrap();
        assert_eq!(received.session, 7);
        assert_eq!(received.event, InboundEvent::Connected);

        drop(rx);
        assert!(!sink.emit(InboundEvent::Subscribed));
    }
}
