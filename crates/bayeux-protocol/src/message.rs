//! Message envelopes for the Bayeux protocol.
//!
//! Every message exchanged between clients and the server is a JSON object
//! with a `channel` plus optional meta-protocol fields. Fields this crate
//! does not know about are preserved in [`Message::extra`].

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reconnection strategy advertised to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reconnect {
    /// Reconnect with a new `/meta/connect`.
    Retry,
    /// Start over with a new `/meta/handshake`.
    Handshake,
    /// Do not reconnect.
    None,
}

/// Protocol advice.
///
/// Sent by the server on handshake/connect responses. Clients may also send
/// advice on `/meta/connect`; its `timeout` (milliseconds) overrides the
/// connection hold time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Advice {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect: Option<Reconnect>,
    /// Delay before reconnecting, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    /// Connection hold time, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `subscription` field: a single channel or a list of channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Subscription {
    One(String),
    Many(Vec<String>),
}

impl Subscription {
    /// The requested channels, in order.
    #[must_use]
    pub fn channels(&self) -> Vec<&str> {
        match self {
            Subscription::One(channel) => vec![channel.as_str()],
            Subscription::Many(channels) => channels.iter().map(String::as_str).collect(),
        }
    }

    /// Whether the subscription names no channels at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Subscription::One(_) => false,
            Subscription::Many(channels) => channels.is_empty(),
        }
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Subscription::Many(Vec::new())
    }
}

impl From<&str> for Subscription {
    fn from(channel: &str) -> Self {
        Subscription::One(channel.to_string())
    }
}

impl From<Vec<String>> for Subscription {
    fn from(channels: Vec<String>) -> Self {
        Subscription::Many(channels)
    }
}

/// A Bayeux message envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Correlation id, echoed on responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advice: Option<Advice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_connection_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,
    /// Wire-format [`ProtocolError`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successful: Option<bool>,
    /// Fields not covered above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Create a message on a channel.
    #[must_use]
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: Some(channel.into()),
            ..Self::default()
        }
    }

    /// Create a publish message carrying `data`.
    #[must_use]
    pub fn publish(channel: impl Into<String>, data: Value) -> Self {
        Self::new(channel).with_data(data)
    }

    /// Set the client id.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the correlation id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Set the extension payload.
    #[must_use]
    pub fn with_ext(mut self, ext: Value) -> Self {
        self.ext = Some(ext);
        self
    }

    /// Set the subscription field.
    #[must_use]
    pub fn with_subscription(mut self, subscription: impl Into<Subscription>) -> Self {
        self.subscription = Some(subscription.into());
        self
    }

    /// Set the connection type.
    #[must_use]
    pub fn with_connection_type(mut self, connection_type: impl Into<String>) -> Self {
        self.connection_type = Some(connection_type.into());
        self
    }

    /// Build the response envelope for a request.
    ///
    /// Copies `id`, `clientId`, `channel` and `error` when present on the
    /// request and sets `successful` accordingly.
    #[must_use]
    pub fn response_to(request: &Message) -> Self {
        let mut response = Self {
            id: request.id.clone(),
            client_id: request.client_id.clone(),
            channel: request.channel.clone(),
            error: request.error.clone(),
            ..Self::default()
        };
        response.settle();
        response
    }

    /// The channel name, or an empty string when absent.
    #[must_use]
    pub fn channel_name(&self) -> &str {
        self.channel.as_deref().unwrap_or_default()
    }

    /// Attach an error, marking the message unsuccessful.
    pub fn fail(&mut self, error: ProtocolError) {
        self.error = Some(error.to_wire());
        self.successful = Some(false);
    }

    /// Whether an error is attached.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Recompute `successful` from the presence of an error.
    pub fn settle(&mut self) {
        self.successful = Some(self.error.is_none());
    }
}

/// Find the client id of the first `/meta/connect` message in a batch.
#[must_use]
pub fn client_id_from_messages(messages: &[Message]) -> Option<&str> {
    messages
        .iter()
        .find(|m| m.channel.as_deref() == Some(crate::channel::CONNECT))
        .and_then(|m| m.client_id.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_handshake() {
        let msg: Message = serde_json::from_value(json!({
            "channel": "/meta/handshake",
            "version": "1.0",
            "supportedConnectionTypes": ["long-polling", "websocket"],
            "id": "1"
        }))
        .unwrap();

        assert_eq!(msg.channel_name(), "/meta/handshake");
        assert_eq!(msg.version.as_deref(), Some("1.0"));
        assert_eq!(msg.supported_connection_types.unwrap().len(), 2);
    }

    #[test]
    fn test_subscription_forms() {
        let one: Message =
            serde_json::from_value(json!({"channel": "/meta/subscribe", "subscription": "/a"}))
                .unwrap();
        assert_eq!(one.subscription.unwrap().channels(), vec!["/a"]);

        let many: Message = serde_json::from_value(
            json!({"channel": "/meta/subscribe", "subscription": ["/a", "/b/*"]}),
        )
        .unwrap();
        let sub = many.subscription.unwrap();
        assert_eq!(sub.channels(), vec!["/a", "/b/*"]);
        assert!(!sub.is_empty());
        assert!(Subscription::default().is_empty());
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let msg: Message = serde_json::from_value(json!({
            "channel": "/chat",
            "data": {"text": "hi"},
            "custom": 7
        }))
        .unwrap();
        assert_eq!(msg.extra.get("custom"), Some(&json!(7)));

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"channel": "/chat", "data": {"text": "hi"}, "custom": 7}));
    }

    #[test]
    fn test_response_to() {
        let request = Message::new("/meta/connect")
            .with_id("42")
            .with_client_id("abc")
            .with_connection_type("long-polling");
        let response = Message::response_to(&request);

        assert_eq!(response.id.as_deref(), Some("42"));
        assert_eq!(response.client_id.as_deref(), Some("abc"));
        assert_eq!(response.channel_name(), "/meta/connect");
        assert_eq!(response.successful, Some(true));
        assert!(response.connection_type.is_none());
    }

    #[test]
    fn test_response_carries_request_error() {
        let mut request = Message::new("/chat");
        request.error = Some("403::Forbidden channel".into());
        let response = Message::response_to(&request);
        assert_eq!(response.successful, Some(false));
    }

    #[test]
    fn test_fail() {
        let mut response = Message::new("/meta/subscribe");
        response.fail(ProtocolError::parameter_missing(["clientId"]));
        assert_eq!(
            response.error.as_deref(),
            Some("402:clientId:Missing required parameter")
        );
        assert_eq!(response.successful, Some(false));

        response.error = None;
        response.settle();
        assert_eq!(response.successful, Some(true));
    }

    #[test]
    fn test_advice_serialization() {
        let advice = Advice {
            reconnect: Some(Reconnect::Retry),
            interval: Some(0),
            timeout: Some(60_000),
            ..Advice::default()
        };
        assert_eq!(
            serde_json::to_value(&advice).unwrap(),
            json!({"reconnect": "retry", "interval": 0, "timeout": 60000})
        );
    }

    #[test]
    fn test_client_id_from_messages() {
        let batch = vec![
            Message::new("/meta/subscribe").with_client_id("a"),
            Message::new("/meta/connect").with_client_id("b"),
        ];
        assert_eq!(client_id_from_messages(&batch), Some("b"));
        assert_eq!(client_id_from_messages(&batch[..1]), None);
    }
}
