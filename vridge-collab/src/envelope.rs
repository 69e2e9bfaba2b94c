//! Wire envelope shared by the presence and project channels.
//!
//! Wire format (JSON text frame):
//! ```text
//! ┌──────────────────┬──────────┬────────────────┬─────────────────┐
//! │ type             │ senderId │ payload        │ timestamp       │
//! │ "cursor.move"    │ "u-42"   │ { x, y, … }    │ epoch millis    │
//! └──────────────────┴──────────┴────────────────┴─────────────────┘
//! ```
//!
//! The envelope itself is untyped. Each subsystem decodes it into its own
//! sum type ([`PresenceMessage`](crate::presence::PresenceMessage),
//! [`ProjectMessage`](crate::project::ProjectMessage)) and drops any `type`
//! it does not recognise, so newer peers can add message kinds without
//! breaking older ones.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current time as milliseconds since Unix epoch.
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

/// Top-level wire message for both services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Dotted message type, e.g. `project.status.change`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Identity of the originating user. Empty for server-originated frames.
    #[serde(default)]
    pub sender_id: String,
    /// Message body; shape depends on `kind`.
    #[serde(default)]
    pub payload: Value,
    /// Milliseconds since Unix epoch at the sender.
    #[serde(default)]
    pub timestamp: i64,
}

impl Envelope {
    /// Build an envelope stamped with the current time.
    pub fn new(kind: impl Into<String>, sender_id: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            sender_id: sender_id.into(),
            payload,
            timestamp: now_ms(),
        }
    }

    /// Build an envelope from any serializable payload.
    pub fn with_payload<T: Serialize>(
        kind: impl Into<String>,
        sender_id: impl Into<String>,
        payload: &T,
    ) -> Result<Self, EnvelopeError> {
        let value = serde_json::to_value(payload)
            .map_err(|e| EnvelopeError::SerializationError(e.to_string()))?;
        Ok(Self::new(kind, sender_id, value))
    }

    /// Decode the payload into a typed body.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, EnvelopeError> {
        T::deserialize(&self.payload).map_err(|e| EnvelopeError::InvalidPayload {
            kind: self.kind.clone(),
            reason: e.to_string(),
        })
    }

    /// Whether this envelope originated from `user_id`.
    pub fn is_from(&self, user_id: &str) -> bool {
        !self.sender_id.is_empty() && self.sender_id == user_id
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(|e| EnvelopeError::SerializationError(e.to_string()))
    }

    /// Deserialize from a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, EnvelopeError> {
        serde_json::from_str(text).map_err(|e| EnvelopeError::DeserializationError(e.to_string()))
    }

    /// Deserialize from raw bytes (binary frames carrying UTF-8 JSON).
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(bytes)
            .map_err(|e| EnvelopeError::DeserializationError(e.to_string()))
    }
}

/// Envelope codec errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Invalid payload for {kind}: {reason}")]
    InvalidPayload { kind: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_shape() {
        let env = Envelope::new("cursor.move", "u-1", json!({ "x": 1.0, "y": 2.0 }));
        let text = env.encode().unwrap();
        let raw: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(raw["type"], "cursor.move");
        assert_eq!(raw["senderId"], "u-1");
        assert_eq!(raw["payload"]["y"], 2.0);
        assert!(raw["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_decode_tolerates_missing_fields() {
        let env = Envelope::decode(r#"{"type":"sync.response"}"#).unwrap();
        assert_eq!(env.kind, "sync.response");
        assert!(env.sender_id.is_empty());
        assert!(env.payload.is_null());
        assert_eq!(env.timestamp, 0);
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let env = Envelope::decode(
            r#"{"type":"user.idle","senderId":"u-2","payload":null,"timestamp":5,"room":"x"}"#,
        )
        .unwrap();
        assert_eq!(env.sender_id, "u-2");
        assert_eq!(env.timestamp, 5);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(Envelope::decode("not json").is_err());
        assert!(Envelope::decode(r#"{"senderId":"u"}"#).is_err());
        assert!(Envelope::decode_bytes(&[0xFF, 0xFE]).is_err());
    }

    #[test]
    fn test_payload_as_reports_kind() {
        #[derive(Debug, Deserialize)]
        struct Body {
            #[allow(dead_code)]
            status: String,
        }

        let env = Envelope::new("project.status.change", "u", json!({ "progress": 3 }));
        match env.payload_as::<Body>() {
            Err(EnvelopeError::InvalidPayload { kind, .. }) => {
                assert_eq!(kind, "project.status.change");
            }
            other => panic!("expected InvalidPayload, got {other:?}"),
        }
    }

    #[test]
    fn test_is_from() {
        let env = Envelope::new("user.leave", "alice", Value::Null);
        assert!(env.is_from("alice"));
        assert!(!env.is_from("bob"));

        let anonymous = Envelope::new("sync.response", "", Value::Null);
        assert!(!anonymous.is_from(""));
    }
}
