//! Realtime Event Types

use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::constants::*;

/// Nested `error` object of an `error` event
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// The few envelope fields the relay reads for logging.
///
/// Decoding is best-effort: unknown fields are ignored and a failed decode
/// only means the frame is logged without a label.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

impl EventEnvelope {
    /// Decode the envelope from a raw text or binary payload
    pub fn decode(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }

    /// Length of the base64 `audio` field on audio append events
    pub fn audio_len(&self) -> Option<usize> {
        if self.kind == EVENT_AUDIO_APPEND {
            self.audio.as_ref().map(String::len)
        } else {
            None
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == EVENT_ERROR
    }
}

/// Error event generated by the relay itself when the upstream side fails
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub error: ErrorDetail,
}

impl ErrorEvent {
    /// Build a `connection_error` event with a human message and raw details
    pub fn connection_error(message: &str, details: impl ToString) -> Self {
        Self {
            kind: EVENT_ERROR.to_string(),
            error: ErrorDetail {
                kind: Some(CONNECTION_ERROR_TYPE.to_string()),
                code: None,
                message: Some(message.to_string()),
                details: Some(details.to_string()),
            },
        }
    }

    /// Encode as a text frame
    pub fn to_message(&self) -> serde_json::Result<Message> {
        serde_json::to_string(self).map(Message::Text)
    }
}

/// Borrow the payload of a data frame; control frames have none
pub fn payload(msg: &Message) -> Option<&[u8]> {
    match msg {
        Message::Text(text) => Some(text.as_bytes()),
        Message::Binary(data) => Some(data),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_audio_append() {
        let event = EventEnvelope::decode(
            br#"{"type":"input_audio_buffer.append","audio":"QUJD"}"#,
        )
        .unwrap();

        assert_eq!(event.kind, "input_audio_buffer.append");
        assert_eq!(event.audio_len(), Some(4));
        assert!(!event.is_error());
    }

    #[test]
    fn test_audio_len_only_for_append_events() {
        let event = EventEnvelope::decode(br#"{"type":"response.done","audio":"QUJD"}"#).unwrap();
        assert_eq!(event.audio_len(), None);
    }

    #[test]
    fn test_decode_upstream_error() {
        let event = EventEnvelope::decode(
            br#"{"type":"error","event_id":"evt_1","error":{"type":"invalid_request_error","code":"invalid_value","message":"bad","param":null}}"#,
        )
        .unwrap();

        assert!(event.is_error());
        let detail = event.error.unwrap();
        assert_eq!(detail.kind.as_deref(), Some("invalid_request_error"));
        assert_eq!(detail.message.as_deref(), Some("bad"));
    }

    #[test]
    fn test_decode_rejects_non_json() {
        assert!(EventEnvelope::decode(b"not json").is_err());
        assert!(EventEnvelope::decode(br#"{"no_type":1}"#).is_err());
    }

    #[test]
    fn test_connection_error_shape() {
        let event = ErrorEvent::connection_error(CONNECT_FAILED_MESSAGE, "connection refused");
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "error",
                "error": {
                    "type": "connection_error",
                    "message": "Failed to connect to OpenAI API",
                    "details": "connection refused"
                }
            })
        );
    }

    #[test]
    fn test_error_event_is_text_frame() {
        let msg = ErrorEvent::connection_error("m", "d").to_message().unwrap();
        assert!(msg.is_text());
    }

    #[test]
    fn test_payload_of_control_frames() {
        assert_eq!(payload(&Message::Text("x".into())), Some(&b"x"[..]));
        assert_eq!(payload(&Message::Binary(vec![1, 2])), Some(&[1u8, 2][..]));
        assert!(payload(&Message::Ping(vec![])).is_none());
    }
}
