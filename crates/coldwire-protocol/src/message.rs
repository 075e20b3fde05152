//! RPC message model.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message id used to correlate a call with its response.
///
/// Engines allocate numeric ids; QR flows may use caller-chosen strings so
/// that a human driving two devices can predict them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Number(u64),
    Text(String),
}

impl MessageId {
    /// Parse the id segment of a Reduced-form message.
    ///
    /// A segment made only of ASCII digits becomes a number; anything else
    /// stays a string. An empty segment is rejected.
    pub fn from_segment(segment: &str) -> Option<Self> {
        if segment.is_empty() {
            return None;
        }
        if segment.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = segment.parse::<u64>() {
                return Some(MessageId::Number(n));
            }
        }
        Some(MessageId::Text(segment.to_string()))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Number(n) => write!(f, "{}", n),
            MessageId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<u64> for MessageId {
    fn from(n: u64) -> Self {
        MessageId::Number(n)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        MessageId::Text(s.to_string())
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        MessageId::Text(s)
    }
}

/// One RPC message, classified once at decode time.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcMessage {
    /// A request that expects a response.
    Call {
        method: String,
        id: MessageId,
        params: Value,
    },
    /// A fire-and-forget request.
    Notification { method: String, params: Value },
    /// Successful response to a call.
    Result { id: MessageId, result: Value },
    /// Failed response to a call. The payload is opaque to the engine.
    Error { id: MessageId, error: Value },
}

impl RpcMessage {
    /// Build a call.
    pub fn call(method: impl Into<String>, id: impl Into<MessageId>, params: Value) -> Self {
        RpcMessage::Call {
            method: method.into(),
            id: id.into(),
            params,
        }
    }

    /// Build a notification.
    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        RpcMessage::Notification {
            method: method.into(),
            params,
        }
    }

    /// Build a successful response.
    pub fn result(id: impl Into<MessageId>, result: Value) -> Self {
        RpcMessage::Result {
            id: id.into(),
            result,
        }
    }

    /// Build an error response.
    pub fn error(id: impl Into<MessageId>, error: Value) -> Self {
        RpcMessage::Error {
            id: id.into(),
            error,
        }
    }

    /// Correlation id; `None` only for notifications.
    pub fn id(&self) -> Option<&MessageId> {
        match self {
            RpcMessage::Call { id, .. } | RpcMessage::Result { id, .. } | RpcMessage::Error { id, .. } => Some(id),
            RpcMessage::Notification { .. } => None,
        }
    }

    /// Method name for calls and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            RpcMessage::Call { method, .. } | RpcMessage::Notification { method, .. } => Some(method),
            _ => None,
        }
    }

    /// Returns true for Result and Error.
    pub fn is_response(&self) -> bool {
        matches!(self, RpcMessage::Result { .. } | RpcMessage::Error { .. })
    }

    /// Short name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcMessage::Call { .. } => "call",
            RpcMessage::Notification { .. } => "notification",
            RpcMessage::Result { .. } => "result",
            RpcMessage::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_segment_id_typing() {
        assert_eq!(MessageId::from_segment("42"), Some(MessageId::Number(42)));
        assert_eq!(MessageId::from_segment("abc"), Some(MessageId::Text("abc".to_string())));
        assert_eq!(MessageId::from_segment("4a"), Some(MessageId::Text("4a".to_string())));
        assert_eq!(MessageId::from_segment("-1"), Some(MessageId::Text("-1".to_string())));
        assert_eq!(MessageId::from_segment(""), None);
    }

    #[test]
    fn test_huge_numeric_segment_stays_text() {
        let id = MessageId::from_segment("99999999999999999999999").unwrap();
        assert!(matches!(id, MessageId::Text(_)));
    }

    #[test]
    fn test_id_serializes_untagged() {
        assert_eq!(serde_json::to_value(MessageId::Number(7)).unwrap(), json!(7));
        assert_eq!(serde_json::to_value(MessageId::from("q-1")).unwrap(), json!("q-1"));
    }

    #[test]
    fn test_accessors() {
        let call = RpcMessage::call("sign", 3, json!([]));
        assert_eq!(call.id(), Some(&MessageId::Number(3)));
        assert_eq!(call.method(), Some("sign"));
        assert!(!call.is_response());

        let note = RpcMessage::notification("ice", json!({}));
        assert_eq!(note.id(), None);
        assert_eq!(note.kind(), "notification");

        let err = RpcMessage::error("x", json!("nope"));
        assert!(err.is_response());
        assert_eq!(err.method(), None);
    }
}
