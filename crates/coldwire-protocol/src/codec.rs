//! Wire codec: Full JSON and Reduced pipe-delimited forms.
//!
//! Both forms are always accepted on decode so an engine never needs to know
//! which channel a piece of text came from. The Reduced form is only chosen
//! for outbound text on bandwidth-constrained channels.

use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::message::{MessageId, RpcMessage};
use crate::{JSONRPC_VERSION, REDUCED_DELIMITER};

/// Textual representation of a message on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireForm {
    /// One JSON object. Canonical form.
    #[default]
    Full,
    /// `method|id|json` (calls) or `|id|json` (results).
    Reduced,
}

impl WireForm {
    /// The form actually used when `msg` is encoded with `self`.
    ///
    /// Reduced only covers calls and results whose method and id survive the
    /// pipe split unchanged. Everything else is written in Full form:
    /// notifications and errors, methods or ids containing `|`, empty
    /// methods, methods that would be read back as Full text (leading `{`)
    /// or lose their leading whitespace on decode, and string ids made only
    /// of digits (they would come back as numbers).
    pub fn effective_for(self, msg: &RpcMessage) -> WireForm {
        if self == WireForm::Full {
            return WireForm::Full;
        }
        let reducible = match msg {
            RpcMessage::Call { method, id, .. } => reducible_method(method) && reducible_id(id),
            RpcMessage::Result { id, .. } => reducible_id(id),
            RpcMessage::Notification { .. } | RpcMessage::Error { .. } => false,
        };
        if reducible {
            WireForm::Reduced
        } else {
            WireForm::Full
        }
    }
}

fn reducible_method(method: &str) -> bool {
    match method.chars().next() {
        None | Some('{') => false,
        Some(first) if first.is_whitespace() => false,
        Some(_) => !method.contains(REDUCED_DELIMITER),
    }
}

fn reducible_id(id: &MessageId) -> bool {
    match id {
        MessageId::Number(_) => true,
        MessageId::Text(s) => {
            matches!(MessageId::from_segment(s), Some(MessageId::Text(_)))
                && !s.contains(REDUCED_DELIMITER)
        }
    }
}

/// Encode a message in the requested form (see [`WireForm::effective_for`]).
pub fn encode(msg: &RpcMessage, form: WireForm) -> String {
    match (form.effective_for(msg), msg) {
        (WireForm::Reduced, RpcMessage::Call { method, id, params }) => {
            format!("{method}|{id}|{params}")
        }
        (WireForm::Reduced, RpcMessage::Result { id, result }) => {
            format!("|{id}|{result}")
        }
        _ => encode_full(msg),
    }
}

fn encode_full(msg: &RpcMessage) -> String {
    let mut obj = Map::new();
    match msg {
        RpcMessage::Call { method, id, params } => {
            obj.insert("id".to_string(), id_value(id));
            obj.insert("method".to_string(), Value::String(method.clone()));
            if !params.is_null() {
                obj.insert("params".to_string(), params.clone());
            }
        }
        RpcMessage::Notification { method, params } => {
            obj.insert("method".to_string(), Value::String(method.clone()));
            if !params.is_null() {
                obj.insert("params".to_string(), params.clone());
            }
        }
        RpcMessage::Result { id, result } => {
            obj.insert("id".to_string(), id_value(id));
            obj.insert("result".to_string(), result.clone());
        }
        RpcMessage::Error { id, error } => {
            obj.insert("id".to_string(), id_value(id));
            obj.insert("error".to_string(), error.clone());
        }
    }
    obj.insert("jsonrpc".to_string(), Value::String(JSONRPC_VERSION.to_string()));
    Value::Object(obj).to_string()
}

fn id_value(id: &MessageId) -> Value {
    match id {
        MessageId::Number(n) => Value::from(*n),
        MessageId::Text(s) => Value::String(s.clone()),
    }
}

/// Decode wire text, returning `None` for anything garbled or partial.
pub fn decode(text: &str) -> Option<RpcMessage> {
    try_decode(text).ok()
}

/// Decode wire text, reporting why it failed.
pub fn try_decode(text: &str) -> Result<RpcMessage, DecodeError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(DecodeError::Empty);
    }
    if text.starts_with('{') {
        decode_full(text)
    } else {
        decode_reduced(text)
    }
}

fn decode_full(text: &str) -> Result<RpcMessage, DecodeError> {
    let mut obj = match serde_json::from_str::<Value>(text)? {
        Value::Object(obj) => obj,
        _ => return Err(DecodeError::NotAnObject),
    };

    let id = match obj.remove("id") {
        None | Some(Value::Null) => None,
        Some(raw) => Some(
            serde_json::from_value::<MessageId>(raw.clone())
                .map_err(|_| DecodeError::InvalidId(raw.to_string()))?,
        ),
    };

    if let Some(method) = obj.remove("method") {
        let Value::String(method) = method else {
            return Err(DecodeError::Unclassifiable);
        };
        let params = obj.remove("params").unwrap_or(Value::Null);
        return Ok(match id {
            Some(id) => RpcMessage::Call { method, id, params },
            None => RpcMessage::Notification { method, params },
        });
    }

    if let Some(result) = obj.remove("result") {
        let id = id.ok_or(DecodeError::MissingId { kind: "result" })?;
        return Ok(RpcMessage::Result { id, result });
    }

    if let Some(error) = obj.remove("error") {
        let id = id.ok_or(DecodeError::MissingId { kind: "error" })?;
        return Ok(RpcMessage::Error { id, error });
    }

    Err(DecodeError::Unclassifiable)
}

fn decode_reduced(text: &str) -> Result<RpcMessage, DecodeError> {
    // Only the first two delimiters are structural; the payload keeps any
    // further '|' it contains.
    let mut parts = text.splitn(3, REDUCED_DELIMITER);
    let method = parts.next().unwrap_or_default();
    let (id_segment, data) = match (parts.next(), parts.next()) {
        (Some(id), Some(data)) => (id, data),
        (Some(_), None) => return Err(DecodeError::MissingDelimiter { found: 1 }),
        _ => return Err(DecodeError::MissingDelimiter { found: 0 }),
    };

    let id = MessageId::from_segment(id_segment)
        .ok_or_else(|| DecodeError::InvalidId(id_segment.to_string()))?;
    let payload = if data.is_empty() {
        Value::Array(Vec::new())
    } else {
        serde_json::from_str::<Value>(data)?
    };

    if method.is_empty() {
        Ok(RpcMessage::Result {
            id,
            result: payload,
        })
    } else {
        Ok(RpcMessage::Call {
            method: method.to_string(),
            id,
            params: payload,
        })
    }
}
