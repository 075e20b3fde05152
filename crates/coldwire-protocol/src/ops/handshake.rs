//! Offer / join / answer / ice payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `offer` call parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferParams {
    /// Initiator's local session description.
    pub sdp: String,
}

/// `offer` call result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferResult {
    /// Session id allocated by the relay, shared out of band (QR code, link).
    pub sid: String,
}

/// `join` call parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinParams {
    pub sid: String,
}

/// `join` call result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinResult {
    /// The initiator's SDP offer.
    pub offer: String,
}

/// `answer` call parameters, responder to relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerParams {
    pub sid: String,
    pub sdp: String,
}

/// `answer` call parameters, relay to initiator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayedAnswer {
    pub sdp: String,
}

/// `ice` notification parameters. The candidate is opaque to coldwire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceParams {
    pub candidate: Value,
}
