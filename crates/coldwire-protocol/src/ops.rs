//! Signaling operation types.
//!
//! The signaling relay is reached over a socket transport and speaks the
//! same JSON-RPC as every other channel. These are its methods and payloads.

pub mod fallback;
pub mod handshake;

pub use fallback::FallbackParams;
pub use handshake::{
    AnswerParams, IceParams, JoinParams, JoinResult, OfferParams, OfferResult, RelayedAnswer,
};

/// Known signaling method names.
pub mod names {
    /// Initiator publishes its SDP offer and receives a session id.
    pub const OFFER: &str = "offer";
    /// Responder fetches the offer for a session id.
    pub const JOIN: &str = "join";
    /// Responder publishes its SDP answer; the relay forwards it to the initiator.
    pub const ANSWER: &str = "answer";
    /// ICE candidate relay (notification).
    pub const ICE: &str = "ice";
    /// Tunnelled message of a fallback transport.
    pub const FALLBACK: &str = "fallback";
}
