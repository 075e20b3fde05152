//! Handshake states, events and errors.

use std::fmt;

use serde::Serialize;

use crate::engine::EngineError;
use crate::transport::TransportError;

/// Which side of the handshake this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Publishes the offer and receives a session id.
    Initiator,
    /// Joins an existing session id and answers.
    Responder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => write!(f, "initiator"),
            Role::Responder => write!(f, "responder"),
        }
    }
}

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeState {
    NotStarted,
    /// Signaling socket created; waiting for the offer (initiator) or the
    /// join result (responder).
    ConnectingHandshake,
    /// Offer published, session id known, waiting for the answer.
    ExchangingOfferAnswer,
    /// Descriptions applied on both sides; candidates flow until the peer
    /// connects or the fallback deadline passes.
    ExchangingIce,
    /// A transport is usable.
    Connected,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeState::NotStarted => "not_started",
            HandshakeState::ConnectingHandshake => "connecting_handshake",
            HandshakeState::ExchangingOfferAnswer => "exchanging_offer_answer",
            HandshakeState::ExchangingIce => "exchanging_ice",
            HandshakeState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// The transport application calls travel on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Peer,
    Fallback,
}

/// Notifications emitted by a session, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The relay allocated a session id (initiator only). Share it with the
    /// responder out of band.
    SessionId(String),
    /// The peer channel did not connect in time; switching to the
    /// signaling tunnel.
    FallingBack,
    /// A transport is ready for application calls.
    Connected(TransportKind),
    /// The handshake is over and the signaling socket closed.
    Terminated,
    /// The relay rejected an offer/join, or a description could not be
    /// applied.
    Failed(String),
}

/// Session errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid {method} payload: {source}")]
    Payload {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Session aborted")]
    Aborted,
}
