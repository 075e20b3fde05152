//! coldwire - JSON-RPC between a hot wallet and a cold signer
//!
//! One RPC engine runs over interchangeable transports:
//! - a signaling socket to a relay,
//! - a direct peer channel negotiated through that relay, with a tunnelled
//!   fallback when the peer channel does not come up,
//! - an air-gapped visual channel of QR codes read by a camera.
//!
//! The wire codec lives in the `coldwire-protocol` crate and is re-exported
//! here.

pub mod config;
pub mod engine;
pub mod mock;
pub mod qr;
pub mod session;
mod sync;
pub mod transport;

pub use coldwire_protocol::{decode, encode, try_decode, DecodeError, MessageId, RpcMessage, WireForm};
pub use config::{EffectiveConfig, HandshakeConfig, QrConfig};
pub use engine::{CallError, CallOutcome, EngineError, IncomingRequest, PendingCall, RequestHandler, Responder, RpcEngine};
pub use qr::{QrChannel, QrDisplay, QrFrameSet, QrReader, QrScanner};
pub use session::{HandshakeSession, HandshakeState, Role, SessionError, SessionEvent, SessionSlot, TransportKind};
pub use transport::{
    FallbackTransport, MessageSink, PeerConnection, PeerEvent, PeerSignal, PeerTransport, SocketTransport, TextSocket,
    TransportError,
};
