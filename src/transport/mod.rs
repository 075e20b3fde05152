//! Transport Layer for the RPC Engine
//!
//! Three interchangeable bindings sit beneath an [`RpcEngine`]:
//! - SocketTransport: a bidirectional text socket (signaling relay)
//! - PeerTransport: a peer data channel
//! - FallbackTransport: a whole session tunnelled through another engine's
//!   `fallback` calls
//!
//! Socket and peer transports queue outgoing text until their medium reports
//! ready, flush the queue once in FIFO order, then pass text straight
//! through.
//!
//! [`RpcEngine`]: crate::engine::RpcEngine

mod fallback;
mod peer;
mod queue;
mod socket;

use std::io;

pub use fallback::FallbackTransport;
pub use peer::{PeerConnection, PeerEvent, PeerSignal, PeerTransport};
pub use queue::OutboundQueue;
pub use socket::{SocketTransport, TextSocket};

/// Where an engine writes its encoded messages.
pub trait MessageSink: Send + Sync {
    /// Deliver one complete wire message.
    fn send_text(&self, text: String) -> Result<(), TransportError>;
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("Transport detached")]
    Detached,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Tunnel error: {0}")]
    Tunnel(String),
}
