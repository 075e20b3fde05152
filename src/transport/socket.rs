//! Socket transport
//!
//! Binds an engine to a bidirectional text-message socket, typically the
//! connection to the signaling relay.

use std::sync::Arc;

use coldwire_protocol::WireForm;

use crate::engine::RpcEngine;

use super::{OutboundQueue, TransportError};

/// A bidirectional text-message socket supplied by the embedding
/// application (a WebSocket client, an in-memory pipe in tests).
///
/// Socket events are delivered to [`SocketTransport::on_open`] and
/// [`SocketTransport::on_message`].
pub trait TextSocket: Send + Sync {
    /// Write one text message.
    fn send(&self, text: &str) -> Result<(), TransportError>;

    /// Close the socket. Further sends may fail.
    fn close(&self);
}

/// RPC engine over a [`TextSocket`].
pub struct SocketTransport {
    socket: Arc<dyn TextSocket>,
    outbound: Arc<OutboundQueue>,
    engine: Arc<RpcEngine>,
}

impl SocketTransport {
    /// Create a transport speaking the Full wire form.
    pub fn new(socket: Arc<dyn TextSocket>) -> Self {
        Self::with_form(socket, WireForm::Full)
    }

    /// Create a transport whose engine uses `form`.
    pub fn with_form(socket: Arc<dyn TextSocket>, form: WireForm) -> Self {
        let medium = Arc::clone(&socket);
        let outbound = Arc::new(OutboundQueue::new(move |text: &str| medium.send(text)));
        let engine = Arc::new(RpcEngine::new(outbound.clone(), form));
        Self {
            socket,
            outbound,
            engine,
        }
    }

    /// The engine bound to this socket.
    pub fn engine(&self) -> &Arc<RpcEngine> {
        &self.engine
    }

    /// Socket reported open.
    pub fn on_open(&self) {
        self.outbound.on_ready();
    }

    /// Inbound text from the socket.
    pub fn on_message(&self, text: &str) {
        self.engine.on_message(text);
    }

    /// Returns true once the socket is open and the queue flushed.
    pub fn is_connected(&self) -> bool {
        self.outbound.is_connected()
    }

    /// Close the socket and refuse further sends.
    pub fn close(&self) {
        self.outbound.close();
        self.socket.close();
    }
}
