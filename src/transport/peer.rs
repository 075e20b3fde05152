//! Peer-channel transport
//!
//! Same queue/flush discipline as the socket transport, over a peer data
//! channel negotiated by the handshake session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use coldwire_protocol::WireForm;
use serde_json::Value;
use tracing::debug;

use crate::engine::RpcEngine;

use super::{OutboundQueue, TransportError};

/// Signaling data exchanged with the peer-connection library.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerSignal {
    /// SDP offer.
    Offer(String),
    /// SDP answer.
    Answer(String),
    /// ICE candidate, opaque to coldwire.
    Candidate(Value),
}

/// Events raised by the peer-connection library.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// Locally generated signaling data to relay to the other side.
    Signal(PeerSignal),
    /// The data channel is open.
    Connect,
    /// One text message on the data channel.
    Data(String),
    /// The data channel closed.
    Close,
}

/// Opaque peer connection supplied by the embedding application.
pub trait PeerConnection: Send + Sync {
    /// Apply signaling data received from the remote side.
    fn signal(&self, remote: PeerSignal) -> Result<(), TransportError>;

    /// Write one text message on the data channel.
    fn send(&self, text: &str) -> Result<(), TransportError>;

    /// Tear the connection down.
    fn destroy(&self);
}

/// RPC engine over a [`PeerConnection`] data channel.
pub struct PeerTransport {
    peer: Arc<dyn PeerConnection>,
    outbound: Arc<OutboundQueue>,
    engine: Arc<RpcEngine>,
    detached: AtomicBool,
}

impl PeerTransport {
    pub fn new(peer: Arc<dyn PeerConnection>) -> Self {
        let medium = Arc::clone(&peer);
        let outbound = Arc::new(OutboundQueue::new(move |text: &str| medium.send(text)));
        let engine = Arc::new(RpcEngine::new(outbound.clone(), WireForm::Full));
        Self {
            peer,
            outbound,
            engine,
            detached: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> &Arc<RpcEngine> {
        &self.engine
    }

    pub fn peer(&self) -> &Arc<dyn PeerConnection> {
        &self.peer
    }

    /// Data channel reported open.
    pub fn on_connect(&self) {
        if self.is_detached() {
            debug!("ignoring connect on detached peer transport");
            return;
        }
        self.outbound.on_ready();
    }

    /// Inbound data-channel text.
    pub fn on_data(&self, text: &str) {
        if self.is_detached() {
            debug!("ignoring data on detached peer transport");
            return;
        }
        self.engine.on_message(text);
    }

    pub fn is_connected(&self) -> bool {
        self.outbound.is_connected()
    }

    /// Stop listening: later events are ignored and sends refused. Queued
    /// messages are dropped and calls still waiting on this channel are
    /// abandoned.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
        self.outbound.close();
        let abandoned = self.engine.abandon_pending();
        if abandoned > 0 {
            debug!(abandoned, "peer transport detached with calls in flight");
        }
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }
}
