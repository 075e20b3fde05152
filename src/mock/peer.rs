//! Scriptable peer connection.

use std::sync::{Arc, Mutex};

use crate::sync::lock;
use crate::transport::{PeerConnection, PeerSignal, TransportError};

type Forward = Arc<dyn Fn(&str) + Send + Sync>;

/// Peer connection that never negotiates anything by itself. Tests drive
/// its events through [`HandshakeSession::on_peer_event`] and inspect what
/// the session asked of it.
///
/// [`HandshakeSession::on_peer_event`]: crate::session::HandshakeSession::on_peer_event
#[derive(Default)]
pub struct MockPeer {
    signals: Mutex<Vec<PeerSignal>>,
    sent: Mutex<Vec<String>>,
    destroyed: Mutex<bool>,
    forward: Mutex<Option<Forward>>,
}

impl MockPeer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver later data-channel writes to `far_end`.
    pub fn connect_to<F>(&self, far_end: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *lock(&self.forward) = Some(Arc::new(far_end));
    }

    /// Remote signaling data applied so far.
    pub fn signals(&self) -> Vec<PeerSignal> {
        lock(&self.signals).clone()
    }

    /// Data-channel writes so far.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }

    pub fn is_destroyed(&self) -> bool {
        *lock(&self.destroyed)
    }
}

impl PeerConnection for MockPeer {
    fn signal(&self, remote: PeerSignal) -> Result<(), TransportError> {
        if self.is_destroyed() {
            return Err(TransportError::Closed);
        }
        lock(&self.signals).push(remote);
        Ok(())
    }

    fn send(&self, text: &str) -> Result<(), TransportError> {
        if self.is_destroyed() {
            return Err(TransportError::Closed);
        }
        lock(&self.sent).push(text.to_string());
        let forward = lock(&self.forward).clone();
        if let Some(far_end) = forward {
            far_end(text);
        }
        Ok(())
    }

    fn destroy(&self) {
        *lock(&self.destroyed) = true;
    }
}
