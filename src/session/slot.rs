//! Holder for the current handshake session.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::sync::lock;

use super::HandshakeSession;

/// Owns at most one live [`HandshakeSession`]. Installing a new session
/// aborts the previous one.
#[derive(Default)]
pub struct SessionSlot {
    current: Mutex<Option<Arc<HandshakeSession>>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current session, aborting the one it displaces.
    pub fn install(&self, session: Arc<HandshakeSession>) {
        let previous = lock(&self.current).replace(session);
        if let Some(previous) = previous {
            debug!(role = %previous.role(), "replacing handshake session");
            previous.abort();
        }
    }

    pub fn current(&self) -> Option<Arc<HandshakeSession>> {
        lock(&self.current).clone()
    }

    /// Abort and drop the current session, if any.
    pub fn reset(&self) {
        let previous = lock(&self.current).take();
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}
