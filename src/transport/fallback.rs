//! Fallback transport
//!
//! Tunnels an entire RPC session through an already-working engine: every
//! outgoing message becomes the `msg` argument of a `fallback` call on the
//! wrapped engine, and every inbound `fallback` call on the wrapped engine
//! is fed back into this transport's own engine.

use std::sync::Arc;

use coldwire_protocol::ops::{names, FallbackParams};
use coldwire_protocol::WireForm;
use serde_json::{json, Value};
use tracing::debug;

use crate::engine::{CallOutcome, EngineError, RpcEngine};

use super::{MessageSink, TransportError};

struct TunnelSink {
    wrapped: Arc<RpcEngine>,
}

impl MessageSink for TunnelSink {
    fn send_text(&self, text: String) -> Result<(), TransportError> {
        let envelope = self
            .wrapped
            .call_raw(names::FALLBACK, json!({ "msg": text }), WireForm::Full, None)
            .map_err(|e| match e {
                EngineError::Transport(inner) => inner,
                other => TransportError::Tunnel(other.to_string()),
            })?;
        // Acks carry nothing; the tunnelled engine correlates its own replies.
        self.wrapped.forget(envelope.id());
        Ok(())
    }
}

/// RPC engine tunnelled through another engine's `fallback` calls.
pub struct FallbackTransport {
    wrapped: Arc<RpcEngine>,
    engine: Arc<RpcEngine>,
}

impl FallbackTransport {
    /// Wrap an engine whose transport is already connected.
    pub fn new(wrapped: Arc<RpcEngine>) -> Self {
        let sink = Arc::new(TunnelSink {
            wrapped: Arc::clone(&wrapped),
        });
        let engine = Arc::new(RpcEngine::new(sink, WireForm::Full));
        Self { wrapped, engine }
    }

    /// The tunnelled engine.
    pub fn engine(&self) -> &Arc<RpcEngine> {
        &self.engine
    }

    /// The engine carrying the tunnel.
    pub fn wrapped(&self) -> &Arc<RpcEngine> {
        &self.wrapped
    }

    /// Unwrap the params of an inbound `fallback` call and feed the message
    /// to the tunnelled engine.
    pub fn accept(&self, params: Value) -> CallOutcome {
        match serde_json::from_value::<FallbackParams>(params) {
            Ok(FallbackParams { msg }) => {
                self.engine.on_message(&msg);
                Ok(json!(true))
            }
            Err(e) => {
                debug!(error = %e, "malformed fallback envelope");
                Err(json!({ "message": format!("malformed fallback envelope: {}", e) }))
            }
        }
    }
}
