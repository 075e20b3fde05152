//! Visual (QR) Channel
//!
//! An air-gapped transport: outgoing messages are rendered as QR codes,
//! incoming messages are read from a camera. Each message is one frame in
//! the Reduced wire form (`method|id|json`, `|id|json`), falling back to
//! Full only for notifications and errors.

mod display;
mod frames;
mod reader;

pub use display::QrDisplay;
pub use frames::QrFrameSet;
pub use reader::{PollHandle, QrReader, QrScanner};

use std::sync::Arc;

use coldwire_protocol::{MessageId, WireForm};
use serde_json::Value;

use crate::config::QrConfig;
use crate::engine::{EngineError, PendingCall, RequestHandler, RpcEngine};

/// One device's end of a camera-to-screen link.
pub struct QrChannel {
    config: QrConfig,
    engine: Arc<RpcEngine>,
    display: Arc<QrDisplay>,
    reader: Arc<QrReader>,
}

impl QrChannel {
    pub fn new(config: QrConfig) -> Self {
        let display = Arc::new(QrDisplay::new(config.cycle_interval, config.max_frames));
        let engine = Arc::new(RpcEngine::new(display.clone(), WireForm::Reduced));
        let reader = Arc::new(QrReader::with_display(Arc::clone(&engine), display.clone()));
        Self {
            config,
            engine,
            display,
            reader,
        }
    }

    pub fn engine(&self) -> &Arc<RpcEngine> {
        &self.engine
    }

    pub fn display(&self) -> &Arc<QrDisplay> {
        &self.display
    }

    pub fn reader(&self) -> &Arc<QrReader> {
        &self.reader
    }

    pub fn set_handler(&self, handler: Arc<dyn RequestHandler>) {
        self.engine.set_handler(handler);
    }

    /// Display a call with an engine-assigned id.
    pub fn call(&self, method: &str, params: Value) -> Result<PendingCall, EngineError> {
        self.engine.call(method, params)
    }

    /// Display a call with a caller-chosen id, so the other device's
    /// operator can tell which response belongs to which request.
    pub fn call_with_id(
        &self,
        method: &str,
        params: Value,
        id: impl Into<MessageId>,
    ) -> Result<PendingCall, EngineError> {
        self.engine.call_raw(method, params, WireForm::Reduced, Some(id.into()))
    }

    pub fn notify(&self, method: &str, params: Value) -> Result<(), EngineError> {
        self.engine.notify(method, params)
    }

    /// Feed one scanned text. Every scan reaches the engine; use
    /// [`QrChannel::start_reader`] for a camera that keeps a frame in view.
    pub fn on_scan(&self, text: &str) -> bool {
        self.reader.on_scan(text)
    }

    /// Start sampling `scanner` at the configured poll interval.
    pub fn start_reader<S>(&self, scanner: S) -> std::io::Result<PollHandle>
    where
        S: QrScanner + 'static,
    {
        self.reader.spawn_polling(self.config.poll_interval, scanner)
    }
}
