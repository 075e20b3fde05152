//! Transport-agnostic RPC Engine
//!
//! Correlates outgoing calls with incoming responses by message id and
//! dispatches incoming calls to a request handler. The engine knows nothing
//! about the medium underneath: it hands encoded text to the
//! [`MessageSink`] injected at construction and is fed inbound text through
//! [`RpcEngine::on_message`].
//!
//! Pending calls are single-shot: the first Result or Error with a matching
//! id resolves the call and removes it from the table. Any later message
//! with the same id is discarded, which makes repeated delivery (a QR frame
//! scanned twice) harmless.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use coldwire_protocol::{encode, try_decode, MessageId, RpcMessage, WireForm};
use serde_json::Value;
use tracing::{debug, warn};

use crate::sync::lock;
use crate::transport::{MessageSink, TransportError};

/// Outcome of a call: `Ok(result)` or `Err(error payload)`.
pub type CallOutcome = Result<Value, Value>;

type Resolver = Box<dyn FnOnce(CallOutcome) + Send>;

/// Engine errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Call id {0} is already pending")]
    DuplicateId(MessageId),
}

/// Errors observed by a caller waiting on a [`PendingCall`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    /// The peer answered with an error payload.
    #[error("Remote error: {0}")]
    Remote(Value),

    /// No response within the caller's deadline. The call stays pending.
    #[error("No response within {0:?}")]
    Timeout(Duration),

    /// The engine went away (or the call was forgotten) before a response.
    #[error("Call abandoned before a response arrived")]
    Abandoned,
}

/// An incoming call or notification.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingRequest {
    pub method: String,
    /// `None` for notifications.
    pub id: Option<MessageId>,
    pub params: Value,
}

impl IncomingRequest {
    /// Returns true if no response is expected.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Single-shot reply channel handed to a request handler.
///
/// Replies are written in the wire form the engine was configured with.
/// Replying to a notification is a no-op.
pub struct Responder {
    id: Option<MessageId>,
    method: String,
    form: WireForm,
    sink: Arc<dyn MessageSink>,
}

impl Responder {
    /// Send a Result (`Ok`) or Error (`Err`) back to the caller.
    pub fn respond(self, outcome: CallOutcome) -> Result<(), TransportError> {
        let Some(id) = self.id else {
            debug!(method = %self.method, "dropping reply to notification");
            return Ok(());
        };
        let msg = match outcome {
            Ok(result) => RpcMessage::Result { id, result },
            Err(error) => RpcMessage::Error { id, error },
        };
        self.sink.send_text(encode(&msg, self.form))
    }

    /// Reply with a result.
    pub fn ok(self, result: Value) -> Result<(), TransportError> {
        self.respond(Ok(result))
    }

    /// Reply with an error payload.
    pub fn err(self, error: Value) -> Result<(), TransportError> {
        self.respond(Err(error))
    }

    /// Id of the call being answered.
    pub fn id(&self) -> Option<&MessageId> {
        self.id.as_ref()
    }
}

/// Receives calls and notifications decoded by an engine.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, request: IncomingRequest, responder: Responder);
}

impl<F> RequestHandler for F
where
    F: Fn(IncomingRequest, Responder) + Send + Sync,
{
    fn handle(&self, request: IncomingRequest, responder: Responder) {
        self(request, responder)
    }
}

/// Handle to a call awaiting its response.
pub struct PendingCall {
    id: MessageId,
    rx: mpsc::Receiver<CallOutcome>,
}

impl PendingCall {
    /// Id the call was sent with.
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// Block until the response arrives.
    pub fn wait(self) -> Result<Value, CallError> {
        match self.rx.recv() {
            Ok(outcome) => outcome.map_err(CallError::Remote),
            Err(_) => Err(CallError::Abandoned),
        }
    }

    /// Block for at most `timeout`. On timeout the call remains pending and
    /// may be waited on again.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Value, CallError> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => outcome.map_err(CallError::Remote),
            Err(RecvTimeoutError::Timeout) => Err(CallError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(CallError::Abandoned),
        }
    }

    /// Non-blocking check; `None` while still pending.
    pub fn try_result(&self) -> Option<Result<Value, CallError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome.map_err(CallError::Remote)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(CallError::Abandoned)),
        }
    }
}

/// JSON-RPC engine bound to one transport.
pub struct RpcEngine {
    sink: Arc<dyn MessageSink>,
    form: WireForm,
    next_id: AtomicU64,
    pending: Mutex<HashMap<MessageId, Resolver>>,
    handler: RwLock<Option<Arc<dyn RequestHandler>>>,
}

impl RpcEngine {
    /// Create an engine that writes through `sink` using `form` for calls
    /// and replies.
    pub fn new(sink: Arc<dyn MessageSink>, form: WireForm) -> Self {
        Self {
            sink,
            form,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            handler: RwLock::new(None),
        }
    }

    /// Wire form used for calls issued with [`RpcEngine::call`] and for replies.
    pub fn form(&self) -> WireForm {
        self.form
    }

    /// Install the handler for incoming calls and notifications.
    pub fn set_handler(&self, handler: Arc<dyn RequestHandler>) {
        let mut slot = self.handler.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(handler);
    }

    /// Number of calls still awaiting a response.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Issue a call with an engine-assigned id.
    pub fn call(&self, method: &str, params: Value) -> Result<PendingCall, EngineError> {
        self.call_raw(method, params, self.form, None)
    }

    /// Issue a call with an explicit wire form and, optionally, a
    /// caller-chosen id.
    pub fn call_raw(
        &self,
        method: &str,
        params: Value,
        form: WireForm,
        explicit_id: Option<MessageId>,
    ) -> Result<PendingCall, EngineError> {
        let (tx, rx) = mpsc::channel();
        let id = self.issue(
            method,
            params,
            form,
            explicit_id,
            Box::new(move |outcome| {
                // The caller may have dropped its handle; nothing to do then.
                let _ = tx.send(outcome);
            }),
        )?;
        Ok(PendingCall { id, rx })
    }

    /// Issue a call whose outcome is delivered to `on_outcome` exactly once.
    pub fn call_with<F>(&self, method: &str, params: Value, on_outcome: F) -> Result<MessageId, EngineError>
    where
        F: FnOnce(CallOutcome) + Send + 'static,
    {
        self.issue(method, params, self.form, None, Box::new(on_outcome))
    }

    /// Fire-and-forget notification.
    pub fn notify(&self, method: &str, params: Value) -> Result<(), EngineError> {
        let msg = RpcMessage::notification(method, params);
        self.sink.send_text(encode(&msg, self.form))?;
        Ok(())
    }

    /// Drop a pending call without waiting for its response. Returns false
    /// if the id was not pending.
    pub fn forget(&self, id: &MessageId) -> bool {
        lock(&self.pending).remove(id).is_some()
    }

    /// Drop every pending call. Waiters see [`CallError::Abandoned`];
    /// callbacks registered with [`RpcEngine::call_with`] are dropped
    /// without running. Returns how many calls were abandoned.
    pub fn abandon_pending(&self) -> usize {
        let abandoned: Vec<Resolver> = lock(&self.pending).drain().map(|(_, resolve)| resolve).collect();
        if !abandoned.is_empty() {
            debug!(count = abandoned.len(), "abandoning pending calls");
        }
        abandoned.len()
    }

    fn issue(
        &self,
        method: &str,
        params: Value,
        form: WireForm,
        explicit_id: Option<MessageId>,
        resolver: Resolver,
    ) -> Result<MessageId, EngineError> {
        let id = explicit_id
            .unwrap_or_else(|| MessageId::Number(self.next_id.fetch_add(1, Ordering::SeqCst)));

        {
            let mut pending = lock(&self.pending);
            if pending.contains_key(&id) {
                return Err(EngineError::DuplicateId(id));
            }
            // Registered before sending: a synchronous medium may deliver the
            // response before send_text returns.
            pending.insert(id.clone(), resolver);
        }

        let msg = RpcMessage::Call {
            method: method.to_string(),
            id: id.clone(),
            params,
        };
        if let Err(e) = self.sink.send_text(encode(&msg, form)) {
            lock(&self.pending).remove(&id);
            return Err(e.into());
        }
        debug!(%id, method, "call issued");
        Ok(id)
    }

    /// Feed one piece of inbound wire text. Garbled text is logged and
    /// dropped; nothing is ever raised back into the transport.
    pub fn on_message(&self, text: &str) {
        match try_decode(text) {
            Ok(msg) => self.dispatch(msg),
            Err(e) => debug!(error = %e, len = text.len(), "dropping undecodable message"),
        }
    }

    /// Route an already-decoded message.
    pub fn dispatch(&self, msg: RpcMessage) {
        match msg {
            RpcMessage::Call { method, id, params } => {
                self.deliver_request(IncomingRequest {
                    method,
                    id: Some(id),
                    params,
                });
            }
            RpcMessage::Notification { method, params } => {
                self.deliver_request(IncomingRequest {
                    method,
                    id: None,
                    params,
                });
            }
            RpcMessage::Result { id, result } => self.resolve(id, Ok(result)),
            RpcMessage::Error { id, error } => self.resolve(id, Err(error)),
        }
    }

    fn deliver_request(&self, request: IncomingRequest) {
        let handler = self
            .handler
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let Some(handler) = handler else {
            warn!(method = %request.method, "no request handler installed, dropping request");
            return;
        };
        let responder = Responder {
            id: request.id.clone(),
            method: request.method.clone(),
            form: self.form,
            sink: Arc::clone(&self.sink),
        };
        handler.handle(request, responder);
    }

    fn resolve(&self, id: MessageId, outcome: CallOutcome) {
        let resolver = lock(&self.pending).remove(&id);
        match resolver {
            Some(resolve) => {
                debug!(%id, ok = outcome.is_ok(), "call resolved");
                resolve(outcome);
            }
            None => debug!(%id, "discarding response with no pending call"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<String>>,
    }

    impl MessageSink for RecordingSink {
        fn send_text(&self, text: String) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(text);
            Ok(())
        }
    }

    struct FailingSink;

    impl MessageSink for FailingSink {
        fn send_text(&self, _text: String) -> Result<(), TransportError> {
            Err(TransportError::Closed)
        }
    }

    fn engine(form: WireForm) -> (Arc<RecordingSink>, RpcEngine) {
        let sink = Arc::new(RecordingSink::default());
        let engine = RpcEngine::new(sink.clone(), form);
        (sink, engine)
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let (sink, engine) = engine(WireForm::Full);
        let a = engine.call("a", json!([])).unwrap();
        let b = engine.call("b", json!([])).unwrap();
        assert_eq!(a.id(), &MessageId::Number(1));
        assert_eq!(b.id(), &MessageId::Number(2));
        assert_eq!(sink.sent.lock().unwrap().len(), 2);
        assert_eq!(engine.pending_count(), 2);
    }

    #[test]
    fn test_call_resolves_with_result() {
        let (_sink, engine) = engine(WireForm::Full);
        let call = engine.call("getWalletList", json!({})).unwrap();
        engine.on_message(r#"{"id":1,"result":["w1"],"jsonrpc":"2.0"}"#);
        assert_eq!(call.wait().unwrap(), json!(["w1"]));
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn test_call_rejects_with_remote_error() {
        let (_sink, engine) = engine(WireForm::Full);
        let call = engine.call("sign", json!({})).unwrap();
        engine.on_message(r#"{"id":1,"error":{"message":"user declined"},"jsonrpc":"2.0"}"#);
        assert_eq!(
            call.wait(),
            Err(CallError::Remote(json!({"message": "user declined"})))
        );
    }

    #[test]
    fn test_duplicate_response_resolves_once() {
        let (_sink, engine) = engine(WireForm::Reduced);
        let resolved = Arc::new(Mutex::new(Vec::new()));
        let seen = resolved.clone();
        engine
            .call_with("sign", json!([]), move |outcome| seen.lock().unwrap().push(outcome))
            .unwrap();

        engine.on_message(r#"|1|"0xsig""#);
        engine.on_message(r#"|1|"0xsig""#);

        assert_eq!(*resolved.lock().unwrap(), vec![Ok(json!("0xsig"))]);
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn test_explicit_id_is_used_and_guarded() {
        let (sink, engine) = engine(WireForm::Reduced);
        let call = engine
            .call_raw("getWalletList", json!({"blockchains": ["eth"]}), WireForm::Reduced, Some(MessageId::Number(2)))
            .unwrap();
        assert_eq!(call.id(), &MessageId::Number(2));
        assert_eq!(
            sink.sent.lock().unwrap()[0],
            r#"getWalletList|2|{"blockchains":["eth"]}"#
        );

        let again = engine.call_raw("x", json!([]), WireForm::Reduced, Some(MessageId::Number(2)));
        assert!(matches!(again, Err(EngineError::DuplicateId(_))));
    }

    #[test]
    fn test_unmatched_and_garbled_messages_are_ignored() {
        let (sink, engine) = engine(WireForm::Full);
        engine.on_message(r#"{"id":77,"result":1,"jsonrpc":"2.0"}"#);
        engine.on_message("garbage");
        engine.on_message(r#"sign|1|{"trunc"#);
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_handler_replies_in_engine_form() {
        let (sink, engine) = engine(WireForm::Reduced);
        engine.set_handler(Arc::new(|request: IncomingRequest, responder: Responder| {
            assert_eq!(request.method, "getWalletList");
            responder.ok(json!([{"name": "main"}])).unwrap();
        }));
        engine.on_message(r#"getWalletList|2|{"blockchains":["eth"]}"#);
        assert_eq!(sink.sent.lock().unwrap()[0], r#"|2|[{"name":"main"}]"#);
    }

    #[test]
    fn test_error_reply_falls_back_to_full_form() {
        let (sink, engine) = engine(WireForm::Reduced);
        engine.set_handler(Arc::new(|_req: IncomingRequest, responder: Responder| {
            responder.err(json!("locked")).unwrap();
        }));
        engine.on_message("sign|abc|[]");
        let reply = coldwire_protocol::decode(&sink.sent.lock().unwrap()[0]).unwrap();
        assert_eq!(reply, RpcMessage::error("abc", json!("locked")));
    }

    #[test]
    fn test_notification_has_no_id_and_no_reply() {
        let (sink, engine) = engine(WireForm::Full);
        let notified = Arc::new(Mutex::new(None));
        let slot = notified.clone();
        engine.set_handler(Arc::new(move |request: IncomingRequest, responder: Responder| {
            *slot.lock().unwrap() = Some(request.is_notification());
            responder.ok(json!(true)).unwrap();
        }));

        engine.notify("ice", json!({"candidate": "c"})).unwrap();
        assert_eq!(engine.pending_count(), 0);

        let sent = sink.sent.lock().unwrap()[0].clone();
        engine.on_message(&sent);
        assert_eq!(*notified.lock().unwrap(), Some(true));
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_send_failure_unregisters_call() {
        let engine = RpcEngine::new(Arc::new(FailingSink), WireForm::Full);
        let result = engine.call("sign", json!([]));
        assert!(matches!(result, Err(EngineError::Transport(TransportError::Closed))));
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn test_wait_timeout_leaves_call_pending() {
        let (_sink, engine) = engine(WireForm::Full);
        let call = engine.call("slow", json!([])).unwrap();
        assert_eq!(
            call.wait_timeout(Duration::from_millis(5)),
            Err(CallError::Timeout(Duration::from_millis(5)))
        );
        assert!(call.try_result().is_none());
        engine.on_message(r#"{"id":1,"result":"late","jsonrpc":"2.0"}"#);
        assert_eq!(call.try_result(), Some(Ok(json!("late"))));
    }

    #[test]
    fn test_abandon_pending_releases_waiters() {
        let (_sink, engine) = engine(WireForm::Full);
        let first = engine.call("sign", json!([])).unwrap();
        let second = engine.call("sign", json!([])).unwrap();

        assert_eq!(engine.abandon_pending(), 2);
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(first.wait_timeout(Duration::from_secs(1)), Err(CallError::Abandoned));
        assert_eq!(second.wait(), Err(CallError::Abandoned));

        engine.on_message(r#"{"id":1,"result":"late","jsonrpc":"2.0"}"#);
        assert_eq!(engine.abandon_pending(), 0);
    }

    #[test]
    fn test_forget_abandons_call() {
        let (_sink, engine) = engine(WireForm::Full);
        let call = engine.call("slow", json!([])).unwrap();
        assert!(engine.forget(call.id()));
        assert_eq!(call.wait(), Err(CallError::Abandoned));
    }
}
