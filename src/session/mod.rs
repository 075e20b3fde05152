//! Handshake Session
//!
//! Drives the negotiation of a direct peer channel through the signaling
//! relay, and the cutover to a tunnelled fallback when the peer channel
//! does not connect in time.
//!
//! ```text
//! Initiator                      relay                      Responder
//!   offer({sdp})  ───────────────▶  ◀─────────────── join({sid})
//!   ◀─ {sid}  (SessionId event)       {offer} ─────────────▶
//!   ◀──────────── answer({sdp}) ◀─── answer({sid, sdp})
//!   ice ◀─────────────────────────────────────────────▶ ice
//! ```
//!
//! From `ExchangingIce` two transitions compete: the peer channel
//! connecting, or the fallback deadline passing. Whichever takes the
//! session lock first wins; the other is ignored.

mod slot;
mod state;

pub use slot::SessionSlot;
pub use state::{HandshakeState, Role, SessionError, SessionEvent, TransportKind};

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use coldwire_protocol::ops::{
    names, AnswerParams, IceParams, JoinParams, JoinResult, OfferParams, OfferResult, RelayedAnswer,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::HandshakeConfig;
use crate::engine::{CallOutcome, IncomingRequest, PendingCall, RequestHandler, Responder, RpcEngine};
use crate::sync::lock;
use crate::transport::{
    FallbackTransport, PeerConnection, PeerEvent, PeerSignal, PeerTransport, SocketTransport, TextSocket,
};

struct Inner {
    state: HandshakeState,
    /// Signaling is over: the peer connected or the session was aborted.
    terminated: bool,
    aborted: bool,
    sid: Option<String>,
    /// Local candidates produced before `ExchangingIce`.
    pending_candidates: Vec<Value>,
    fallback: Option<Arc<FallbackTransport>>,
    active: Option<TransportKind>,
    handler: Option<Arc<dyn RequestHandler>>,
    timer_armed: bool,
}

/// One handshake, from signaling socket creation to a usable transport.
///
/// Events from the outside world are fed in through
/// [`on_signaling_open`](Self::on_signaling_open),
/// [`on_signaling_message`](Self::on_signaling_message) and
/// [`on_peer_event`](Self::on_peer_event). Progress is reported as
/// [`SessionEvent`]s on the receiver returned at construction.
pub struct HandshakeSession {
    role: Role,
    this: Weak<HandshakeSession>,
    config: HandshakeConfig,
    signaling: SocketTransport,
    peer: PeerTransport,
    events: Sender<SessionEvent>,
    inner: Mutex<Inner>,
}

struct SignalingHandler {
    session: Weak<HandshakeSession>,
}

impl RequestHandler for SignalingHandler {
    fn handle(&self, request: IncomingRequest, responder: Responder) {
        match self.session.upgrade() {
            Some(session) => session.on_signaling_request(request, responder),
            None => reply(responder, Err(json!({ "message": "session closed" }))),
        }
    }
}

impl HandshakeSession {
    /// Start a session that will publish the local offer.
    ///
    /// The offer goes out once the peer library produces it (see
    /// [`PeerEvent::Signal`]); it stays queued until the signaling socket
    /// opens.
    pub fn initiator(
        socket: Arc<dyn TextSocket>,
        peer: Arc<dyn PeerConnection>,
        config: HandshakeConfig,
    ) -> (Arc<Self>, Receiver<SessionEvent>) {
        Self::create(Role::Initiator, None, socket, peer, config)
    }

    /// Start a session that joins `sid`. The `join` call is issued
    /// immediately and queued until the signaling socket opens.
    pub fn responder(
        sid: impl Into<String>,
        socket: Arc<dyn TextSocket>,
        peer: Arc<dyn PeerConnection>,
        config: HandshakeConfig,
    ) -> Result<(Arc<Self>, Receiver<SessionEvent>), SessionError> {
        let sid = sid.into();
        let (session, events) = Self::create(Role::Responder, Some(sid.clone()), socket, peer, config);

        let params = to_params(names::JOIN, &JoinParams { sid })?;
        let weak = Arc::downgrade(&session);
        session.signaling.engine().call_with(names::JOIN, params, move |outcome| {
            if let Some(session) = weak.upgrade() {
                session.on_join_result(outcome);
            }
        })?;
        Ok((session, events))
    }

    fn create(
        role: Role,
        sid: Option<String>,
        socket: Arc<dyn TextSocket>,
        peer: Arc<dyn PeerConnection>,
        config: HandshakeConfig,
    ) -> (Arc<Self>, Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel();
        let session = Arc::new_cyclic(|this: &Weak<Self>| {
            let signaling = SocketTransport::new(socket);
            signaling
                .engine()
                .set_handler(Arc::new(SignalingHandler { session: this.clone() }));
            Self {
                role,
                this: this.clone(),
                config,
                signaling,
                peer: PeerTransport::new(peer),
                events: tx,
                inner: Mutex::new(Inner {
                    state: HandshakeState::ConnectingHandshake,
                    terminated: false,
                    aborted: false,
                    sid,
                    pending_candidates: Vec::new(),
                    fallback: None,
                    active: None,
                    handler: None,
                    timer_armed: false,
                }),
            }
        });
        info!(%role, "handshake session created");
        (session, rx)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> HandshakeState {
        lock(&self.inner).state
    }

    /// Session id: allocated by the relay (initiator) or given (responder).
    pub fn sid(&self) -> Option<String> {
        lock(&self.inner).sid.clone()
    }

    /// Transport application calls currently travel on, once connected.
    pub fn active_transport(&self) -> Option<TransportKind> {
        lock(&self.inner).active
    }

    /// Returns true once signaling is finished.
    pub fn is_terminated(&self) -> bool {
        lock(&self.inner).terminated
    }

    pub fn fallback_transport(&self) -> Option<Arc<FallbackTransport>> {
        lock(&self.inner).fallback.clone()
    }

    pub fn peer_transport(&self) -> &PeerTransport {
        &self.peer
    }

    pub fn signaling(&self) -> &SocketTransport {
        &self.signaling
    }

    /// Signaling socket reported open.
    pub fn on_signaling_open(&self) {
        self.signaling.on_open();
    }

    /// Inbound text from the signaling socket.
    pub fn on_signaling_message(&self, text: &str) {
        self.signaling.on_message(text);
    }

    /// Event from the peer-connection library.
    pub fn on_peer_event(&self, event: PeerEvent) {
        match event {
            PeerEvent::Signal(PeerSignal::Offer(sdp)) => self.send_offer(sdp),
            PeerEvent::Signal(PeerSignal::Answer(sdp)) => self.send_answer(sdp),
            PeerEvent::Signal(PeerSignal::Candidate(candidate)) => self.on_local_candidate(candidate),
            PeerEvent::Connect => self.on_peer_connect(),
            PeerEvent::Data(text) => self.peer.on_data(&text),
            PeerEvent::Close => info!(role = %self.role, "peer channel closed"),
        }
    }

    /// Install the handler for application calls. Applies to the peer
    /// channel and to a fallback transport, including one adopted later.
    pub fn set_request_handler(&self, handler: Arc<dyn RequestHandler>) {
        let fallback = {
            let mut inner = lock(&self.inner);
            inner.handler = Some(Arc::clone(&handler));
            inner.fallback.clone()
        };
        self.peer.engine().set_handler(Arc::clone(&handler));
        if let Some(fallback) = fallback {
            fallback.engine().set_handler(handler);
        }
    }

    /// Engine for application traffic: the fallback engine once adopted,
    /// the peer engine otherwise (queued until the channel connects).
    pub fn engine(&self) -> Result<Arc<RpcEngine>, SessionError> {
        let inner = lock(&self.inner);
        if inner.aborted {
            return Err(SessionError::Aborted);
        }
        match (inner.active, &inner.fallback) {
            (Some(TransportKind::Fallback), Some(fallback)) => Ok(Arc::clone(fallback.engine())),
            _ => Ok(Arc::clone(self.peer.engine())),
        }
    }

    /// Issue an application call on the active transport.
    pub fn call(&self, method: &str, params: Value) -> Result<PendingCall, SessionError> {
        Ok(self.engine()?.call(method, params)?)
    }

    /// Send an application notification on the active transport.
    pub fn notify(&self, method: &str, params: Value) -> Result<(), SessionError> {
        Ok(self.engine()?.notify(method, params)?)
    }

    /// Pass the fallback deadline now. Used when the session was built
    /// with [`HandshakeConfig::manual`].
    pub fn fire_fallback_deadline(&self) {
        self.on_fallback_deadline();
    }

    /// Tear everything down: signaling socket, peer connection and any
    /// fallback tunnel. Later calls fail with [`SessionError::Aborted`].
    pub fn abort(&self) {
        let was_terminated = {
            let mut inner = lock(&self.inner);
            if inner.aborted {
                return;
            }
            inner.aborted = true;
            inner.pending_candidates.clear();
            std::mem::replace(&mut inner.terminated, true)
        };
        info!(role = %self.role, "handshake session aborted");
        self.signaling.close();
        self.peer.detach();
        self.peer.peer().destroy();
        if !was_terminated {
            self.emit(SessionEvent::Terminated);
        }
    }

    fn send_offer(&self, sdp: String) {
        if self.role != Role::Initiator {
            warn!(role = %self.role, "ignoring local offer on responder");
            return;
        }
        let weak = self.this.clone();
        let sent = to_params(names::OFFER, &OfferParams { sdp }).and_then(|params| {
            self.signaling
                .engine()
                .call_with(names::OFFER, params, move |outcome| {
                    if let Some(session) = weak.upgrade() {
                        session.on_offer_result(outcome);
                    }
                })
                .map_err(SessionError::from)
        });
        if let Err(e) = sent {
            self.fail(format!("offer not sent: {}", e));
        }
    }

    fn on_offer_result(&self, outcome: CallOutcome) {
        let sid = match parse_outcome::<OfferResult>(names::OFFER, outcome) {
            Ok(result) => result.sid,
            Err(message) => return self.fail(message),
        };
        {
            let mut inner = lock(&self.inner);
            if inner.terminated {
                return;
            }
            inner.sid = Some(sid.clone());
            if inner.state == HandshakeState::ConnectingHandshake {
                inner.state = HandshakeState::ExchangingOfferAnswer;
            }
        }
        info!(%sid, state = %HandshakeState::ExchangingOfferAnswer, "session id allocated");
        self.emit(SessionEvent::SessionId(sid));
    }

    fn on_join_result(&self, outcome: CallOutcome) {
        let offer = match parse_outcome::<JoinResult>(names::JOIN, outcome) {
            Ok(result) => result.offer,
            Err(message) => return self.fail(message),
        };
        if self.is_terminated() {
            return;
        }
        if let Err(e) = self.peer.peer().signal(PeerSignal::Offer(offer)) {
            return self.fail(format!("remote offer rejected: {}", e));
        }
        self.enter_exchanging_ice();
    }

    fn send_answer(&self, sdp: String) {
        if self.role != Role::Responder {
            warn!(role = %self.role, "ignoring local answer on initiator");
            return;
        }
        let Some(sid) = self.sid() else {
            return self.fail("answer produced without a session id".to_string());
        };
        let weak = self.this.clone();
        let sent = to_params(names::ANSWER, &AnswerParams { sid, sdp }).and_then(|params| {
            self.signaling
                .engine()
                .call_with(names::ANSWER, params, move |outcome| {
                    if let (Err(error), Some(session)) = (outcome, weak.upgrade()) {
                        session.fail(format!("answer rejected: {}", error));
                    }
                })
                .map_err(SessionError::from)
        });
        if let Err(e) = sent {
            self.fail(format!("answer not sent: {}", e));
        }
    }

    fn apply_answer(&self, sdp: String) -> Result<(), SessionError> {
        {
            let inner = lock(&self.inner);
            if inner.terminated
                || matches!(inner.state, HandshakeState::ExchangingIce | HandshakeState::Connected)
            {
                debug!(state = %inner.state, "ignoring repeated answer");
                return Ok(());
            }
        }
        self.peer.peer().signal(PeerSignal::Answer(sdp))?;
        self.enter_exchanging_ice();
        Ok(())
    }

    fn enter_exchanging_ice(&self) {
        let (candidates, arm) = {
            let mut inner = lock(&self.inner);
            if inner.terminated || inner.state == HandshakeState::Connected {
                return;
            }
            inner.state = HandshakeState::ExchangingIce;
            let arm = self.role == Role::Initiator && !inner.timer_armed;
            inner.timer_armed |= arm;
            (std::mem::take(&mut inner.pending_candidates), arm)
        };
        info!(role = %self.role, state = %HandshakeState::ExchangingIce, buffered = candidates.len(), "descriptions applied");
        for candidate in candidates {
            self.send_candidate(candidate);
        }
        if arm {
            if let Some(grace) = self.config.fallback_grace {
                self.arm_fallback_timer(grace);
            }
        }
    }

    fn on_local_candidate(&self, candidate: Value) {
        let candidate = {
            let mut inner = lock(&self.inner);
            if inner.terminated {
                return;
            }
            match inner.state {
                HandshakeState::ExchangingIce => candidate,
                HandshakeState::Connected => return,
                _ => {
                    inner.pending_candidates.push(candidate);
                    return;
                }
            }
        };
        self.send_candidate(candidate);
    }

    fn send_candidate(&self, candidate: Value) {
        let params = IceParams { candidate };
        let sent = to_params(names::ICE, &params)
            .and_then(|params| Ok(self.signaling.engine().notify(names::ICE, params)?));
        if let Err(e) = sent {
            warn!(error = %e, "failed to relay ice candidate");
        }
    }

    fn apply_remote_candidate(&self, candidate: Value) -> Result<(), SessionError> {
        if self.is_terminated() || self.peer.is_detached() {
            debug!("ignoring remote candidate after cutover");
            return Ok(());
        }
        self.peer.peer().signal(PeerSignal::Candidate(candidate))?;
        Ok(())
    }

    fn on_signaling_request(&self, request: IncomingRequest, responder: Responder) {
        debug!(role = %self.role, method = %request.method, "signaling request");
        let outcome = match request.method.as_str() {
            names::ANSWER if self.role == Role::Initiator => {
                from_params::<RelayedAnswer>(names::ANSWER, request.params)
                    .and_then(|answer| self.apply_answer(answer.sdp))
                    .map(|()| json!(true))
                    .map_err(error_payload)
            }
            names::ICE => from_params::<IceParams>(names::ICE, request.params)
                .and_then(|ice| self.apply_remote_candidate(ice.candidate))
                .map(|()| json!(true))
                .map_err(error_payload),
            names::FALLBACK => self.accept_fallback(request.params),
            other => Err(json!({ "message": format!("unsupported signaling method: {}", other) })),
        };
        reply(responder, outcome);
    }

    fn arm_fallback_timer(&self, grace: Duration) {
        let session = self.this.clone();
        debug!(grace_ms = grace.as_millis() as u64, "fallback timer armed");
        let spawned = thread::Builder::new()
            .name("coldwire-fallback".to_string())
            .spawn(move || {
                thread::sleep(grace);
                if let Some(session) = session.upgrade() {
                    session.on_fallback_deadline();
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "could not spawn fallback timer, falling back now");
            self.on_fallback_deadline();
        }
    }

    fn on_fallback_deadline(&self) {
        let (fallback, handler) = {
            let mut inner = lock(&self.inner);
            if self.role != Role::Initiator
                || inner.terminated
                || inner.active.is_some()
                || inner.state != HandshakeState::ExchangingIce
            {
                debug!(role = %self.role, state = %inner.state, "fallback deadline passed without effect");
                return;
            }
            let fallback = self.adopt_fallback(&mut inner);
            (fallback, inner.handler.clone())
        };
        self.switch_to_fallback(&fallback, handler);
    }

    fn accept_fallback(&self, params: Value) -> CallOutcome {
        let (fallback, adopted) = {
            let mut inner = lock(&self.inner);
            if inner.aborted {
                return Err(json!({ "message": "session aborted" }));
            }
            if let Some(fallback) = &inner.fallback {
                (Arc::clone(fallback), None)
            } else if inner.active == Some(TransportKind::Peer) {
                return Err(json!({ "message": "peer channel already connected" }));
            } else {
                let fallback = self.adopt_fallback(&mut inner);
                (fallback, Some(inner.handler.clone()))
            }
        };
        if let Some(handler) = adopted {
            self.switch_to_fallback(&fallback, handler);
        }
        fallback.accept(params)
    }

    fn adopt_fallback(&self, inner: &mut Inner) -> Arc<FallbackTransport> {
        let fallback = Arc::new(FallbackTransport::new(Arc::clone(self.signaling.engine())));
        inner.fallback = Some(Arc::clone(&fallback));
        inner.active = Some(TransportKind::Fallback);
        inner.state = HandshakeState::Connected;
        inner.pending_candidates.clear();
        fallback
    }

    fn switch_to_fallback(&self, fallback: &FallbackTransport, handler: Option<Arc<dyn RequestHandler>>) {
        warn!(role = %self.role, "peer channel unavailable, switching to signaling tunnel");
        self.peer.detach();
        self.peer.peer().destroy();
        if let Some(handler) = handler {
            fallback.engine().set_handler(handler);
        }
        self.emit(SessionEvent::FallingBack);
        self.emit(SessionEvent::Connected(TransportKind::Fallback));
    }

    fn on_peer_connect(&self) {
        {
            let mut inner = lock(&self.inner);
            if inner.terminated || inner.active == Some(TransportKind::Fallback) {
                debug!(role = %self.role, "ignoring late peer connect");
                return;
            }
            inner.terminated = true;
            inner.state = HandshakeState::Connected;
            inner.active = Some(TransportKind::Peer);
            inner.pending_candidates.clear();
        }
        info!(role = %self.role, "peer channel connected, closing signaling");
        self.peer.on_connect();
        self.signaling.close();
        self.emit(SessionEvent::Connected(TransportKind::Peer));
        self.emit(SessionEvent::Terminated);
    }

    fn fail(&self, message: String) {
        warn!(role = %self.role, %message, "handshake step failed");
        self.emit(SessionEvent::Failed(message));
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("session event receiver dropped");
        }
    }
}

fn reply(responder: Responder, outcome: CallOutcome) {
    if let Err(e) = responder.respond(outcome) {
        debug!(error = %e, "failed to reply on signaling socket");
    }
}

fn error_payload(error: SessionError) -> Value {
    json!({ "message": error.to_string() })
}

fn to_params<T: Serialize>(method: &'static str, params: &T) -> Result<Value, SessionError> {
    serde_json::to_value(params).map_err(|source| SessionError::Payload { method, source })
}

fn from_params<T: DeserializeOwned>(method: &'static str, params: Value) -> Result<T, SessionError> {
    serde_json::from_value(params).map_err(|source| SessionError::Payload { method, source })
}

fn parse_outcome<T: DeserializeOwned>(method: &'static str, outcome: CallOutcome) -> Result<T, String> {
    match outcome {
        Ok(result) => from_params(method, result).map_err(|e| e.to_string()),
        Err(error) => Err(format!("{} rejected: {}", method, error)),
    }
}
