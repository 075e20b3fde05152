//! In-process signaling relay.
//!
//! Routes `offer`, `join`, `answer`, `ice` and `fallback` between the two
//! connections of a session, the way the hosted relay does.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use coldwire_protocol::ops::{names, AnswerParams, JoinParams, OfferParams};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::engine::{CallOutcome, IncomingRequest, Responder};
use crate::session::HandshakeSession;
use crate::sync::lock;
use crate::transport::{SocketTransport, TextSocket, TransportError};

use super::MemorySocket;

type Forward = Arc<dyn Fn(&str) + Send + Sync>;

/// Relay-to-client half of a connection.
#[derive(Default)]
struct Downstream {
    target: Mutex<Option<Forward>>,
}

impl TextSocket for Downstream {
    fn send(&self, text: &str) -> Result<(), TransportError> {
        let target = lock(&self.target).clone();
        match target {
            Some(deliver) => {
                deliver(text);
                Ok(())
            }
            None => Err(TransportError::Closed),
        }
    }

    fn close(&self) {
        lock(&self.target).take();
    }
}

struct RelaySession {
    offer: String,
    initiator: u64,
    responder: Option<u64>,
}

#[derive(Default)]
struct RelayState {
    next_sid: u64,
    next_conn: u64,
    conns: HashMap<u64, Arc<SocketTransport>>,
    sessions: HashMap<String, RelaySession>,
    observed: HashMap<String, usize>,
    failures: HashMap<String, String>,
}

/// Signaling relay living in the test process.
pub struct MockRelay {
    this: Weak<MockRelay>,
    state: Mutex<RelayState>,
}

/// A client connection to a [`MockRelay`].
pub struct RelayConnection {
    id: u64,
    client: Arc<MemorySocket>,
    downstream: Arc<Downstream>,
}

impl RelayConnection {
    /// Connection number, unique per relay.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Client-side socket: writes go to the relay.
    pub fn socket(&self) -> Arc<MemorySocket> {
        Arc::clone(&self.client)
    }

    /// Deliver relay output to `receive`.
    pub fn on_receive<F>(&self, receive: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *lock(&self.downstream.target) = Some(Arc::new(receive));
    }

    /// Wire relay output into `session` and report the socket open.
    pub fn attach(&self, session: &Arc<HandshakeSession>) {
        let weak = Arc::downgrade(session);
        self.on_receive(move |text| {
            if let Some(session) = weak.upgrade() {
                session.on_signaling_message(text);
            }
        });
        session.on_signaling_open();
    }
}

impl MockRelay {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            state: Mutex::new(RelayState::default()),
        })
    }

    /// Open a new client connection.
    pub fn connect(&self) -> RelayConnection {
        let downstream = Arc::new(Downstream::default());
        let server = Arc::new(SocketTransport::new(downstream.clone()));
        let id = {
            let mut state = lock(&self.state);
            state.next_conn += 1;
            let id = state.next_conn;
            state.conns.insert(id, Arc::clone(&server));
            id
        };

        let relay = self.this.clone();
        server
            .engine()
            .set_handler(Arc::new(move |request: IncomingRequest, responder: Responder| {
                if let Some(relay) = relay.upgrade() {
                    relay.handle(id, request, responder);
                }
            }));
        server.on_open();

        let client = MemorySocket::new();
        let upstream = Arc::clone(&server);
        client.connect_to(move |text| upstream.on_message(text));

        RelayConnection {
            id,
            client,
            downstream,
        }
    }

    /// Number of requests received for `method`.
    pub fn observed(&self, method: &str) -> usize {
        lock(&self.state).observed.get(method).copied().unwrap_or(0)
    }

    /// Reject every later `method` request with `message`.
    pub fn fail(&self, method: &str, message: impl Into<String>) {
        lock(&self.state)
            .failures
            .insert(method.to_string(), message.into());
    }

    fn handle(&self, conn: u64, request: IncomingRequest, responder: Responder) {
        let failure = {
            let mut state = lock(&self.state);
            *state.observed.entry(request.method.clone()).or_default() += 1;
            state.failures.get(&request.method).cloned()
        };
        debug!(conn, method = %request.method, "relay request");

        let outcome = match (failure, request.method.as_str()) {
            (Some(message), _) => Err(json!({ "message": message })),
            (None, names::OFFER) => self.on_offer(conn, request.params),
            (None, names::JOIN) => self.on_join(conn, request.params),
            (None, names::ANSWER) => self.on_answer(conn, request.params),
            (None, names::ICE) => self.forward_notification(conn, names::ICE, request.params),
            (None, names::FALLBACK) => self.forward_call(conn, names::FALLBACK, request.params),
            (None, other) => Err(json!({ "message": format!("unknown method {}", other) })),
        };
        if let Err(e) = responder.respond(outcome) {
            debug!(conn, error = %e, "relay reply dropped");
        }
    }

    fn on_offer(&self, conn: u64, params: Value) -> CallOutcome {
        let OfferParams { sdp } = parse(params)?;
        let mut state = lock(&self.state);
        state.next_sid += 1;
        let sid = format!("sid-{}", state.next_sid);
        state.sessions.insert(
            sid.clone(),
            RelaySession {
                offer: sdp,
                initiator: conn,
                responder: None,
            },
        );
        Ok(json!({ "sid": sid }))
    }

    fn on_join(&self, conn: u64, params: Value) -> CallOutcome {
        let JoinParams { sid } = parse(params)?;
        let mut state = lock(&self.state);
        let session = state
            .sessions
            .get_mut(&sid)
            .ok_or_else(|| json!({ "message": format!("unknown session {}", sid) }))?;
        if session.responder.is_some() {
            return Err(json!({ "message": "session already joined" }));
        }
        session.responder = Some(conn);
        Ok(json!({ "offer": session.offer }))
    }

    fn on_answer(&self, conn: u64, params: Value) -> CallOutcome {
        let AnswerParams { sid, sdp } = parse(params)?;
        let initiator = {
            let state = lock(&self.state);
            let found = state
                .sessions
                .get(&sid)
                .filter(|session| session.responder == Some(conn))
                .and_then(|session| state.conns.get(&session.initiator).cloned());
            found
        };
        let initiator = initiator.ok_or_else(|| json!({ "message": format!("not joined to {}", sid) }))?;

        initiator
            .engine()
            .call_with(names::ANSWER, json!({ "sdp": sdp }), |_ack| {})
            .map_err(|e| json!({ "message": e.to_string() }))?;
        Ok(json!(true))
    }

    fn forward_call(&self, conn: u64, method: &str, params: Value) -> CallOutcome {
        let other = self.other_side(conn)?;
        other
            .engine()
            .call_with(method, params, |_ack| {})
            .map_err(|e| json!({ "message": e.to_string() }))?;
        Ok(json!(true))
    }

    fn forward_notification(&self, conn: u64, method: &str, params: Value) -> CallOutcome {
        let other = self.other_side(conn)?;
        other
            .engine()
            .notify(method, params)
            .map_err(|e| json!({ "message": e.to_string() }))?;
        Ok(json!(true))
    }

    fn other_side(&self, conn: u64) -> Result<Arc<SocketTransport>, Value> {
        let state = lock(&self.state);
        let other = state
            .sessions
            .values()
            .find_map(|session| match session.responder {
                Some(responder) if session.initiator == conn => Some(responder),
                Some(responder) if responder == conn => Some(session.initiator),
                _ => None,
            })
            .and_then(|other| state.conns.get(&other).cloned())
            .ok_or_else(|| json!({ "message": "no counterpart connected" }));
        other
    }
}

fn parse<T: DeserializeOwned>(params: Value) -> Result<T, Value> {
    serde_json::from_value(params).map_err(|e| json!({ "message": format!("invalid params: {}", e) }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use coldwire_protocol::{decode, RpcMessage};

    fn collecting(conn: &RelayConnection) -> Arc<Mutex<Vec<RpcMessage>>> {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        conn.on_receive(move |text| sink.lock().unwrap().push(decode(text).unwrap()));
        received
    }

    #[test]
    fn test_offer_join_answer_routing() {
        let relay = MockRelay::new();
        let initiator = relay.connect();
        let responder = relay.connect();
        let to_initiator = collecting(&initiator);
        let to_responder = collecting(&responder);

        initiator
            .socket()
            .send(r#"{"id":1,"method":"offer","params":{"sdp":"o"},"jsonrpc":"2.0"}"#)
            .unwrap();
        assert_eq!(
            to_initiator.lock().unwrap()[0],
            RpcMessage::result(1, json!({"sid": "sid-1"}))
        );

        responder
            .socket()
            .send(r#"{"id":1,"method":"join","params":{"sid":"sid-1"},"jsonrpc":"2.0"}"#)
            .unwrap();
        assert_eq!(
            to_responder.lock().unwrap()[0],
            RpcMessage::result(1, json!({"offer": "o"}))
        );

        responder
            .socket()
            .send(r#"{"id":2,"method":"answer","params":{"sid":"sid-1","sdp":"a"},"jsonrpc":"2.0"}"#)
            .unwrap();
        assert_eq!(
            to_initiator.lock().unwrap()[1],
            RpcMessage::call("answer", 1, json!({"sdp": "a"}))
        );
        assert_eq!(to_responder.lock().unwrap()[1], RpcMessage::result(2, json!(true)));
        assert_eq!(relay.observed("answer"), 1);
    }

    #[test]
    fn test_join_unknown_session_fails() {
        let relay = MockRelay::new();
        let responder = relay.connect();
        let received = collecting(&responder);
        responder
            .socket()
            .send(r#"{"id":1,"method":"join","params":{"sid":"sid-404"},"jsonrpc":"2.0"}"#)
            .unwrap();
        assert!(matches!(received.lock().unwrap()[0], RpcMessage::Error { .. }));
    }

    #[test]
    fn test_injected_failure() {
        let relay = MockRelay::new();
        relay.fail("offer", "relay overloaded");
        let conn = relay.connect();
        let received = collecting(&conn);
        conn.socket()
            .send(r#"{"id":1,"method":"offer","params":{"sdp":"o"},"jsonrpc":"2.0"}"#)
            .unwrap();
        assert_eq!(
            received.lock().unwrap()[0],
            RpcMessage::error(1, json!({"message": "relay overloaded"}))
        );
    }
}
