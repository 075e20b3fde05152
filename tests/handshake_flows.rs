//! Handshake flows through an in-process relay
//!
//! An initiator (hot wallet) and a responder (signer) negotiate through
//! `MockRelay`. Peer connections are `MockPeer`s driven by the test, so each
//! test decides whether the direct channel ever comes up.

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use coldwire::mock::{MockPeer, MockRelay, RelayConnection};
use coldwire::{
    HandshakeConfig, HandshakeSession, HandshakeState, IncomingRequest, PeerEvent, PeerSignal, Responder,
    SessionEvent, TransportKind,
};
use serde_json::json;

const WAIT: Duration = Duration::from_secs(5);

struct Side {
    conn: RelayConnection,
    peer: Arc<MockPeer>,
    session: Arc<HandshakeSession>,
    events: Receiver<SessionEvent>,
}

fn wait_for(events: &Receiver<SessionEvent>, wanted: &SessionEvent) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    loop {
        match events.recv_timeout(WAIT) {
            Ok(event) => {
                let done = &event == wanted;
                seen.push(event);
                if done {
                    return seen;
                }
            }
            Err(e) => panic!("waiting for {:?}, saw {:?}: {}", wanted, seen, e),
        }
    }
}

fn signer_handler() -> Arc<dyn coldwire::RequestHandler> {
    Arc::new(|request: IncomingRequest, responder: Responder| match request.method.as_str() {
        "getWalletList" => responder.ok(json!(["w1"])).unwrap(),
        other => responder.err(json!({"message": format!("unknown {}", other)})).unwrap(),
    })
}

/// Initiator published its offer; responder joined and answered.
fn negotiate(relay: &Arc<MockRelay>, config: HandshakeConfig) -> (Side, Side) {
    let conn = relay.connect();
    let peer = MockPeer::new();
    let (session, events) = HandshakeSession::initiator(conn.socket(), peer.clone(), config);
    conn.attach(&session);

    session.on_peer_event(PeerEvent::Signal(PeerSignal::Offer("v=0 hot".into())));
    session.on_peer_event(PeerEvent::Signal(PeerSignal::Candidate(json!("cand-hot"))));
    let sid = match events.recv_timeout(WAIT) {
        Ok(SessionEvent::SessionId(sid)) => sid,
        other => panic!("expected a session id, got {:?}", other),
    };
    let initiator = Side {
        conn,
        peer,
        session,
        events,
    };

    let conn = relay.connect();
    let peer = MockPeer::new();
    let (session, events) =
        HandshakeSession::responder(sid, conn.socket(), peer.clone(), config).unwrap();
    session.set_request_handler(signer_handler());
    conn.attach(&session);
    assert_eq!(peer.signals(), vec![PeerSignal::Offer("v=0 hot".into())]);
    assert_eq!(session.state(), HandshakeState::ExchangingIce);

    session.on_peer_event(PeerEvent::Signal(PeerSignal::Answer("v=0 cold".into())));
    let responder = Side {
        conn,
        peer,
        session,
        events,
    };
    (initiator, responder)
}

// =============================================================================
// Test 1: offer / join / answer / ice relay
// =============================================================================

#[test]
fn test_descriptions_and_candidates_are_relayed() {
    let relay = MockRelay::new();
    let (initiator, responder) = negotiate(&relay, HandshakeConfig::manual());

    assert_eq!(initiator.session.sid().as_deref(), Some("sid-1"));
    assert_eq!(initiator.session.state(), HandshakeState::ExchangingIce);
    assert_eq!(initiator.peer.signals(), vec![PeerSignal::Answer("v=0 cold".into())]);

    // The buffered initiator candidate went out once the answer applied.
    assert!(responder
        .peer
        .signals()
        .contains(&PeerSignal::Candidate(json!("cand-hot"))));

    responder
        .session
        .on_peer_event(PeerEvent::Signal(PeerSignal::Candidate(json!("cand-cold"))));
    assert!(initiator
        .peer
        .signals()
        .contains(&PeerSignal::Candidate(json!("cand-cold"))));

    assert_eq!(relay.observed("offer"), 1);
    assert_eq!(relay.observed("join"), 1);
    assert_eq!(relay.observed("answer"), 1);
    assert_eq!(relay.observed("ice"), 2);
}

// =============================================================================
// Test 2: peer channel connects before the deadline
// =============================================================================

#[test]
fn test_peer_connect_closes_signaling() {
    let relay = MockRelay::new();
    let (initiator, responder) = negotiate(&relay, HandshakeConfig::manual());

    let to_responder = Arc::clone(&responder.session);
    initiator
        .peer
        .connect_to(move |text| to_responder.on_peer_event(PeerEvent::Data(text.to_string())));
    let to_initiator = Arc::clone(&initiator.session);
    responder
        .peer
        .connect_to(move |text| to_initiator.on_peer_event(PeerEvent::Data(text.to_string())));

    // Queued until the channel opens.
    let call = initiator.session.call("getWalletList", json!({})).unwrap();

    responder.session.on_peer_event(PeerEvent::Connect);
    initiator.session.on_peer_event(PeerEvent::Connect);

    assert_eq!(call.wait_timeout(WAIT).unwrap(), json!(["w1"]));
    assert_eq!(
        wait_for(&initiator.events, &SessionEvent::Terminated),
        vec![SessionEvent::Connected(TransportKind::Peer), SessionEvent::Terminated]
    );
    assert!(initiator.conn.socket().is_closed());
    assert!(responder.conn.socket().is_closed());

    // A deadline passing afterwards changes nothing.
    initiator.session.fire_fallback_deadline();
    assert!(initiator.session.fallback_transport().is_none());
    assert_eq!(initiator.session.active_transport(), Some(TransportKind::Peer));
    assert_eq!(relay.observed("fallback"), 0);
}

// =============================================================================
// Test 3: forced fallback
// =============================================================================

#[test]
fn test_forced_fallback_tunnels_through_relay() {
    let relay = MockRelay::new();
    let (initiator, responder) = negotiate(&relay, HandshakeConfig::with_grace(Duration::ZERO));

    wait_for(
        &initiator.events,
        &SessionEvent::Connected(TransportKind::Fallback),
    );
    assert!(initiator.peer.is_destroyed());

    let call = initiator
        .session
        .call("getWalletList", json!({"blockchains": ["eth"]}))
        .unwrap();
    assert_eq!(call.wait_timeout(WAIT).unwrap(), json!(["w1"]));

    // The responder switched on the first tunnelled message.
    assert_eq!(
        wait_for(&responder.events, &SessionEvent::Connected(TransportKind::Fallback)),
        vec![SessionEvent::FallingBack, SessionEvent::Connected(TransportKind::Fallback)]
    );
    assert_eq!(responder.session.active_transport(), Some(TransportKind::Fallback));
    assert!(responder.peer.is_destroyed());

    // Request and reply each crossed the relay as a fallback envelope; the
    // peer channels carried nothing.
    assert_eq!(relay.observed("fallback"), 2);
    assert!(initiator.peer.sent().is_empty());
    assert!(responder.peer.sent().is_empty());

    // A late connect is ignored.
    initiator.session.on_peer_event(PeerEvent::Connect);
    assert_eq!(initiator.session.active_transport(), Some(TransportKind::Fallback));
    assert!(!initiator.conn.socket().is_closed());
}

// =============================================================================
// Test 4: relay rejects the join
// =============================================================================

#[test]
fn test_join_rejection_is_reported() {
    let relay = MockRelay::new();
    relay.fail("join", "session expired");

    let conn = relay.connect();
    let (session, events) =
        HandshakeSession::responder("sid-9", conn.socket(), MockPeer::new(), HandshakeConfig::manual()).unwrap();
    conn.attach(&session);

    match events.recv_timeout(WAIT) {
        Ok(SessionEvent::Failed(message)) => assert!(message.contains("session expired"), "{}", message),
        other => panic!("expected a failure, got {:?}", other),
    }
    assert_eq!(session.state(), HandshakeState::ConnectingHandshake);
}
