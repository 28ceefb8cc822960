//! Appliance socket session layer.
//!
//! Owns everything above the frame layer: the session and message-id
//! counters, reassembly of fragmented WebSocket messages, and the helpers
//! that build the JSON request documents appliances expect.
//!
//! The session is a pure state machine over [`WsEvent`] values. The actual
//! WebSocket client is an external collaborator that feeds events in and
//! executes the returned [`SessionAction`] values; it is also responsible
//! for redialing on [`SessionAction::Reconnect`] and for its own automatic
//! reconnect every [`RECONNECT_INTERVAL`] while the appliance is away.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use crate::{
    config::{Endpoint, SocketCredentials},
    env::Environment,
    hc::framer::HcFramer,
};

/// Fixed redial interval for the WebSocket client.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound for one reassembled binary message.
///
/// Appliances send their full feature description in one logical message,
/// which fragments heavily on constrained links; 32 KiB covers the largest
/// documents seen in the field.
pub const FRAGMENT_BUFFER_SIZE: usize = 32 * 1024;

/// Events delivered by the WebSocket client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsEvent {
    /// Socket (re)connected; the session resets chains and counters.
    Connected,
    /// Socket dropped; the client redials on its own.
    Disconnected,
    /// Unexpected text message (the protocol is binary only).
    Text(Vec<u8>),
    /// One complete binary message.
    Binary(Vec<u8>),
    /// First fragment of a fragmented message.
    FragmentStart {
        /// True for binary fragments; text fragments are discarded.
        binary: bool,
        /// Fragment bytes.
        data: Vec<u8>,
    },
    /// Middle fragment.
    Fragment(Vec<u8>),
    /// Final fragment; triggers reassembled delivery.
    FragmentFin(Vec<u8>),
    /// Transport-level error, informational only.
    TransportError,
    /// Keepalive ping from the peer.
    Ping,
    /// Keepalive pong from the peer.
    Pong,
}

/// Actions returned by the session for the driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Send this binary frame over the WebSocket.
    SendBinary(Vec<u8>),
    /// Tear the socket down and redial; the session state is already reset.
    Reconnect,
    /// Hand this received document to the application.
    Deliver(Value),
}

/// Session state machine for one appliance connection.
pub struct HcSession<E: Environment> {
    env: E,
    framer: HcFramer,
    endpoint: Endpoint,

    session_id: u32,
    tx_msg_id: u32,

    fragment: Vec<u8>,
    is_bin_fragment: bool,
}

impl<E: Environment> HcSession<E> {
    /// Create a session for the given appliance.
    pub fn new(env: E, credentials: &SocketCredentials, endpoint: Endpoint) -> Self {
        Self {
            env,
            framer: HcFramer::new(&credentials.psk, credentials.iv),
            endpoint,
            session_id: 0,
            tx_msg_id: 0,
            fragment: Vec::with_capacity(FRAGMENT_BUFFER_SIZE),
            is_bin_fragment: false,
        }
    }

    /// The appliance endpoint this session talks to. The WebSocket path is
    /// always `/homeconnect`.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Current session id (0 until [`HcSession::start_session`]).
    #[must_use]
    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Next outbound message id.
    #[must_use]
    pub fn tx_msg_id(&self) -> u32 {
        self.tx_msg_id
    }

    /// Install the counters negotiated during the application handshake.
    pub fn start_session(&mut self, session_id: u32, tx_msg_id: u32) {
        debug!(session_id, tx_msg_id, "starting session");
        self.session_id = session_id;
        self.tx_msg_id = tx_msg_id;
    }

    /// Process one WebSocket event.
    pub fn handle_event(&mut self, event: WsEvent) -> Vec<SessionAction> {
        match event {
            WsEvent::Connected => {
                info!("socket connected");
                self.reset_state();
                vec![]
            },
            WsEvent::Disconnected => {
                info!("socket disconnected");
                vec![]
            },
            WsEvent::Text(payload) => {
                warn!(len = payload.len(), "unexpected text message, discarded");
                vec![]
            },
            WsEvent::Binary(payload) => self.receive(&payload),
            WsEvent::FragmentStart { binary: false, data } => {
                warn!(len = data.len(), "unexpected text fragment start, discarded");
                self.is_bin_fragment = false;
                vec![]
            },
            WsEvent::FragmentStart { binary: true, data } => {
                debug!(len = data.len(), "fragment start");
                self.fragment.clear();
                self.is_bin_fragment = true;
                self.append_fragment(&data);
                vec![]
            },
            WsEvent::Fragment(data) => {
                debug!(len = data.len(), "fragment");
                self.append_fragment(&data);
                vec![]
            },
            WsEvent::FragmentFin(data) => {
                debug!(len = data.len(), "fragment fin");
                self.append_fragment(&data);
                if self.is_bin_fragment && !self.fragment.is_empty() {
                    let message = std::mem::take(&mut self.fragment);
                    self.is_bin_fragment = false;
                    return self.receive(&message);
                }
                vec![]
            },
            WsEvent::TransportError => {
                warn!("socket error");
                vec![]
            },
            WsEvent::Ping => {
                debug!("socket ping");
                vec![]
            },
            WsEvent::Pong => {
                debug!("socket pong");
                vec![]
            },
        }
    }

    /// Encrypt and send one document as-is. Does not touch the message-id
    /// counter; the action helpers below do.
    pub fn send_document(&mut self, document: &Value) -> SessionAction {
        debug!(%document, "sending document");
        let serialized =
            serde_json::to_vec(document).expect("JSON documents always serialize");
        SessionAction::SendBinary(self.framer.seal(&self.env, &serialized))
    }

    /// Send an action request without payload (e.g. `GET` on a resource).
    pub fn send_action(&mut self, resource: &str, version: u16, action: &str) -> SessionAction {
        self.send_action_with_data(resource, Value::Null, version, action)
    }

    /// Send an action request with a data payload.
    ///
    /// The payload is wrapped in a single-element `data` array; that is the
    /// document shape appliances expect. The message-id counter advances
    /// after the frame is built.
    pub fn send_action_with_data(
        &mut self,
        resource: &str,
        data: Value,
        version: u16,
        action: &str,
    ) -> SessionAction {
        debug!(resource, action, "sending action");

        let mut document = json!({
            "sID": self.session_id,
            "msgID": self.tx_msg_id,
            "resource": resource,
            "version": version,
            "action": action,
        });
        if !data.is_null() {
            document["data"] = Value::Array(vec![data]);
        }

        let send = self.send_document(&document);
        self.tx_msg_id = self.tx_msg_id.wrapping_add(1);
        send
    }

    /// Answer a query from the appliance.
    ///
    /// Replies echo the query's session id, message id, resource and version
    /// and do NOT advance the outbound message-id counter.
    pub fn send_reply(&mut self, query: &Value, reply: Value) -> SessionAction {
        debug!(msg_id = %query["msgID"], "sending reply");

        let mut document = json!({
            "sID": query["sID"],
            "msgID": query["msgID"],
            "resource": query["resource"],
            "version": query["version"],
            "action": "RESPONSE",
        });
        if !reply.is_null() {
            document["data"] = Value::Array(vec![reply]);
        }

        self.send_document(&document)
    }

    /// Random base64url nonce (32 bytes, unpadded) required by some
    /// appliance handshakes.
    #[must_use]
    pub fn create_random_nonce(&self) -> String {
        let mut nonce = [0u8; 32];
        self.env.random_bytes(&mut nonce);
        URL_SAFE_NO_PAD.encode(nonce)
    }

    /// Decrypt, verify and parse one reassembled binary message.
    fn receive(&mut self, wire: &[u8]) -> Vec<SessionAction> {
        match self.framer.open(wire) {
            Ok(document_bytes) => match serde_json::from_slice::<Value>(&document_bytes) {
                Ok(document) => {
                    debug!(%document, "received document");
                    vec![SessionAction::Deliver(document)]
                },
                Err(error) => {
                    // Authentic but malformed: the chain already advanced,
                    // so the session survives and only the document is lost.
                    warn!(%error, "malformed document, dropped");
                    vec![]
                },
            },
            Err(error) => {
                debug_assert!(error.requires_reconnect());
                warn!(%error, "integrity failure, reconnecting");
                self.reset_state();
                vec![SessionAction::Reconnect]
            },
        }
    }

    fn append_fragment(&mut self, data: &[u8]) {
        if !self.is_bin_fragment {
            return;
        }
        if self.fragment.len() + data.len() < FRAGMENT_BUFFER_SIZE {
            self.fragment.extend_from_slice(data);
        } else {
            warn!("fragment buffer overflow, data discarded");
        }
    }

    fn reset_state(&mut self) {
        self.session_id = 0;
        self.tx_msg_id = 0;
        self.fragment.clear();
        self.is_bin_fragment = false;
        self.framer.reset();
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;
    use crate::env::SystemEnv;

    const PSK: [u8; 32] = [3u8; 32];
    const IV: [u8; 16] = [9u8; 16];

    fn session() -> HcSession<SystemEnv> {
        let credentials = SocketCredentials { psk: PSK, iv: IV };
        let endpoint =
            Endpoint { ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)), port: 80 };
        HcSession::new(SystemEnv, &credentials, endpoint)
    }

    fn appliance() -> HcFramer {
        HcFramer::appliance(&PSK, IV)
    }

    fn sent_bytes(action: SessionAction) -> Vec<u8> {
        match action {
            SessionAction::SendBinary(bytes) => bytes,
            other => panic!("expected SendBinary, got {other:?}"),
        }
    }

    fn delivered(mut actions: Vec<SessionAction>) -> Value {
        assert_eq!(actions.len(), 1);
        match actions.pop().unwrap() {
            SessionAction::Deliver(doc) => doc,
            other => panic!("expected Deliver, got {other:?}"),
        }
    }

    #[test]
    fn action_document_shape() {
        let mut session = session();
        session.start_session(77, 10);

        let wire = sent_bytes(session.send_action("/ro/allMandatoryValues", 1, "GET"));
        let doc: Value =
            serde_json::from_slice(&appliance().open(&wire).expect("verifies")).unwrap();

        assert_eq!(doc["sID"], 77);
        assert_eq!(doc["msgID"], 10);
        assert_eq!(doc["resource"], "/ro/allMandatoryValues");
        assert_eq!(doc["version"], 1);
        assert_eq!(doc["action"], "GET");
        assert!(doc.get("data").is_none());
    }

    #[test]
    fn data_is_wrapped_in_an_array() {
        let mut session = session();
        let wire = sent_bytes(session.send_action_with_data(
            "/ci/authentication",
            json!({"nonce": "abc"}),
            2,
            "GET",
        ));

        let doc: Value =
            serde_json::from_slice(&appliance().open(&wire).expect("verifies")).unwrap();
        assert_eq!(doc["data"], json!([{"nonce": "abc"}]));
    }

    #[test]
    fn msg_id_advances_per_action_but_not_per_reply() {
        let mut session = session();
        let mut peer = appliance();
        session.start_session(1, 100);

        let first = sent_bytes(session.send_action("/a", 1, "GET"));
        peer.open(&first).expect("verifies");
        assert_eq!(session.tx_msg_id(), 101);

        let second = sent_bytes(session.send_action("/b", 1, "GET"));
        peer.open(&second).expect("verifies");
        assert_eq!(session.tx_msg_id(), 102);

        let query = json!({"sID": 1, "msgID": 55, "resource": "/q", "version": 2});
        let wire = sent_bytes(session.send_reply(&query, json!({"ok": true})));
        assert_eq!(session.tx_msg_id(), 102, "replies must not advance the counter");

        let doc: Value = serde_json::from_slice(&peer.open(&wire).expect("verifies")).unwrap();
        assert_eq!(doc["msgID"], 55);
        assert_eq!(doc["resource"], "/q");
        assert_eq!(doc["action"], "RESPONSE");
        assert_eq!(doc["data"], json!([{"ok": true}]));
    }

    #[test]
    fn binary_message_is_delivered() {
        let mut session = session();
        let wire = appliance().seal(&SystemEnv, br#"{"sID":5,"msgID":1}"#);

        let doc = delivered(session.handle_event(WsEvent::Binary(wire)));
        assert_eq!(doc["sID"], 5);
    }

    #[test]
    fn fragments_reassemble() {
        let mut session = session();
        let wire = appliance().seal(&SystemEnv, br#"{"msgID":42}"#);

        let (a, rest) = wire.split_at(10);
        let (b, c) = rest.split_at(7);

        assert!(session
            .handle_event(WsEvent::FragmentStart { binary: true, data: a.to_vec() })
            .is_empty());
        assert!(session.handle_event(WsEvent::Fragment(b.to_vec())).is_empty());
        let doc = delivered(session.handle_event(WsEvent::FragmentFin(c.to_vec())));
        assert_eq!(doc["msgID"], 42);
    }

    #[test]
    fn text_fragments_are_discarded() {
        let mut session = session();

        session.handle_event(WsEvent::FragmentStart { binary: false, data: b"junk".to_vec() });
        session.handle_event(WsEvent::Fragment(b"more".to_vec()));
        let actions = session.handle_event(WsEvent::FragmentFin(b"end".to_vec()));
        assert!(actions.is_empty());
    }

    #[test]
    fn integrity_failure_reconnects_and_resets() {
        let mut session = session();
        session.start_session(9, 9);

        let actions = session.handle_event(WsEvent::Binary(vec![0xAA; 32]));
        assert_eq!(actions, vec![SessionAction::Reconnect]);
        assert_eq!(session.session_id(), 0);
        assert_eq!(session.tx_msg_id(), 0);
    }

    #[test]
    fn malformed_document_is_dropped_without_reconnect() {
        let mut session = session();
        let mut peer = appliance();

        let wire = peer.seal(&SystemEnv, b"this is not json");
        let actions = session.handle_event(WsEvent::Binary(wire));
        assert!(actions.is_empty());

        // The chain advanced on both ends, so the next frame still verifies.
        let next = peer.seal(&SystemEnv, br#"{"msgID":1}"#);
        let doc = delivered(session.handle_event(WsEvent::Binary(next)));
        assert_eq!(doc["msgID"], 1);
    }

    #[test]
    fn connected_resets_counters() {
        let mut session = session();
        session.start_session(4, 8);

        session.handle_event(WsEvent::Connected);
        assert_eq!(session.session_id(), 0);
        assert_eq!(session.tx_msg_id(), 0);
    }

    #[test]
    fn nonce_is_unpadded_base64url() {
        let session = session();
        let nonce = session.create_random_nonce();

        assert_eq!(nonce.len(), 43); // 32 bytes, no padding
        assert!(!nonce.contains('='));
        assert!(nonce
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
