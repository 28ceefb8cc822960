//! The encrypted appliance socket.
//!
//! Appliances expose a WebSocket control channel carrying JSON documents.
//! Every binary message is AES-256-CBC ciphertext followed by a 16-byte
//! truncated HMAC whose input chains in the previous frame's tag, one chain
//! per direction. [`framer::HcFramer`] implements the frame layer;
//! [`session::HcSession`] owns the connection lifecycle, the session and
//! message-id counters, fragment reassembly and the request helpers.
//!
//! Unlike the radio link, this channel cannot shrug off a bad frame: once a
//! MAC fails the chain is desynchronized for good, so the only recovery is a
//! reconnect, which resets both chains and all counters.

pub mod framer;
pub mod session;

pub use framer::HcFramer;
pub use session::{HcSession, SessionAction, WsEvent, RECONNECT_INTERVAL};
