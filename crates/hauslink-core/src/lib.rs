//! Protocol logic for the hauslink gateway and display nodes.
//!
//! This crate bridges two very different channels:
//!
//! - the **appliance socket**: an encrypted WebSocket request/response channel
//!   carrying JSON documents, framed with AES-256-CBC and a chained truncated
//!   HMAC ([`hc`]), and
//! - the **radio link**: a low-bandwidth long-range datagram channel carrying
//!   packed typed records, framed with AES-256-ECB and per-frame truncated
//!   HMACs, with acknowledgements, retransmission and duplicate suppression
//!   ([`lora`]).
//!
//! # Architecture
//!
//! All protocol logic is sans-IO. State machines never touch sockets, radios,
//! the system clock or a global RNG:
//!
//! - time and randomness come from an injected [`env::Environment`],
//! - inbound bytes are pushed in through `handle_*` methods,
//! - outbound effects come back as action lists (`Transmit`, `SendBinary`,
//!   `Reconnect`, ...) that a driver executes.
//!
//! The nodes run on a cooperatively scheduled single-threaded tick loop; the
//! bounded queues in [`queue`] are the only hand-off points between loop
//! phases, and dropping on overflow is always preferred over blocking.
//!
//! # Failure philosophy
//!
//! The two channels recover differently, and the distinction is load-bearing:
//!
//! - A bad radio frame may simply be noise. The link NEVER resets state for
//!   one: wrong sizes and MAC failures are dropped and the machine carries on.
//! - A bad socket frame breaks the MAC chain, which cannot resynchronize.
//!   Any authenticity failure tears the connection down and resets both
//!   chains ([`hc::SessionAction::Reconnect`]).

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod crypto;
pub mod env;
pub mod error;
pub mod hc;
pub mod lora;
pub mod node;
pub mod queue;
pub mod radio;

pub use env::{Environment, SystemEnv};
pub use error::{ConfigError, LinkError, SocketError};
pub use node::{
    run_session_actions, DocumentSink, KeyMap, ReceiverNode, RecordSink, SenderNode,
    SocketClient, StaticKeyMap,
};
pub use radio::Radio;
