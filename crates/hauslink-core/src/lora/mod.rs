//! The long-range radio link.
//!
//! Three pieces cooperate here:
//!
//! - [`codec::LinkCrypto`] seals and opens the two frame shapes (random
//!   number, random tail, truncated MAC, ECB),
//! - [`sender::LoraSender`] aggregates records into frames and transmits them
//!   with pacing, retries and acknowledge matching,
//! - [`receiver::LoraReceiver`] validates, acknowledges and deduplicates
//!   inbound frames and decodes their record streams.
//!
//! Delivery guarantee over the link: in-order, at-most-once,
//! eventually-or-dropped. A frame is retransmitted until its acknowledge
//! arrives or the attempt budget is spent; the receiver suppresses the
//! duplicates that retransmission creates.

pub mod codec;
pub mod receiver;
pub mod sender;

pub use codec::LinkCrypto;
pub use receiver::{LoraReceiver, ReceiverAction};
pub use sender::{LoraSender, SenderAction};
