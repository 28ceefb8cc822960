//! Wire formats for the hauslink radio link.
//!
//! This crate contains the pure data layer of the radio protocol: the two
//! fixed-size frame shapes and the typed key/value record codec that fills
//! them. It performs no I/O and no cryptography - sealing and verification
//! live in `hauslink-core`, which operates on the byte images produced here.
//!
//! # Wire shapes
//!
//! - [`PayloadFrame`]: the forward datagram. At most 48 bytes, always a whole
//!   number of 16-byte cipher blocks, carrying up to 41 bytes of packed
//!   records.
//! - [`AckFrame`]: the reverse datagram. Exactly one 16-byte cipher block.
//!
//! # Records
//!
//! Application values travel as a tightly packed, tagged record stream inside
//! the payload data area. See [`Record`], [`RecordWriter`] and
//! [`RecordReader`] for the encoding rules.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
pub mod frame;
pub mod records;

pub use errors::{ProtocolError, Result};
pub use frame::{
    AckFrame, PayloadFrame, ACK_FRAME_SIZE, BLOCK_SIZE, DATA_SIZE, HASH_SIZE, MAX_FRAME_SIZE,
};
pub use records::{Push, Record, RecordReader, RecordWriter, Tag};
