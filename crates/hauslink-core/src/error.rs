//! Error types for the protocol core.
//!
//! Errors are split by channel because their recovery rules differ:
//! [`LinkError`] values describe dropped radio frames and never tear down
//! state, while most [`SocketError`] values force a reconnect because the
//! appliance MAC chain cannot resynchronize after a lost or forged frame.
//! [`ConfigError`] is fatal at construction time.

use thiserror::Error;

/// Radio link failures. Every variant is a drop, never a reset.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Packet size is not a legal frame size for this direction
    #[error("ignoring packet with length {size}")]
    BadPacketSize {
        /// Received size in bytes
        size: usize,
    },

    /// A bounded queue was full; the newest entry was dropped
    #[error("queue full, entry dropped")]
    QueueFull,
}

/// Appliance socket failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SocketError {
    /// Frame shorter than ciphertext-plus-tag or not block aligned
    #[error("incomplete message, length {size}")]
    BadFrameSize {
        /// Received size in bytes
        size: usize,
    },

    /// Chained MAC mismatch; a message was lost or forged
    #[error("message authentication failed, chain broken")]
    MacMismatch,

    /// Final pad byte larger than the plaintext
    #[error("impossible padding length {pad}")]
    BadPadding {
        /// The offending pad byte
        pad: u8,
    },

    /// Authentic frame whose plaintext is not a valid document
    #[error("malformed document: {0}")]
    MalformedDocument(String),
}

impl SocketError {
    /// True if this failure breaks the MAC chain and requires a reconnect.
    ///
    /// A malformed document is the one exception: the frame authenticated,
    /// so the chain already advanced and the session can continue.
    #[must_use]
    pub fn requires_reconnect(&self) -> bool {
        !matches!(self, SocketError::MalformedDocument(_))
    }
}

/// Invalid configuration. Fatal: constructors fail, the process should stop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Key material is not valid base64url
    #[error("invalid base64url: {0}")]
    BadEncoding(String),

    /// Key material decoded to the wrong number of bytes
    #[error("wrong key length: expected {expected} bytes, got {actual}")]
    BadLength {
        /// Required decoded length
        expected: usize,
        /// Actual decoded length
        actual: usize,
    },
}
