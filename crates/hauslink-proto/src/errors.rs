//! Error types for the radio wire formats.
//!
//! All errors are structured and testable. Note that most radio-side failure
//! handling is "drop and continue" (a bad frame may simply be noise), so these
//! errors describe *why* a frame was dropped rather than driving recovery.

use thiserror::Error;

/// Errors that can occur while building or parsing radio frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame bytes are shorter than the fixed frame size
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Expected size in bytes
        expected: usize,
        /// Actual size received
        actual: usize,
    },

    /// Frame size is not a whole number of cipher blocks within the limit
    #[error("bad frame size: {size} bytes is not a valid radio frame")]
    BadFrameSize {
        /// The offending size
        size: usize,
    },

    /// The length field points past the end of the received frame
    #[error("length out of range: {length} data bytes do not fit a {frame}-byte frame")]
    LengthOutOfRange {
        /// Claimed number of valid data bytes
        length: u8,
        /// Size of the frame the length was read from
        frame: usize,
    },
}

/// Convenient Result type alias for wire format operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
