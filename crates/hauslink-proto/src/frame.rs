//! Radio frame types with manual wire serialization.
//!
//! Both frame shapes are serialized by hand (Little Endian `number`) instead
//! of relying on in-memory struct layout, so the wire image is identical on
//! every target. Their sizes are pinned by tests rather than `repr` tricks.
//!
//! # Layout
//!
//! Payload frame (up to 48 bytes, always whole 16-byte blocks):
//!
//! ```text
//! [hash: 4][number: 2 LE][length: 1][data: up to 41]
//! ```
//!
//! Acknowledge frame (exactly 16 bytes):
//!
//! ```text
//! [hash: 4][number: 2 LE][pad: 10]
//! ```
//!
//! The `hash` field holds the first four bytes of an HMAC-SHA256 over the
//! *rest* of the frame; the field itself is excluded from the MAC input. The
//! sender transmits the shortest whole-block prefix that covers the valid
//! data, so payload frames are 16, 32 or 48 bytes on the air.

use crate::errors::{ProtocolError, Result};

/// Largest radio frame. In the EU the maximum permitted payload over all
/// LoRa data rates is 51 bytes; 48 is the next smaller whole-block size.
pub const MAX_FRAME_SIZE: usize = 48;

/// Size of the acknowledge frame, a single cipher block.
pub const ACK_FRAME_SIZE: usize = 16;

/// AES block size; every frame is a whole number of these.
pub const BLOCK_SIZE: usize = 16;

/// Truncated MAC prefix at the start of every frame.
pub const HASH_SIZE: usize = 4;

/// Bytes of record data a payload frame can carry.
pub const DATA_SIZE: usize = MAX_FRAME_SIZE - HASH_SIZE - 2 - 1;

/// Forward datagram carrying a packed record stream.
///
/// # Invariants
///
/// - `length <= DATA_SIZE` (41). [`PayloadFrame::from_bytes`] additionally
///   requires the valid data to fit inside the received frame.
/// - The serialized size is exactly [`MAX_FRAME_SIZE`]; only the first
///   [`PayloadFrame::wire_len`] bytes go on the air.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadFrame {
    /// First four bytes of the frame MAC. Excluded from the MAC input.
    pub hash: [u8; HASH_SIZE],
    /// Random per-frame message id, reused on retransmission.
    pub number: u16,
    /// Number of valid bytes in `data`.
    pub length: u8,
    /// Packed record stream; the tail past `length` is random filler.
    pub data: [u8; DATA_SIZE],
}

impl PayloadFrame {
    /// Size of the fully serialized frame (48 bytes).
    pub const SIZE: usize = MAX_FRAME_SIZE;

    /// Bytes preceding the data area: hash, number and length.
    pub const HEADER_SIZE: usize = HASH_SIZE + 2 + 1;

    /// Create an empty frame (all fields zero).
    #[must_use]
    pub fn empty() -> Self {
        Self { hash: [0; HASH_SIZE], number: 0, length: 0, data: [0; DATA_SIZE] }
    }

    /// Number of bytes this frame occupies on the air: the smallest whole
    /// number of cipher blocks covering the header and the valid data.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        (Self::HEADER_SIZE + self.length as usize).next_multiple_of(BLOCK_SIZE)
    }

    /// Serialize the full 48-byte frame image.
    ///
    /// Callers that transmit must slice to [`PayloadFrame::wire_len`].
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.hash);
        bytes[4..6].copy_from_slice(&self.number.to_le_bytes());
        bytes[6] = self.length;
        bytes[7..].copy_from_slice(&self.data);
        bytes
    }

    /// Parse a decrypted frame from its wire image.
    ///
    /// Accepts the three legal wire sizes (16, 32, 48). Data bytes past the
    /// end of a truncated frame read as zero; a conforming sender never
    /// claims valid data there.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::BadFrameSize`] if the size is not 16, 32 or 48
    /// - [`ProtocolError::LengthOutOfRange`] if the length field points past
    ///   the end of the received frame
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() || bytes.len() > Self::SIZE || bytes.len() % BLOCK_SIZE != 0 {
            return Err(ProtocolError::BadFrameSize { size: bytes.len() });
        }

        let length = bytes[6];
        if Self::HEADER_SIZE + length as usize > bytes.len() {
            return Err(ProtocolError::LengthOutOfRange { length, frame: bytes.len() });
        }

        let mut frame = Self::empty();
        frame.hash.copy_from_slice(&bytes[0..4]);
        frame.number = u16::from_le_bytes([bytes[4], bytes[5]]);
        frame.length = length;
        frame.data[..bytes.len() - Self::HEADER_SIZE].copy_from_slice(&bytes[Self::HEADER_SIZE..]);

        Ok(frame)
    }
}

/// Reverse datagram acknowledging one payload frame.
///
/// `number` is copied from the payload being acknowledged; `pad` must be
/// filled with random bytes before sealing so identical acknowledgements
/// never produce identical ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckFrame {
    /// First four bytes of the frame MAC. Excluded from the MAC input.
    pub hash: [u8; HASH_SIZE],
    /// Message id of the payload being acknowledged.
    pub number: u16,
    /// Random filler up to the block boundary.
    pub pad: [u8; ACK_FRAME_SIZE - HASH_SIZE - 2],
}

impl AckFrame {
    /// Size of the serialized frame (16 bytes).
    pub const SIZE: usize = ACK_FRAME_SIZE;

    /// Create an acknowledge for the given payload number, padding zeroed.
    #[must_use]
    pub fn for_number(number: u16) -> Self {
        Self { hash: [0; HASH_SIZE], number, pad: [0; Self::SIZE - HASH_SIZE - 2] }
    }

    /// Serialize the 16-byte frame image.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.hash);
        bytes[4..6].copy_from_slice(&self.number.to_le_bytes());
        bytes[6..].copy_from_slice(&self.pad);
        bytes
    }

    /// Parse a decrypted acknowledge frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FrameTooShort`] or
    /// [`ProtocolError::BadFrameSize`] unless the input is exactly 16 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(ProtocolError::FrameTooShort { expected: Self::SIZE, actual: bytes.len() });
        }
        if bytes.len() > Self::SIZE {
            return Err(ProtocolError::BadFrameSize { size: bytes.len() });
        }

        let mut frame = Self::for_number(u16::from_le_bytes([bytes[4], bytes[5]]));
        frame.hash.copy_from_slice(&bytes[0..4]);
        frame.pad.copy_from_slice(&bytes[6..]);

        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn arbitrary_data() -> impl Strategy<Value = [u8; DATA_SIZE]> {
        prop::collection::vec(any::<u8>(), DATA_SIZE).prop_map(|v| {
            let mut arr = [0u8; DATA_SIZE];
            arr.copy_from_slice(&v);
            arr
        })
    }

    impl Arbitrary for PayloadFrame {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
            (any::<[u8; 4]>(), any::<u16>(), 0u8..=DATA_SIZE as u8, arbitrary_data())
                .prop_map(|(hash, number, length, data)| PayloadFrame {
                    hash,
                    number,
                    length,
                    data,
                })
                .boxed()
        }
    }

    #[test]
    fn frame_sizes() {
        assert_eq!(PayloadFrame::empty().to_bytes().len(), 48);
        assert_eq!(AckFrame::for_number(0).to_bytes().len(), 16);
        assert_eq!(DATA_SIZE, 41);
        assert_eq!(PayloadFrame::HEADER_SIZE, 7);
    }

    #[test]
    fn wire_len_bands() {
        let mut frame = PayloadFrame::empty();

        // 7 header bytes alone round up to one block
        assert_eq!(frame.wire_len(), 16);

        frame.length = 9; // 7 + 9 = 16, exact block
        assert_eq!(frame.wire_len(), 16);

        frame.length = 10;
        assert_eq!(frame.wire_len(), 32);

        frame.length = 25; // 7 + 25 = 32, exact
        assert_eq!(frame.wire_len(), 32);

        frame.length = 26;
        assert_eq!(frame.wire_len(), 48);

        frame.length = DATA_SIZE as u8; // 7 + 41 = 48
        assert_eq!(frame.wire_len(), 48);
    }

    proptest! {
        #[test]
        fn payload_round_trip(frame in any::<PayloadFrame>()) {
            let bytes = frame.to_bytes();
            let parsed = PayloadFrame::from_bytes(&bytes).expect("should parse");
            prop_assert_eq!(frame, parsed);
        }

        #[test]
        fn truncated_wire_round_trip(frame in any::<PayloadFrame>()) {
            // Parsing only the on-air prefix must preserve all valid data.
            let bytes = frame.to_bytes();
            let parsed = PayloadFrame::from_bytes(&bytes[..frame.wire_len()]).expect("should parse");

            prop_assert_eq!(frame.number, parsed.number);
            prop_assert_eq!(frame.length, parsed.length);
            prop_assert_eq!(
                &frame.data[..frame.length as usize],
                &parsed.data[..parsed.length as usize]
            );
        }

        #[test]
        fn reject_bad_sizes(size in 0usize..=64) {
            let bytes = vec![0u8; size];
            let result = PayloadFrame::from_bytes(&bytes);
            if size == 0 || size > MAX_FRAME_SIZE || size % BLOCK_SIZE != 0 {
                let is_bad_frame_size = matches!(result, Err(ProtocolError::BadFrameSize { .. }));
                prop_assert!(is_bad_frame_size);
            } else {
                prop_assert!(result.is_ok());
            }
        }
    }

    #[test]
    fn reject_length_past_frame_end() {
        // A 16-byte frame can carry at most 9 valid data bytes.
        let mut bytes = [0u8; 16];
        bytes[6] = 10;

        let result = PayloadFrame::from_bytes(&bytes);
        assert_eq!(result, Err(ProtocolError::LengthOutOfRange { length: 10, frame: 16 }));
    }

    #[test]
    fn ack_round_trip() {
        let mut ack = AckFrame::for_number(0xBEEF);
        ack.hash = [1, 2, 3, 4];
        ack.pad = [9; 10];

        let bytes = ack.to_bytes();
        let parsed = AckFrame::from_bytes(&bytes).expect("should parse");
        assert_eq!(ack, parsed);
    }

    #[test]
    fn ack_rejects_wrong_size() {
        assert!(matches!(
            AckFrame::from_bytes(&[0u8; 15]),
            Err(ProtocolError::FrameTooShort { .. })
        ));
        assert!(matches!(
            AckFrame::from_bytes(&[0u8; 48]),
            Err(ProtocolError::BadFrameSize { .. })
        ));
    }
}
