//! Sealing and opening of radio frames.
//!
//! Both directions share one [`LinkCrypto`]: the keys are symmetric and both
//! nodes can build payloads and acknowledges. The MAC always covers the
//! plaintext frame with the leading hash field excluded, and only the bytes
//! that actually go on the air (a truncated frame MACs its truncated image).
//!
//! ECB is a deliberate choice on this link: every frame fits in at most
//! three blocks and is re-randomized end to end by its random `number` and
//! random tail filler. This is the weakest link of the radio security model
//! and must not change without a protocol version bump.

use hauslink_proto::{AckFrame, PayloadFrame, DATA_SIZE, HASH_SIZE};

use crate::{
    config::LinkKey,
    crypto::{self, Ecb, KEY_SIZE},
    env::Environment,
};

/// An encrypted payload frame ready for the air.
#[derive(Debug, Clone)]
pub struct SealedPayload {
    /// Message number chosen for this frame; the acknowledge must echo it.
    pub number: u16,
    /// Full 48-byte encrypted image; only `wire_len` bytes are transmitted.
    pub bytes: [u8; PayloadFrame::SIZE],
    /// Bytes that go on the air (16, 32 or 48).
    pub wire_len: usize,
}

/// Frame-level crypto for one radio link.
#[derive(Clone)]
pub struct LinkCrypto {
    ecb: Ecb,
    mac_key: [u8; KEY_SIZE],
}

impl LinkCrypto {
    /// Derive the link keys from the shared secret.
    #[must_use]
    pub fn new(key: &LinkKey) -> Self {
        let enc_key = crypto::derive_key(&key.0, b"LORAENC");
        let mac_key = crypto::derive_key(&key.0, b"LORAMAC");
        Self { ecb: Ecb::new(&enc_key), mac_key }
    }

    /// Seal a record buffer into an encrypted payload frame.
    ///
    /// Picks a fresh random message number, fills the unused data tail with
    /// random bytes, MACs the truncated plaintext and encrypts it.
    #[must_use]
    pub fn seal_payload<E: Environment>(
        &self,
        env: &E,
        mut data: [u8; DATA_SIZE],
        length: u8,
    ) -> SealedPayload {
        let length = length.min(DATA_SIZE as u8);
        let number = env.random_u16();
        env.random_bytes(&mut data[length as usize..]);

        let frame = PayloadFrame { hash: [0; HASH_SIZE], number, length, data };
        let wire_len = frame.wire_len();
        let mut bytes = frame.to_bytes();

        let tag = crypto::tag4(&self.mac_key, &[&bytes[HASH_SIZE..wire_len]]);
        bytes[..HASH_SIZE].copy_from_slice(&tag);

        self.ecb.encrypt_in_place(&mut bytes[..wire_len]);

        SealedPayload { number, bytes, wire_len }
    }

    /// Decrypt and verify a payload frame.
    ///
    /// Returns `None` for illegal sizes (the receiver gates those before
    /// queueing), on MAC mismatch, and for a length field that points past
    /// the frame: all are indistinguishable from noise and are dropped
    /// without a trace on the air.
    #[must_use]
    pub fn open_payload(&self, wire: &[u8]) -> Option<PayloadFrame> {
        if wire.is_empty() || wire.len() > PayloadFrame::SIZE || wire.len() % 16 != 0 {
            return None;
        }

        let mut plain = [0u8; PayloadFrame::SIZE];
        plain[..wire.len()].copy_from_slice(wire);
        self.ecb.decrypt_in_place(&mut plain[..wire.len()]);

        let expected = crypto::tag4(&self.mac_key, &[&plain[HASH_SIZE..wire.len()]]);
        if !crypto::ct_eq(&plain[..HASH_SIZE], &expected) {
            return None;
        }

        PayloadFrame::from_bytes(&plain[..wire.len()]).ok()
    }

    /// Seal an acknowledge for the given payload number.
    #[must_use]
    pub fn seal_ack<E: Environment>(&self, env: &E, number: u16) -> [u8; AckFrame::SIZE] {
        let mut frame = AckFrame::for_number(number);
        env.random_bytes(&mut frame.pad);

        let mut bytes = frame.to_bytes();
        let tag = crypto::tag4(&self.mac_key, &[&bytes[HASH_SIZE..]]);
        bytes[..HASH_SIZE].copy_from_slice(&tag);

        self.ecb.encrypt_in_place(&mut bytes);
        bytes
    }

    /// Decrypt and verify an acknowledge, returning the acknowledged number.
    #[must_use]
    pub fn open_ack(&self, wire: &[u8; AckFrame::SIZE]) -> Option<u16> {
        let mut plain = *wire;
        self.ecb.decrypt_in_place(&mut plain);

        let expected = crypto::tag4(&self.mac_key, &[&plain[HASH_SIZE..]]);
        if !crypto::ct_eq(&plain[..HASH_SIZE], &expected) {
            return None;
        }

        Some(u16::from_le_bytes([plain[4], plain[5]]))
    }
}
