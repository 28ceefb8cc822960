//! Appliance socket frame layer: CBC encryption with a chained MAC.
//!
//! Wire format of one binary WebSocket message:
//!
//! ```text
//! AES-256-CBC(document || padding) || HMAC-SHA256(iv || dir || prev || ct)[..16]
//! ```
//!
//! where `dir` is a single ASCII direction byte and `prev` is the tag of the
//! previous frame in the same direction (16 zero bytes for the first frame
//! of a session). The CBC state restarts from the peer's static IV on every
//! frame; replay and reordering are caught by the chain, not the cipher.
//!
//! Padding is PKCS-like but always at least two bytes: a zero byte, random
//! filler, and a final byte holding the pad length (2..=17).

use tracing::debug;

use crate::{
    crypto::{self, Cbc, BLOCK_SIZE, KEY_SIZE},
    env::Environment,
    error::SocketError,
};

/// Direction byte for frames the gateway sends ("Encrypted to appliance").
const DIR_TO_APPLIANCE: &[u8] = b"E";

/// Direction byte for frames the appliance sends ("Clear from appliance").
const DIR_FROM_APPLIANCE: &[u8] = b"C";

/// Length of the truncated chain tag.
const TAG_SIZE: usize = 16;

/// Framer for one direction pair of an appliance connection.
///
/// Owns both chain states. [`HcFramer::reset`] must be called whenever the
/// underlying socket (re)connects, and the session layer does so.
pub struct HcFramer {
    cbc: Cbc,
    mac_key: [u8; KEY_SIZE],
    iv: [u8; BLOCK_SIZE],
    tx_direction: &'static [u8],
    rx_direction: &'static [u8],
    last_tx_mac: [u8; TAG_SIZE],
    last_rx_mac: [u8; TAG_SIZE],
}

impl HcFramer {
    /// Framer for the gateway end: seals toward the appliance, opens frames
    /// coming from it. Keys are derived from the appliance pre-shared key.
    #[must_use]
    pub fn new(psk: &[u8; KEY_SIZE], iv: [u8; BLOCK_SIZE]) -> Self {
        let enc_key = crypto::derive_key(psk, b"ENC");
        let mac_key = crypto::derive_key(psk, b"MAC");
        Self {
            cbc: Cbc::new(&enc_key, iv),
            mac_key,
            iv,
            tx_direction: DIR_TO_APPLIANCE,
            rx_direction: DIR_FROM_APPLIANCE,
            last_tx_mac: [0; TAG_SIZE],
            last_rx_mac: [0; TAG_SIZE],
        }
    }

    /// Framer for the appliance end, with the direction bytes swapped.
    /// Used by simulators and tests that need to speak as the appliance.
    #[must_use]
    pub fn appliance(psk: &[u8; KEY_SIZE], iv: [u8; BLOCK_SIZE]) -> Self {
        let mut framer = Self::new(psk, iv);
        framer.tx_direction = DIR_FROM_APPLIANCE;
        framer.rx_direction = DIR_TO_APPLIANCE;
        framer
    }

    /// Reset both chains to the start-of-session state.
    pub fn reset(&mut self) {
        self.last_tx_mac = [0; TAG_SIZE];
        self.last_rx_mac = [0; TAG_SIZE];
    }

    /// Pad, encrypt and authenticate one serialized document.
    #[must_use]
    pub fn seal<E: Environment>(&mut self, env: &E, document: &[u8]) -> Vec<u8> {
        let mut pad_len = BLOCK_SIZE - document.len() % BLOCK_SIZE;
        if pad_len == 1 {
            pad_len += BLOCK_SIZE;
        }

        let mut plain = Vec::with_capacity(document.len() + pad_len);
        plain.extend_from_slice(document);
        plain.push(0);
        let random_start = plain.len();
        plain.resize(document.len() + pad_len - 1, 0);
        env.random_bytes(&mut plain[random_start..]);
        plain.push(pad_len as u8);

        let mut wire = self.cbc.encrypt(&plain);
        let tag = crypto::tag16(
            &self.mac_key,
            &[&self.iv, self.tx_direction, &self.last_tx_mac, &wire],
        );
        self.last_tx_mac = tag;
        wire.extend_from_slice(&tag);
        wire
    }

    /// Verify, decrypt and unpad one received frame, returning the document
    /// bytes.
    ///
    /// # Errors
    ///
    /// Every error from this method breaks the MAC chain and requires the
    /// session to reconnect:
    ///
    /// - [`SocketError::BadFrameSize`]: shorter than one block plus tag, or
    ///   not block aligned
    /// - [`SocketError::MacMismatch`]: chain tag mismatch (a frame was lost,
    ///   reordered or forged)
    /// - [`SocketError::BadPadding`]: authentic frame with an impossible pad
    ///   byte
    pub fn open(&mut self, wire: &[u8]) -> Result<Vec<u8>, SocketError> {
        if wire.len() < BLOCK_SIZE + TAG_SIZE || wire.len() % BLOCK_SIZE != 0 {
            return Err(SocketError::BadFrameSize { size: wire.len() });
        }

        let (ciphertext, their_tag) = wire.split_at(wire.len() - TAG_SIZE);
        let our_tag = crypto::tag16(
            &self.mac_key,
            &[&self.iv, self.rx_direction, &self.last_rx_mac, ciphertext],
        );

        if !crypto::ct_eq(their_tag, &our_tag) {
            return Err(SocketError::MacMismatch);
        }
        self.last_rx_mac = our_tag;

        let plain = self.cbc.decrypt(ciphertext);
        let pad = *plain.last().unwrap_or(&0);
        if pad as usize > plain.len() {
            return Err(SocketError::BadPadding { pad });
        }

        debug!(len = plain.len() - pad as usize, "frame authenticated");
        Ok(plain[..plain.len() - pad as usize].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::env::SystemEnv;

    const PSK: [u8; 32] = [3u8; 32];
    const IV: [u8; 16] = [9u8; 16];

    fn pair() -> (HcFramer, HcFramer) {
        (HcFramer::new(&PSK, IV), HcFramer::appliance(&PSK, IV))
    }

    #[test]
    fn seal_open_round_trip() {
        let (mut gateway, mut appliance) = pair();

        let wire = gateway.seal(&SystemEnv, b"{\"sID\":1}");
        let doc = appliance.open(&wire).expect("frame must verify");
        assert_eq!(doc, b"{\"sID\":1}");
    }

    #[test]
    fn chain_advances_per_frame() {
        let (mut gateway, mut appliance) = pair();

        let first = gateway.seal(&SystemEnv, b"one");
        let second = gateway.seal(&SystemEnv, b"two");

        assert_eq!(appliance.open(&first).expect("first verifies"), b"one");
        assert_eq!(appliance.open(&second).expect("second verifies"), b"two");
    }

    #[test]
    fn replay_after_advance_is_rejected() {
        let (mut gateway, mut appliance) = pair();

        let first = gateway.seal(&SystemEnv, b"one");
        let second = gateway.seal(&SystemEnv, b"two");

        appliance.open(&first).expect("first verifies");
        appliance.open(&second).expect("second verifies");

        // The chain has advanced past frame one; replaying it must fail.
        assert_eq!(appliance.open(&first), Err(SocketError::MacMismatch));
    }

    #[test]
    fn out_of_order_delivery_is_rejected() {
        let (mut gateway, mut appliance) = pair();

        let _lost = gateway.seal(&SystemEnv, b"one");
        let second = gateway.seal(&SystemEnv, b"two");

        assert_eq!(appliance.open(&second), Err(SocketError::MacMismatch));
    }

    #[test]
    fn size_gate() {
        let (_, mut appliance) = pair();

        assert_eq!(appliance.open(&[0u8; 16]), Err(SocketError::BadFrameSize { size: 16 }));
        assert_eq!(appliance.open(&[0u8; 33]), Err(SocketError::BadFrameSize { size: 33 }));
        assert_eq!(appliance.open(&[]), Err(SocketError::BadFrameSize { size: 0 }));
    }

    #[test]
    fn failed_open_does_not_advance_the_chain() {
        let (mut gateway, mut appliance) = pair();

        let good = gateway.seal(&SystemEnv, b"payload");
        let mut forged = good.clone();
        let forged_len = forged.len();
        forged[forged_len - 1] ^= 0xFF;

        assert_eq!(appliance.open(&forged), Err(SocketError::MacMismatch));
        // The untampered frame still verifies against the unchanged chain.
        assert_eq!(appliance.open(&good).expect("chain intact"), b"payload");
    }

    #[test]
    fn reset_rewinds_both_chains() {
        let (mut gateway, mut appliance) = pair();

        let first = gateway.seal(&SystemEnv, b"one");
        appliance.open(&first).expect("verifies");

        gateway.reset();
        appliance.reset();

        let again = gateway.seal(&SystemEnv, b"one");
        assert_eq!(appliance.open(&again).expect("fresh chain verifies"), b"one");
    }

    #[test]
    fn direction_bytes_differ_by_role() {
        // A frame the gateway seals must not verify as appliance traffic on
        // another gateway framer, even with identical keys and chains.
        let mut gateway_a = HcFramer::new(&PSK, IV);
        let mut gateway_b = HcFramer::new(&PSK, IV);

        let wire = gateway_a.seal(&SystemEnv, b"doc");
        assert_eq!(gateway_b.open(&wire), Err(SocketError::MacMismatch));
    }

    proptest! {
        #[test]
        fn padding_lengths(len in 0usize..200) {
            let (mut gateway, mut appliance) = pair();
            let document = vec![b'x'; len];

            let wire = gateway.seal(&SystemEnv, &document);
            let ciphertext_len = wire.len() - TAG_SIZE;
            let pad = ciphertext_len - len;

            prop_assert!((2..=17).contains(&pad));
            prop_assert_eq!(ciphertext_len % BLOCK_SIZE, 0);
            prop_assert_eq!(appliance.open(&wire).expect("verifies"), document);
        }
    }
}
