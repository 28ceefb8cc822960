//! Cryptographic primitives shared by both channels.
//!
//! Thin wrappers over the RustCrypto block cipher and MAC traits:
//!
//! - HMAC-SHA256 key derivation with ASCII labels (both channels derive an
//!   encryption key and a MAC key from one shared secret),
//! - AES-256 ECB block operations for the radio frames (each frame is at most
//!   three blocks and is re-randomized end to end by its random number field
//!   and random tail, so a streaming mode buys nothing on this link),
//! - AES-256 CBC for the appliance socket, with the peer's static IV applied
//!   per frame (freshness comes from the chained MAC, not from the IV),
//! - truncated HMAC tags (4 bytes on the radio, 16 on the socket) compared in
//!   constant time.

use aes::{
    cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit},
    Aes256,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Size of every key in the system: shared secrets and derived keys.
pub const KEY_SIZE: usize = 32;

/// AES block size.
pub const BLOCK_SIZE: usize = 16;

/// Derive a subkey as `HMAC-SHA256(base, label)`.
///
/// Labels in use: `b"LORAENC"` / `b"LORAMAC"` for the radio link and
/// `b"ENC"` / `b"MAC"` for the appliance socket.
#[must_use]
pub fn derive_key(base: &[u8; KEY_SIZE], label: &[u8]) -> [u8; KEY_SIZE] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(base).expect("HMAC accepts keys of any length");
    mac.update(label);
    mac.finalize().into_bytes().into()
}

/// HMAC-SHA256 over the concatenation of `parts`.
#[must_use]
pub fn hmac_sha256(key: &[u8; KEY_SIZE], parts: &[&[u8]]) -> [u8; 32] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts keys of any length");
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// First four bytes of an HMAC-SHA256, the radio frame tag.
///
/// Four bytes is all the 48-byte frame budget allows; the forgery bound is
/// 2^-32 per frame, which the duty-cycle-limited link cannot grind.
#[must_use]
pub fn tag4(key: &[u8; KEY_SIZE], parts: &[&[u8]]) -> [u8; 4] {
    let full = hmac_sha256(key, parts);
    [full[0], full[1], full[2], full[3]]
}

/// First sixteen bytes of an HMAC-SHA256, the socket frame tag.
#[must_use]
pub fn tag16(key: &[u8; KEY_SIZE], parts: &[&[u8]]) -> [u8; 16] {
    let full = hmac_sha256(key, parts);
    let mut tag = [0u8; 16];
    tag.copy_from_slice(&full[..16]);
    tag
}

/// Constant-time equality for MAC tags.
#[must_use]
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// AES-256 in ECB mode over whole blocks.
#[derive(Clone)]
pub struct Ecb {
    cipher: Aes256,
}

impl Ecb {
    /// Build the cipher from a derived encryption key.
    #[must_use]
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self { cipher: Aes256::new(GenericArray::from_slice(key)) }
    }

    /// Encrypt `buf` in place. `buf.len()` must be a multiple of 16; callers
    /// validate frame sizes before any crypto runs.
    pub fn encrypt_in_place(&self, buf: &mut [u8]) {
        debug_assert_eq!(buf.len() % BLOCK_SIZE, 0);
        for block in buf.chunks_exact_mut(BLOCK_SIZE) {
            self.cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }
    }

    /// Decrypt `buf` in place. Same length requirement as encryption.
    pub fn decrypt_in_place(&self, buf: &mut [u8]) {
        debug_assert_eq!(buf.len() % BLOCK_SIZE, 0);
        for block in buf.chunks_exact_mut(BLOCK_SIZE) {
            self.cipher.decrypt_block(GenericArray::from_mut_slice(block));
        }
    }
}

/// AES-256 in CBC mode with a static per-peer IV.
///
/// The chain state is reset to the IV on every call: each socket frame is an
/// independent CBC message. Reusing the IV across frames is a deliberate
/// protocol property; the chained MAC provides freshness.
#[derive(Clone)]
pub struct Cbc {
    cipher: Aes256,
    iv: [u8; BLOCK_SIZE],
}

impl Cbc {
    /// Build the cipher from a derived encryption key and the peer's IV.
    #[must_use]
    pub fn new(key: &[u8; KEY_SIZE], iv: [u8; BLOCK_SIZE]) -> Self {
        Self { cipher: Aes256::new(GenericArray::from_slice(key)), iv }
    }

    /// Encrypt one whole-block message. `plain.len()` must be a multiple of
    /// 16; the framer pads before calling.
    #[must_use]
    pub fn encrypt(&self, plain: &[u8]) -> Vec<u8> {
        debug_assert_eq!(plain.len() % BLOCK_SIZE, 0);

        let mut out = plain.to_vec();
        let mut chain = self.iv;
        for block in out.chunks_exact_mut(BLOCK_SIZE) {
            for (byte, prev) in block.iter_mut().zip(chain.iter()) {
                *byte ^= prev;
            }
            self.cipher.encrypt_block(GenericArray::from_mut_slice(block));
            chain.copy_from_slice(block);
        }
        out
    }

    /// Decrypt one whole-block message.
    #[must_use]
    pub fn decrypt(&self, ciphertext: &[u8]) -> Vec<u8> {
        debug_assert_eq!(ciphertext.len() % BLOCK_SIZE, 0);

        let mut out = ciphertext.to_vec();
        let mut chain = self.iv;
        for (block, ct_block) in
            out.chunks_exact_mut(BLOCK_SIZE).zip(ciphertext.chunks_exact(BLOCK_SIZE))
        {
            self.cipher.decrypt_block(GenericArray::from_mut_slice(block));
            for (byte, prev) in block.iter_mut().zip(chain.iter()) {
                *byte ^= prev;
            }
            chain.copy_from_slice(ct_block);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes256_known_answer() {
        // FIPS-197 appendix C.3
        let key: [u8; 32] = (0u8..32).collect::<Vec<u8>>().try_into().unwrap();
        let mut block = hex::decode("00112233445566778899aabbccddeeff").unwrap();

        let ecb = Ecb::new(&key);
        ecb.encrypt_in_place(&mut block);
        assert_eq!(hex::encode(&block), "8ea2b7ca516745bfeafc49904b496089");

        ecb.decrypt_in_place(&mut block);
        assert_eq!(hex::encode(&block), "00112233445566778899aabbccddeeff");
    }

    #[test]
    fn hmac_known_answer() {
        // RFC 4231 test case 2, with the short key zero-extended to 32 bytes
        // (HMAC pads short keys with zeros, so the tag is unchanged).
        let mut key = [0u8; KEY_SIZE];
        key[..4].copy_from_slice(b"Jefe");

        let tag = hmac_sha256(&key, &[b"what do ya want ", b"for nothing?"]);
        assert_eq!(
            hex::encode(tag),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn derivation_labels_separate() {
        let base = [7u8; KEY_SIZE];
        assert_ne!(derive_key(&base, b"LORAENC"), derive_key(&base, b"LORAMAC"));
        assert_ne!(derive_key(&base, b"ENC"), derive_key(&base, b"MAC"));
    }

    #[test]
    fn cbc_chains_identical_blocks() {
        let key = [1u8; KEY_SIZE];
        let cbc = Cbc::new(&key, [2u8; BLOCK_SIZE]);

        let plain = [0xABu8; 32];
        let ct = cbc.encrypt(&plain);

        // Identical plaintext blocks must encrypt differently under CBC.
        assert_ne!(&ct[..16], &ct[16..]);
        assert_eq!(cbc.decrypt(&ct), plain);
    }

    #[test]
    fn cbc_state_resets_per_frame() {
        let key = [1u8; KEY_SIZE];
        let cbc = Cbc::new(&key, [2u8; BLOCK_SIZE]);

        let plain = [0x55u8; 16];
        assert_eq!(cbc.encrypt(&plain), cbc.encrypt(&plain));
    }

    #[test]
    fn truncated_tags_are_prefixes() {
        let key = [9u8; KEY_SIZE];
        let full = hmac_sha256(&key, &[b"abc"]);
        assert_eq!(tag4(&key, &[b"abc"]), full[..4]);
        assert_eq!(tag16(&key, &[b"abc"]), full[..16]);
    }

    #[test]
    fn ct_eq_basic() {
        assert!(ct_eq(&[1, 2, 3], &[1, 2, 3]));
        assert!(!ct_eq(&[1, 2, 3], &[1, 2, 4]));
    }
}
