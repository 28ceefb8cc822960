//! Configuration decoding and tunables.
//!
//! All key material arrives base64url encoded (the appliance profile ships
//! keys that way, and the radio link key is generated in the same alphabet).
//! Decoding is fail-stop: a wrong alphabet or a wrong decoded length returns
//! a [`ConfigError`] from the constructor and the node must not start.
//! Runtime paths never fail this way.

use std::{net::IpAddr, time::Duration};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use crate::error::ConfigError;

/// Frames either bounded queue can hold.
pub const PAYLOAD_BUFFER_SIZE: usize = 32;

/// Minimum pacing between radio transmissions, before jitter.
pub const PACKAGE_RATE_LIMIT: Duration = Duration::from_millis(1000);

/// Upper bound of the uniform jitter added to every pacing interval.
pub const JITTER_CAP: Duration = Duration::from_millis(100);

/// Transmissions of one frame before it is dropped.
///
/// With the ~1 s pacing interval this bounds a dead link to about five
/// seconds of air time per frame.
pub const MAX_SENDING_ATTEMPTS: u8 = 5;

/// Decode exactly `N` base64url bytes.
fn decode_exact<const N: usize>(encoded: &str) -> Result<[u8; N], ConfigError> {
    let decoded = URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(|e| ConfigError::BadEncoding(e.to_string()))?;

    decoded
        .try_into()
        .map_err(|v: Vec<u8>| ConfigError::BadLength { expected: N, actual: v.len() })
}

/// Shared 32-byte secret of the radio link.
#[derive(Clone)]
pub struct LinkKey(pub [u8; 32]);

impl LinkKey {
    /// Decode from the base64url form stored in the node configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the encoding is invalid or the key does
    /// not decode to exactly 32 bytes.
    pub fn from_base64url(encoded: &str) -> Result<Self, ConfigError> {
        Ok(Self(decode_exact(encoded)?))
    }
}

/// Pre-shared key and IV of one appliance, from its local profile.
#[derive(Clone)]
pub struct SocketCredentials {
    /// 32-byte pre-shared key.
    pub psk: [u8; 32],
    /// 16-byte static IV. Reused for every frame by protocol design; the
    /// chained MAC, not the IV, provides freshness.
    pub iv: [u8; 16],
}

impl SocketCredentials {
    /// Decode both values from their base64url forms.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if either value fails to decode or has the
    /// wrong length.
    pub fn from_base64url(psk: &str, iv: &str) -> Result<Self, ConfigError> {
        Ok(Self { psk: decode_exact(psk)?, iv: decode_exact(iv)? })
    }
}

/// Network endpoint of the appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Appliance IP address on the local network.
    pub ip: IpAddr,
    /// WebSocket port, usually 80.
    pub port: u16,
}

/// RF parameters handed through to the radio driver.
///
/// The core never interprets these; they exist so one configuration struct
/// can describe a node completely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioParams {
    /// Center frequency in Hz (e.g. 868 MHz band).
    pub band_hz: u32,
    /// LoRa spreading factor (7..=12).
    pub spreading_factor: u8,
    /// Signal bandwidth in Hz.
    pub bandwidth_hz: u32,
    /// Sync word separating this network from others on the band.
    pub sync_word: u8,
    /// Transmit power in dBm.
    pub tx_power_dbm: i8,
    /// Route power through the PA_BOOST pin.
    pub pa_boost: bool,
}

/// Timing and capacity knobs of the radio sender.
#[derive(Debug, Clone, Copy)]
pub struct Tunables {
    /// Minimum delay between transmissions, before jitter. Keeps the node
    /// within sub-GHz duty-cycle regulations.
    pub package_rate_limit: Duration,
    /// Upper bound of the uniform jitter added per transmission.
    pub jitter_cap: Duration,
    /// Transmissions of one frame before giving up.
    pub max_sending_attempts: u8,
    /// Flush the aggregation buffer after it has dwelt this long without new
    /// records. `None` means only explicit flushes and overflow flush.
    pub collect_time: Option<Duration>,
    /// Capacity of the staging and acknowledge queues.
    pub queue_capacity: usize,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            package_rate_limit: PACKAGE_RATE_LIMIT,
            jitter_cap: JITTER_CAP,
            max_sending_attempts: MAX_SENDING_ATTEMPTS,
            collect_time: None,
            queue_capacity: PAYLOAD_BUFFER_SIZE,
        }
    }
}
