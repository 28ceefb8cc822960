//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples protocol logic from system resources
//! (time and randomness). Production drivers use [`SystemEnv`]; the harness
//! provides a virtual clock with a seeded RNG so that every retry, pacing
//! and dedup decision is reproducible.
//!
//! Protocol state machines in this crate:
//!
//! - MUST NOT call `std::time::Instant::now()` directly,
//! - MUST NOT use `rand::thread_rng()` or other ambient entropy,
//! - take the current instant as a method parameter where timing matters and
//!   draw all randomness from their stored environment.
//!
//! # Invariants
//!
//! - Monotonicity: `now()` never goes backwards within one execution.
//! - Determinism: a seeded implementation produces the same byte sequence for
//!   the same seed.

use std::{ops::Sub, time::Duration};

use rand::{rngs::OsRng, RngCore};

/// Abstract source of time and randomness.
///
/// The tick loop is single-threaded, so implementations only need `Clone`
/// (shared-handle clones are fine; the harness clock is an `Rc`).
pub trait Environment: Clone + 'static {
    /// A point in time. Subtraction yields the elapsed [`Duration`].
    type Instant: Copy + Ord + Sub<Output = Duration>;

    /// Current time. MUST never decrease between calls.
    fn now(&self) -> Self::Instant;

    /// Fill the buffer with random bytes.
    ///
    /// Production implementations MUST use cryptographically secure entropy:
    /// frame numbers, padding and nonces all feed the wire format.
    fn random_bytes(&self, dest: &mut [u8]);

    /// Random `u16`, used for payload frame numbers.
    fn random_u16(&self) -> u16 {
        let mut bytes = [0u8; 2];
        self.random_bytes(&mut bytes);
        u16::from_le_bytes(bytes)
    }

    /// Random `u32`.
    fn random_u32(&self) -> u32 {
        let mut bytes = [0u8; 4];
        self.random_bytes(&mut bytes);
        u32::from_le_bytes(bytes)
    }

    /// Uniform random duration in `[0, cap)`, used for transmit jitter.
    /// Returns zero when `cap` is zero.
    fn jitter(&self, cap: Duration) -> Duration {
        let cap_ms = cap.as_millis() as u32;
        if cap_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(u64::from(self.random_u32() % cap_ms))
    }
}

/// Production environment: real clock, OS entropy pool.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn random_bytes(&self, dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }
}
