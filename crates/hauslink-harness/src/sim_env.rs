//! Virtual-time environment with a seeded RNG.

use std::{
    cell::{Cell, RefCell},
    ops::Sub,
    rc::Rc,
    time::Duration,
};

use rand::{rngs::StdRng, RngCore, SeedableRng};

use hauslink_core::Environment;

/// A point on the simulated timeline, measured from simulation start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SimInstant(Duration);

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0 - rhs.0
    }
}

/// Simulation environment: explicit clock, seeded randomness.
///
/// Clones share the same clock and RNG, so an environment handed to several
/// state machines keeps them on one timeline. The clock only moves when the
/// test calls [`SimEnv::advance`], which makes every timeout decision in the
/// core reproducible.
#[derive(Clone)]
pub struct SimEnv {
    clock: Rc<Cell<Duration>>,
    rng: Rc<RefCell<StdRng>>,
}

impl SimEnv {
    /// Create an environment at time zero with the given RNG seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            clock: Rc::new(Cell::new(Duration::ZERO)),
            rng: Rc::new(RefCell::new(StdRng::seed_from_u64(seed))),
        }
    }

    /// Advance the virtual clock.
    pub fn advance(&self, duration: Duration) {
        self.clock.set(self.clock.get() + duration);
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.clock.get())
    }

    fn random_bytes(&self, dest: &mut [u8]) {
        self.rng.borrow_mut().fill_bytes(dest);
    }
}
