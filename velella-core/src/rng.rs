//! Uniform random number capability.
//!
//! All sampling in the Velella crates is expressed against the [`UnitRng`]
//! trait so callers can supply their own (seeded, deterministic) generator.
//! [`Xorshift64`] is the built-in implementation; [`DefaultRng`] is a handle
//! to a process-wide generator seeded once from the system clock, used by
//! the `*_default` sampling conveniences.

use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of uniform random samples.
pub trait UnitRng {
    /// A uniform sample in `[0, 1)`.
    fn next_unit(&mut self) -> f64;

    /// A uniform integer in `[0, n)`. Returns `0` when `n` is zero.
    fn next_below(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        // next_unit() < 1, so the product stays below n; the min guards the
        // cast against rounding at large n.
        ((self.next_unit() * n as f64) as usize).min(n - 1)
    }
}

/// Minimal xorshift64 PRNG, reproducible across platforms without external
/// dependencies.
#[derive(Debug, Clone)]
pub struct Xorshift64 {
    state: u64,
}

impl Xorshift64 {
    /// Create a generator from a seed. A zero seed is remapped to a fixed
    /// odd constant (xorshift has an all-zero fixed point).
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed },
        }
    }

    /// The next raw 64-bit value.
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

impl UnitRng for Xorshift64 {
    fn next_unit(&mut self) -> f64 {
        // Top 53 bits give a uniform float in [0, 1).
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

// ---------------------------------------------------------------------------
// Process-wide default generator
// ---------------------------------------------------------------------------

static DEFAULT_RNG: OnceLock<Mutex<Xorshift64>> = OnceLock::new();

fn clock_seed() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as u64 | 1,
        Err(_) => 0x5DEE_CE66_D141_DCA5,
    }
}

/// Handle to the shared process-wide generator, constructed at first use.
///
/// Every sampling entry point in the Velella crates accepts a caller-provided
/// [`UnitRng`]; this handle backs the `*_default` conveniences for callers
/// that do not need determinism.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRng;

impl UnitRng for DefaultRng {
    fn next_unit(&mut self) -> f64 {
        let cell = DEFAULT_RNG.get_or_init(|| Mutex::new(Xorshift64::new(clock_seed())));
        let mut rng = match cell.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.next_unit()
    }
}
