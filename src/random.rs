//! Random draws used by the sampling strategies
//!
//! Reservoirs accept any [`RngCore`] so tests can feed a fixed sequence; the
//! helpers here turn raw 64-bit words into the two draws sampling needs.

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

/// Boxed random source owned by a reservoir
pub(crate) type BoxedRng = Box<dyn RngCore + Send>;

/// Fast non-cryptographic generator seeded from the OS
pub(crate) fn default_rng() -> BoxedRng {
    Box::new(SmallRng::from_entropy())
}

/// Generate random u64 in [0, bound)
///
/// Uses rejection sampling to eliminate modulo bias.
pub(crate) fn next_bounded(rng: &mut (impl RngCore + ?Sized), bound: u64) -> u64 {
    debug_assert!(bound > 0, "bound must be positive");
    // threshold = 2^64 % bound (using wrapping_neg trick)
    let threshold = bound.wrapping_neg() % bound;
    loop {
        let r = rng.next_u64();
        if r >= threshold {
            return r % bound;
        }
    }
}

/// Generate random f64 in (0, 1]
///
/// Zero is excluded since priorities divide by this draw.
pub(crate) fn next_unit_open(rng: &mut (impl RngCore + ?Sized)) -> f64 {
    const SCALE: f64 = 1.0 / (1u64 << 53) as f64;
    ((rng.next_u64() >> 11) + 1) as f64 * SCALE
}
