//! Stream sampling strategies
//!
//! This module provides the reservoirs a histogram can sample into. Each keeps
//! a bounded number of observations but differs in which observations survive:
//!
//! - [`UniformReservoir`]: every observation ever seen is equally likely to be kept
//! - [`ExponentiallyDecayingReservoir`]: recent observations are exponentially favoured
//! - [`SlidingWindowReservoir`]: exactly the most recent observations are kept
//!
//! # Example
//!
//! ```
//! use flowhist::sampling::UniformReservoir;
//! use flowhist::traits::Reservoir;
//!
//! let reservoir = UniformReservoir::new(10);
//!
//! // Stream a million observations, keep a uniform sample of 10
//! for i in 0..1_000_000 {
//!     reservoir.update(i, None);
//! }
//!
//! let snapshot = reservoir.snapshot(false);
//! assert_eq!(snapshot.size(), 10);
//! assert_eq!(snapshot.count(), 1_000_000);
//! ```

mod exponential;
mod sliding_window;
mod uniform;

use std::sync::Arc;
use std::time::Instant;

pub use exponential::{ExponentiallyDecayingReservoir, DEFAULT_ALPHA, RESCALE_THRESHOLD};
pub use sliding_window::SlidingWindowReservoir;
pub use uniform::UniformReservoir;

/// Default number of samples kept by every reservoir
pub const DEFAULT_SIZE: usize = 1028;

/// A single retained observation.
///
/// `weight` only carries meaning for the decaying reservoir; the other
/// strategies store `1.0`.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightedSample {
    /// Observed value
    pub value: i64,
    /// Optional free-form tag recorded with the value
    pub tag: Option<Arc<str>>,
    /// Forward-decay weight at insertion time
    pub weight: f64,
    /// Arrival time
    pub timestamp: Instant,
}

impl WeightedSample {
    pub(crate) fn new(value: i64, tag: Option<&str>, weight: f64, timestamp: Instant) -> Self {
        Self {
            value,
            tag: tag.map(Arc::from),
            weight,
            timestamp,
        }
    }

    pub(crate) fn unweighted(value: i64, tag: Option<&str>, timestamp: Instant) -> Self {
        Self::new(value, tag, 1.0, timestamp)
    }
}

/// Check the capacity argument of a reservoir constructor
pub(crate) fn assert_capacity(capacity: usize) {
    assert!(capacity > 0, "capacity must be positive");
}

/// Compare capacities of two reservoirs about to be merged
pub(crate) fn check_capacity(
    expected: usize,
    found: usize,
) -> Result<(), crate::traits::MergeError> {
    if expected != found {
        return Err(crate::traits::MergeError::IncompatibleConfig {
            expected: format!("capacity={}", expected),
            found: format!("capacity={}", found),
        });
    }
    Ok(())
}
