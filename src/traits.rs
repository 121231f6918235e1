//! Core traits for reservoirs and metric value providers
//!
//! Every sampling strategy implements [`Reservoir`], the four-operation contract
//! a histogram drives. Metrics that can be read and aggregated by a reporting
//! tier implement [`MetricValueProvider`].

use core::any::Any;
use core::fmt::Debug;

use thiserror::Error;

use crate::statistics::Snapshot;

/// Error during reservoir merge operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    /// The other reservoir uses a different sampling strategy
    #[error("incompatible strategy: expected {expected}, found {found}")]
    IncompatibleStrategy {
        expected: &'static str,
        found: &'static str,
    },
    /// Reservoirs have incompatible configurations
    #[error("incompatible config: expected {expected}, found {found}")]
    IncompatibleConfig { expected: String, found: String },
}

/// A bounded sample of an unbounded stream of measurements.
///
/// All operations take `&self`: implementations synchronize internally so a
/// single reservoir can be shared between many producer threads and a reader.
pub trait Reservoir: Send + Sync + Debug {
    /// Record one observation with an optional tag.
    fn update(&self, value: i64, tag: Option<&str>);

    /// Take a snapshot of the current sample.
    ///
    /// When `reset` is true the sample is cleared in the same critical section
    /// that copies it, so every observation lands either in the returned
    /// snapshot or in the emptied reservoir, never in both.
    fn snapshot(&self, reset: bool) -> Snapshot;

    /// Merge another reservoir into this one.
    ///
    /// Returns `false`, leaving both reservoirs untouched, if `other` is a
    /// different strategy or has an incompatible configuration. `other` is only
    /// read.
    fn merge(&self, other: &dyn Reservoir) -> bool;

    /// Clear the sample.
    fn reset(&self);

    /// Short name of the sampling strategy, used in merge diagnostics.
    fn strategy(&self) -> &'static str;

    /// Upcast used by `merge` to recover the concrete strategy of `other`.
    fn as_any(&self) -> &dyn Any;
}

/// A metric whose current value can be read by a reporter and folded together
/// with other metrics of the same kind.
pub trait MetricValueProvider {
    /// The value produced on each read
    type Value;

    /// Read the current value, optionally resetting the metric atomically.
    fn value(&self, reset: bool) -> Self::Value;

    /// Merge another metric into this one, returning `false` if they are incompatible.
    fn merge(&self, other: &Self) -> bool;
}

/// Downcast `other` to the concrete strategy `R`, reporting a mismatch as a
/// [`MergeError`].
pub(crate) fn downcast_other<'a, R: Reservoir + 'static>(
    this: &R,
    other: &'a dyn Reservoir,
) -> Result<&'a R, MergeError> {
    other
        .as_any()
        .downcast_ref::<R>()
        .ok_or(MergeError::IncompatibleStrategy {
            expected: this.strategy(),
            found: other.strategy(),
        })
}

/// Collapse a merge result into the boolean the [`Reservoir`] contract returns,
/// logging the rejection reason.
pub(crate) fn merge_outcome(strategy: &'static str, result: Result<(), MergeError>) -> bool {
    match result {
        Ok(()) => true,
        Err(error) => {
            tracing::debug!(strategy, %error, "Rejected reservoir merge.");
            false
        }
    }
}
