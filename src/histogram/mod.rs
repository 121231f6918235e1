//! Histogram metrics backed by a sampling reservoir
//!
//! A [`HistogramMetric`] forwards every observation to one [`Reservoir`] and
//! remembers the most recent value and tag. Reading it yields a
//! [`HistogramValue`]: that last observation paired with a snapshot of the
//! reservoir.
//!
//! # Example
//!
//! ```
//! use flowhist::config::SamplingType;
//! use flowhist::histogram::HistogramMetric;
//!
//! let histogram = HistogramMetric::with_sampling(SamplingType::LongTerm);
//!
//! for latency_us in [120, 95, 310, 101, 88] {
//!     histogram.update(latency_us, None);
//! }
//! histogram.update(4_000, Some("GET /slow"));
//!
//! let value = histogram.value(false);
//! assert_eq!(value.last_value(), 4_000);
//! assert_eq!(value.last_tag(), Some("GET /slow"));
//! assert_eq!(value.snapshot().max_tag(), Some("GET /slow"));
//! assert_eq!(value.count(), 6);
//! ```

use std::fmt;
use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{ConfigError, ReservoirConfig, SamplingType};
use crate::sampling::{ExponentiallyDecayingReservoir, SlidingWindowReservoir, UniformReservoir};
use crate::statistics::Snapshot;
use crate::traits::{MetricValueProvider, Reservoir};

/// The externally visible reading of a histogram
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HistogramValue {
    last_value: i64,
    last_tag: Option<Arc<str>>,
    snapshot: Snapshot,
}

impl HistogramValue {
    /// Create a value from its parts
    pub fn new(last_value: i64, last_tag: Option<Arc<str>>, snapshot: Snapshot) -> Self {
        Self {
            last_value,
            last_tag,
            snapshot,
        }
    }

    /// Most recently recorded value, or 0 if nothing was recorded since the last reset
    pub fn last_value(&self) -> i64 {
        self.last_value
    }

    /// Tag recorded with the most recent value
    pub fn last_tag(&self) -> Option<&str> {
        self.last_tag.as_deref()
    }

    /// Statistics over the sampled values
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Number of observations recorded since the last reset
    pub fn count(&self) -> u64 {
        self.snapshot.count()
    }

    /// Consume the value, keeping only its snapshot
    pub fn into_snapshot(self) -> Snapshot {
        self.snapshot
    }
}

/// Last observation slot; the empty state is value 0 with no tag
#[derive(Clone, Debug, Default)]
struct LastObservation {
    value: i64,
    tag: Option<Arc<str>>,
}

/// Histogram of `i64` observations sampled by a reservoir.
///
/// # Thread Safety
///
/// `HistogramMetric` is `Send + Sync`. The reservoir synchronizes itself, and
/// the last-observation slot sits behind its own mutex. An update writes the
/// slot and then the reservoir; the two writes are each consistent but not
/// atomic together, so a concurrent read can see one without the other.
pub struct HistogramMetric {
    reservoir: Box<dyn Reservoir>,
    last: Mutex<LastObservation>,
}

impl Default for HistogramMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HistogramMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistogramMetric")
            .field("reservoir", &self.reservoir)
            .finish_non_exhaustive()
    }
}

impl HistogramMetric {
    /// Create a histogram that favours recent observations
    pub fn new() -> Self {
        Self::with_sampling(SamplingType::FavourRecent)
    }

    /// Create a histogram with the default reservoir for a sampling strategy
    pub fn with_sampling(sampling: SamplingType) -> Self {
        let reservoir: Box<dyn Reservoir> = match sampling {
            SamplingType::FavourRecent => Box::<ExponentiallyDecayingReservoir>::default(),
            SamplingType::LongTerm => Box::<UniformReservoir>::default(),
            SamplingType::SlidingWindow => Box::<SlidingWindowReservoir>::default(),
        };
        Self::with_reservoir(reservoir)
    }

    /// Create a histogram over a pre-built reservoir
    pub fn with_reservoir(reservoir: Box<dyn Reservoir>) -> Self {
        Self {
            reservoir,
            last: Mutex::new(LastObservation::default()),
        }
    }

    /// Create a histogram from configuration
    ///
    /// Fails if the configuration does not describe a valid reservoir.
    pub fn from_config(config: &ReservoirConfig) -> Result<Self, ConfigError> {
        config.build().map(Self::with_reservoir)
    }

    /// Record an observation
    pub fn update(&self, value: i64, tag: Option<&str>) {
        *self.last.lock() = LastObservation {
            value,
            tag: tag.map(Arc::from),
        };
        self.reservoir.update(value, tag);
    }

    /// Read the histogram
    ///
    /// With `reset`, the reservoir is cleared atomically with its snapshot and
    /// the last observation returns to its empty state.
    pub fn value(&self, reset: bool) -> HistogramValue {
        let snapshot = self.reservoir.snapshot(reset);
        let last = if reset {
            mem::take(&mut *self.last.lock())
        } else {
            self.last.lock().clone()
        };
        HistogramValue::new(last.value, last.tag, snapshot)
    }

    /// Merge another histogram's samples into this one
    ///
    /// Returns `false` without changing either histogram if their reservoirs
    /// use different strategies or incompatible settings. The last observation
    /// is not merged.
    pub fn merge(&self, other: &HistogramMetric) -> bool {
        self.reservoir.merge(other.reservoir.as_ref())
    }

    /// Clear the last observation and the reservoir
    pub fn reset(&self) {
        *self.last.lock() = LastObservation::default();
        self.reservoir.reset();
    }

    /// The reservoir this histogram samples into
    pub fn reservoir(&self) -> &dyn Reservoir {
        self.reservoir.as_ref()
    }
}

impl MetricValueProvider for HistogramMetric {
    type Value = HistogramValue;

    fn value(&self, reset: bool) -> HistogramValue {
        HistogramMetric::value(self, reset)
    }

    fn merge(&self, other: &Self) -> bool {
        HistogramMetric::merge(self, other)
    }
}
