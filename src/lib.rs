//! # Flowhist
//!
//! Reservoir-sampled histograms for streaming measurements.
//!
//! Flowhist keeps a small, statistically representative sample of an unbounded
//! stream of `i64` observations (request latencies, payload sizes, queue depths)
//! in bounded memory, and answers percentile, min/max, mean and count queries
//! over it at any time without pausing ingestion.
//!
//! ## Features
//!
//! - **Uniform sampling**: every observation equally likely to be kept (Algorithm R)
//! - **Forward-decay sampling**: recent observations exponentially favoured
//! - **Sliding windows**: exactly the last N observations
//! - **Concurrent updates**: every reservoir is `Send + Sync` and updated through `&self`
//! - **Atomic read-and-reset**: no observation is lost or double counted across a reset
//! - **Mergeability**: same-strategy reservoirs merge for per-thread or per-process aggregation
//!
//! ## Quick Start
//!
//! ```rust
//! use flowhist::prelude::*;
//!
//! let histogram = HistogramMetric::with_sampling(SamplingType::FavourRecent);
//!
//! for latency_us in 0..10_000 {
//!     histogram.update(latency_us, None);
//! }
//!
//! let value = histogram.value(false);
//! println!("p99 latency: ~{}us", value.snapshot().p99());
//! ```
//!
//! ## Aggregation
//!
//! Reservoirs of the same strategy and configuration can be merged, so each
//! worker can record into its own histogram and a reporter can fold them
//! together:
//!
//! ```rust
//! use flowhist::prelude::*;
//!
//! let worker1 = HistogramMetric::with_sampling(SamplingType::LongTerm);
//! let worker2 = HistogramMetric::with_sampling(SamplingType::LongTerm);
//!
//! worker1.update(10, None);
//! worker2.update(20, None);
//!
//! assert!(worker1.merge(&worker2));
//! assert_eq!(worker1.value(false).count(), 2);
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable (de)serialization of [`config`] types

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod clock;
pub mod config;
pub mod histogram;
pub mod sampling;
pub mod statistics;
pub mod traits;

mod random;

pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, MonotonicClock};
    pub use crate::config::{ConfigError, ReservoirConfig, SamplingType};
    pub use crate::histogram::{HistogramMetric, HistogramValue};
    pub use crate::sampling::{
        ExponentiallyDecayingReservoir, SlidingWindowReservoir, UniformReservoir, WeightedSample,
    };
    pub use crate::statistics::Snapshot;
    pub use crate::traits::*;
}

pub use histogram::{HistogramMetric, HistogramValue};
pub use statistics::Snapshot;
