//! Statistical summaries of reservoir samples
//!
//! Reservoirs hand out [`Snapshot`]s: owned, sorted copies of their sample that
//! answer percentile, min/max, mean and standard deviation queries without any
//! further synchronization.
//!
//! # Example
//!
//! ```
//! use flowhist::statistics::Snapshot;
//!
//! let snapshot = Snapshot::from_values([1, 2, 3, 4, 5]);
//!
//! println!("Median: {}", snapshot.median());
//! println!("p99: {}", snapshot.p99());
//! println!("Stddev: {}", snapshot.stddev());
//! ```

mod snapshot;

pub use snapshot::Snapshot;
