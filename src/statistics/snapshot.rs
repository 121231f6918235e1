//! Point-in-time statistics over a reservoir sample
//!
//! A [`Snapshot`] owns a sorted copy of the sampled values. Mean and standard
//! deviation are computed once, in a single pass with Welford's algorithm, when
//! the snapshot is built; every other statistic is a lookup into the sorted
//! values.

use std::sync::Arc;

use crate::sampling::WeightedSample;

/// Immutable statistics over the sample a reservoir held at one instant.
///
/// An empty snapshot is a valid "no data yet" result: every statistic is `0`.
///
/// # Example
///
/// ```
/// use flowhist::statistics::Snapshot;
///
/// let snapshot = Snapshot::from_values([5, 1, 4, 2, 3]);
///
/// assert_eq!(snapshot.size(), 5);
/// assert_eq!(snapshot.min(), 1);
/// assert_eq!(snapshot.max(), 5);
/// assert_eq!(snapshot.median(), 3.0);
/// assert_eq!(snapshot.value(0.125), 1.5);
/// assert!((snapshot.mean() - 3.0).abs() < 1e-9);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    /// Sampled values in ascending order
    values: Vec<i64>,
    /// Observations recorded by the reservoir, including those not retained
    count: u64,
    mean: f64,
    stddev: f64,
    min_tag: Option<Arc<str>>,
    max_tag: Option<Arc<str>>,
}

impl Snapshot {
    /// Create an empty snapshot
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from retained samples.
    ///
    /// `count` is the number of observations the reservoir recorded, which may
    /// exceed the number of samples it kept.
    pub fn from_samples<'a, I>(count: u64, samples: I) -> Self
    where
        I: IntoIterator<Item = &'a WeightedSample>,
    {
        let mut entries: Vec<(i64, Option<&Arc<str>>)> = samples
            .into_iter()
            .map(|s| (s.value, s.tag.as_ref()))
            .collect();
        entries.sort_by_key(|(value, _)| *value);

        let min_tag = entries.first().and_then(|&(_, tag)| tag.cloned());
        let max_tag = entries.last().and_then(|&(_, tag)| tag.cloned());
        let values = entries.into_iter().map(|(value, _)| value).collect();

        Self::from_sorted(values, count, min_tag, max_tag)
    }

    /// Build a snapshot from bare values, counting each as one observation.
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        let mut values: Vec<i64> = values.into_iter().collect();
        values.sort_unstable();
        let count = values.len() as u64;
        Self::from_sorted(values, count, None, None)
    }

    fn from_sorted(
        values: Vec<i64>,
        count: u64,
        min_tag: Option<Arc<str>>,
        max_tag: Option<Arc<str>>,
    ) -> Self {
        // Welford's algorithm
        let mut n = 0u64;
        let mut mean = 0.0;
        let mut m2 = 0.0;
        for &value in &values {
            n += 1;
            let value = value as f64;
            let delta = value - mean;
            mean += delta / n as f64;
            m2 += delta * (value - mean);
        }

        let stddev = if n > 1 {
            (m2 / (n - 1) as f64).sqrt()
        } else {
            0.0
        };

        Self {
            values,
            count,
            mean,
            stddev,
            min_tag,
            max_tag,
        }
    }

    /// Value at quantile `q` (0.0 to 1.0).
    ///
    /// Interpolates linearly between the two closest ranked values. `q` is
    /// clamped to `[0, 1]`; NaN is treated as 0.
    pub fn value(&self, q: f64) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }

        let q = if q.is_nan() { 0.0 } else { q.clamp(0.0, 1.0) };
        let pos = q * (self.values.len() - 1) as f64;
        let lower = pos.floor() as usize;
        let upper = pos.ceil() as usize;

        let low = self.values[lower] as f64;
        if lower == upper {
            return low;
        }
        let high = self.values[upper] as f64;
        low + (pos - lower as f64) * (high - low)
    }

    /// Median (50th percentile)
    pub fn median(&self) -> f64 {
        self.value(0.5)
    }

    /// 75th percentile
    pub fn p75(&self) -> f64 {
        self.value(0.75)
    }

    /// 95th percentile
    pub fn p95(&self) -> f64 {
        self.value(0.95)
    }

    /// 98th percentile
    pub fn p98(&self) -> f64 {
        self.value(0.98)
    }

    /// 99th percentile
    pub fn p99(&self) -> f64 {
        self.value(0.99)
    }

    /// 99.9th percentile
    pub fn p999(&self) -> f64 {
        self.value(0.999)
    }

    /// Smallest sampled value, or 0 when empty
    pub fn min(&self) -> i64 {
        self.values.first().copied().unwrap_or(0)
    }

    /// Largest sampled value, or 0 when empty
    pub fn max(&self) -> i64 {
        self.values.last().copied().unwrap_or(0)
    }

    /// Tag recorded with the smallest sampled value
    pub fn min_tag(&self) -> Option<&str> {
        self.min_tag.as_deref()
    }

    /// Tag recorded with the largest sampled value
    pub fn max_tag(&self) -> Option<&str> {
        self.max_tag.as_deref()
    }

    /// Arithmetic mean of the sampled values
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample standard deviation of the sampled values
    ///
    /// Zero for fewer than two samples.
    pub fn stddev(&self) -> f64 {
        self.stddev
    }

    /// Number of sampled values
    pub fn size(&self) -> usize {
        self.values.len()
    }

    /// Number of observations recorded since the reservoir was last reset
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Check if the snapshot holds no samples
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sampled values in ascending order
    pub fn values(&self) -> &[i64] {
        &self.values
    }
}
