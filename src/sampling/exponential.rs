//! Forward-decay reservoir sampling for recency-biased distributions
//!
//! Implementation of forward-decay priority sampling (Cormode et al., 2009).
//! Each observation is weighted by `exp(α·Δt)`, where `Δt` is the time since a
//! rolling epoch, and given the priority `weight / u` for a uniform draw
//! `u ∈ (0, 1]`. The reservoir keeps the highest-priority observations, so
//! recent ones are exponentially more likely to survive while a tail of older
//! ones remains.
//!
//! Weights grow without bound as the epoch ages, so the epoch is moved forward
//! periodically and every stored weight and priority is scaled down by the same
//! factor. Relative order is unchanged by a rescale.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ordered_float::OrderedFloat;
use parking_lot::Mutex;
use rand::RngCore;

use super::{assert_capacity, check_capacity, WeightedSample, DEFAULT_SIZE};
use crate::clock::{self, Clock};
use crate::random::{default_rng, next_unit_open, BoxedRng};
use crate::statistics::Snapshot;
use crate::traits::{downcast_other, merge_outcome, MergeError, Reservoir};

/// Default decay rate, biasing the sample towards roughly the last five minutes
pub const DEFAULT_ALPHA: f64 = 0.015;

/// How often the epoch is moved forward
pub const RESCALE_THRESHOLD: Duration = Duration::from_secs(60 * 60);

/// Largest exponent a weight may reach before a rescale is forced.
///
/// Leaves room below `f64::MAX` (about e^709) for the priority division.
const MAX_WEIGHT_EXPONENT: f64 = 500.0;

/// Time between epoch moves for decay rate `alpha`
///
/// Capped at [`RESCALE_THRESHOLD`], and shortened when a weight would pass
/// `exp(MAX_WEIGHT_EXPONENT)` sooner than that. A rate so small that the
/// bound does not fit in a `Duration` uses the threshold.
fn rescale_interval(alpha: f64) -> Duration {
    Duration::try_from_secs_f64(MAX_WEIGHT_EXPONENT / alpha)
        .map_or(RESCALE_THRESHOLD, |bound| bound.min(RESCALE_THRESHOLD))
}

/// Position of a sample in the priority index.
///
/// The insertion sequence breaks ties so equal priorities never collide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct PriorityKey {
    priority: OrderedFloat<f64>,
    seq: u64,
}

struct DecayingState {
    /// Sample arena; a slot is reused when its sample is evicted
    samples: Vec<WeightedSample>,
    /// Ordered index from priority to arena slot, lowest priority first
    index: BTreeMap<PriorityKey, usize>,
    /// Number of observations recorded since the last reset
    count: u64,
    next_seq: u64,
    /// Epoch that weights are measured from
    start_time: Instant,
    next_scale_time: Instant,
    rng: BoxedRng,
}

impl DecayingState {
    fn new(now: Instant, interval: Duration, capacity: usize, rng: BoxedRng) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            index: BTreeMap::new(),
            count: 0,
            next_seq: 0,
            start_time: now,
            next_scale_time: now + interval,
            rng,
        }
    }

    fn weight(&self, alpha: f64, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.start_time);
        (alpha * elapsed.as_secs_f64()).exp()
    }

    fn lowest_priority(&self) -> Option<f64> {
        self.index.first_key_value().map(|(key, _)| key.priority.0)
    }

    /// Whether a sample with `priority` would be kept.
    fn admits(&self, capacity: usize, priority: f64) -> bool {
        self.samples.len() < capacity || self.lowest_priority().is_some_and(|low| low < priority)
    }

    /// Insert `sample` with `priority`, evicting the lowest-priority sample if
    /// the reservoir is full and `priority` beats it.
    fn offer(&mut self, capacity: usize, priority: f64, sample: WeightedSample) {
        let key = PriorityKey {
            priority: OrderedFloat(priority),
            seq: self.next_seq,
        };
        self.next_seq += 1;

        if self.samples.len() < capacity {
            let slot = self.samples.len();
            self.samples.push(sample);
            self.index.insert(key, slot);
            return;
        }

        let Some((&lowest, &slot)) = self.index.first_key_value() else {
            return;
        };
        if lowest.priority < key.priority {
            self.index.remove(&lowest);
            self.samples[slot] = sample;
            self.index.insert(key, slot);
        }
    }

    fn rescale_if_needed(&mut self, alpha: f64, interval: Duration, now: Instant) {
        if now >= self.next_scale_time {
            self.rescale(alpha, interval, now);
        }
    }

    fn rescale(&mut self, alpha: f64, interval: Duration, now: Instant) {
        let old_start_time = self.start_time;
        let elapsed = now.saturating_duration_since(old_start_time);
        self.start_time = now;
        self.next_scale_time = now + interval;

        let scaling_factor = (-alpha * elapsed.as_secs_f64()).exp();
        let dropped = self.scale(scaling_factor);

        tracing::debug!(
            elapsed_secs = elapsed.as_secs_f64(),
            scaling_factor,
            retained = self.samples.len(),
            dropped,
            "Rescaled decaying reservoir."
        );
    }

    /// Multiply every weight and priority by `factor`, dropping samples whose
    /// weight underflows to zero. Returns the number of samples dropped.
    ///
    /// The arena is rebuilt compactly in priority order.
    fn scale(&mut self, factor: f64) -> usize {
        let index = mem::take(&mut self.index);
        let mut slots: Vec<Option<WeightedSample>> =
            mem::take(&mut self.samples).into_iter().map(Some).collect();
        let mut dropped = 0;

        for (key, slot) in index {
            let Some(mut sample) = slots.get_mut(slot).and_then(Option::take) else {
                continue;
            };
            sample.weight *= factor;
            if sample.weight == 0.0 {
                dropped += 1;
                continue;
            }

            let key = PriorityKey {
                priority: OrderedFloat(key.priority.0 * factor),
                seq: key.seq,
            };
            self.index.insert(key, self.samples.len());
            self.samples.push(sample);
        }

        dropped
    }

    fn clear(&mut self, now: Instant, interval: Duration) {
        self.samples.clear();
        self.index.clear();
        self.count = 0;
        self.start_time = now;
        self.next_scale_time = now + interval;
    }
}

/// Reservoir using forward-decay priority sampling
///
/// # Parameters
///
/// - `capacity`: number of samples kept (default 1028)
/// - `alpha`: decay rate; larger values forget faster (default 0.015)
///
/// # Example
///
/// ```
/// use flowhist::sampling::ExponentiallyDecayingReservoir;
/// use flowhist::traits::Reservoir;
///
/// let reservoir = ExponentiallyDecayingReservoir::new(100, 0.015);
///
/// for i in 0..1000 {
///     reservoir.update(i, None);
/// }
///
/// let snapshot = reservoir.snapshot(false);
/// assert_eq!(snapshot.size(), 100);
/// assert_eq!(snapshot.count(), 1000);
/// ```
pub struct ExponentiallyDecayingReservoir {
    capacity: usize,
    alpha: f64,
    /// Interval between epoch moves
    rescale_interval: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<DecayingState>,
}

impl Default for ExponentiallyDecayingReservoir {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE, DEFAULT_ALPHA)
    }
}

impl fmt::Debug for ExponentiallyDecayingReservoir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ExponentiallyDecayingReservoir")
            .field("capacity", &self.capacity)
            .field("alpha", &self.alpha)
            .field("len", &state.samples.len())
            .field("count", &state.count)
            .finish()
    }
}

impl ExponentiallyDecayingReservoir {
    /// Create a new decaying reservoir
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or `alpha` is not finite and positive.
    pub fn new(capacity: usize, alpha: f64) -> Self {
        Self::with_clock_and_rng(capacity, alpha, clock::monotonic(), default_rng())
    }

    /// Create a new decaying reservoir driven by the given clock
    pub fn with_clock(capacity: usize, alpha: f64, clock: Arc<dyn Clock>) -> Self {
        Self::with_clock_and_rng(capacity, alpha, clock, default_rng())
    }

    /// Create a new decaying reservoir with an explicit time source and random source
    pub fn with_clock_and_rng(
        capacity: usize,
        alpha: f64,
        clock: Arc<dyn Clock>,
        rng: Box<dyn RngCore + Send>,
    ) -> Self {
        assert_capacity(capacity);
        assert!(
            alpha.is_finite() && alpha > 0.0,
            "alpha must be finite and positive, got {}",
            alpha
        );

        let rescale_interval = rescale_interval(alpha);
        let state = DecayingState::new(clock.now(), rescale_interval, capacity, rng);

        Self {
            capacity,
            alpha,
            rescale_interval,
            clock,
            state: Mutex::new(state),
        }
    }

    /// Get the reservoir capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the decay rate
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Get the current sample size
    pub fn len(&self) -> usize {
        self.state.lock().samples.len()
    }

    /// Check if reservoir is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the number of observations recorded since the last reset
    pub fn items_seen(&self) -> u64 {
        self.state.lock().count
    }

    /// Merge another decaying reservoir into this one
    ///
    /// Both reservoirs must share capacity and decay rate. Priorities are
    /// compared against the later of the two epochs: whichever side has the
    /// older epoch is scaled down to it first.
    pub fn try_merge(&self, other: &ExponentiallyDecayingReservoir) -> Result<(), MergeError> {
        if self.alpha != other.alpha {
            return Err(MergeError::IncompatibleConfig {
                expected: format!("alpha={}", self.alpha),
                found: format!("alpha={}", other.alpha),
            });
        }
        check_capacity(self.capacity, other.capacity)?;

        let (entries, other_count, other_start) = {
            let other = other.state.lock();
            let entries: Vec<(f64, WeightedSample)> = other
                .index
                .iter()
                .map(|(key, &slot)| (key.priority.0, other.samples[slot].clone()))
                .collect();
            (entries, other.count, other.start_time)
        };

        if other_count == 0 {
            return Ok(());
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let other_factor = if other_start > state.start_time {
            let elapsed = other_start.duration_since(state.start_time);
            state.start_time = other_start;
            state.next_scale_time = other_start + self.rescale_interval;
            state.scale((-self.alpha * elapsed.as_secs_f64()).exp());
            1.0
        } else {
            let elapsed = state.start_time.duration_since(other_start);
            (-self.alpha * elapsed.as_secs_f64()).exp()
        };

        for (priority, mut sample) in entries {
            sample.weight *= other_factor;
            if sample.weight == 0.0 {
                continue;
            }
            state.offer(self.capacity, priority * other_factor, sample);
        }

        state.count += other_count;
        Ok(())
    }
}

impl Reservoir for ExponentiallyDecayingReservoir {
    fn update(&self, value: i64, tag: Option<&str>) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let now = self.clock.now();

        state.rescale_if_needed(self.alpha, self.rescale_interval, now);
        state.count += 1;

        let weight = state.weight(self.alpha, now);
        let priority = weight / next_unit_open(&mut *state.rng);

        if state.admits(self.capacity, priority) {
            let sample = WeightedSample::new(value, tag, weight, now);
            state.offer(self.capacity, priority, sample);
        }
    }

    fn snapshot(&self, reset: bool) -> Snapshot {
        let mut state = self.state.lock();
        let now = self.clock.now();
        state.rescale_if_needed(self.alpha, self.rescale_interval, now);

        if !reset {
            return Snapshot::from_samples(state.count, &state.samples);
        }

        let samples = mem::replace(&mut state.samples, Vec::with_capacity(self.capacity));
        let count = state.count;
        state.clear(now, self.rescale_interval);
        drop(state);

        tracing::trace!(count, "Reset decaying reservoir on snapshot.");
        Snapshot::from_samples(count, &samples)
    }

    fn merge(&self, other: &dyn Reservoir) -> bool {
        let result = downcast_other(self, other).and_then(|other| self.try_merge(other));
        merge_outcome(self.strategy(), result)
    }

    fn reset(&self) {
        let now = self.clock.now();
        self.state.lock().clear(now, self.rescale_interval);
    }

    fn strategy(&self) -> &'static str {
        "exponentially_decaying"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
