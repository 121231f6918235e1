//! Uniform reservoir sampling for long-term distributions
//!
//! Maintains a fixed-size uniform random sample of a stream of unknown length.
//! Each observation ever recorded has equal probability of being in the sample.

use std::any::Any;
use std::fmt;
use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::RngCore;

use super::{assert_capacity, check_capacity, WeightedSample, DEFAULT_SIZE};
use crate::clock::{self, Clock};
use crate::random::{default_rng, next_bounded, BoxedRng};
use crate::statistics::Snapshot;
use crate::traits::{downcast_other, merge_outcome, MergeError, Reservoir};

struct UniformState {
    /// Current sample
    values: Vec<WeightedSample>,
    /// Number of observations recorded since the last reset
    count: u64,
    rng: BoxedRng,
}

/// Reservoir using Algorithm R
///
/// Each observation has probability k/n of being in the sample, where k is the
/// capacity and n is the number of observations recorded since the last reset.
///
/// # Algorithm
///
/// Algorithm R (Vitter, 1985):
/// 1. Fill the reservoir with the first k observations
/// 2. For each subsequent observation n (1-indexed):
///    - Generate random j in [0, n)
///    - If j < k, replace slot j with observation n
///
/// # Example
///
/// ```
/// use flowhist::sampling::UniformReservoir;
/// use flowhist::traits::Reservoir;
///
/// let reservoir = UniformReservoir::new(5);
///
/// for i in 0..100 {
///     reservoir.update(i, None);
/// }
///
/// let snapshot = reservoir.snapshot(false);
/// assert_eq!(snapshot.size(), 5);
/// assert!(snapshot.values().iter().all(|v| (0..100).contains(v)));
/// ```
pub struct UniformReservoir {
    /// Maximum sample size
    capacity: usize,
    clock: Arc<dyn Clock>,
    state: Mutex<UniformState>,
}

impl Default for UniformReservoir {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE)
    }
}

impl fmt::Debug for UniformReservoir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("UniformReservoir")
            .field("capacity", &self.capacity)
            .field("len", &state.values.len())
            .field("count", &state.count)
            .finish()
    }
}

impl UniformReservoir {
    /// Create a new reservoir with given capacity
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self::with_clock_and_rng(capacity, clock::monotonic(), default_rng())
    }

    /// Create a new reservoir drawing from the given random source
    ///
    /// Useful for reproducible sampling in tests.
    pub fn with_rng<R>(capacity: usize, rng: R) -> Self
    where
        R: RngCore + Send + 'static,
    {
        Self::with_clock_and_rng(capacity, clock::monotonic(), Box::new(rng))
    }

    /// Create a new reservoir with an explicit time source and random source
    pub fn with_clock_and_rng(
        capacity: usize,
        clock: Arc<dyn Clock>,
        rng: Box<dyn RngCore + Send>,
    ) -> Self {
        assert_capacity(capacity);

        Self {
            capacity,
            clock,
            state: Mutex::new(UniformState {
                values: Vec::with_capacity(capacity),
                count: 0,
                rng,
            }),
        }
    }

    /// Get the reservoir capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the current sample size
    pub fn len(&self) -> usize {
        self.state.lock().values.len()
    }

    /// Check if reservoir is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the number of observations recorded since the last reset
    pub fn items_seen(&self) -> u64 {
        self.state.lock().count
    }

    /// Probability that any given observation is in the current sample
    pub fn sampling_probability(&self) -> f64 {
        let count = self.items_seen();
        if count == 0 {
            0.0
        } else {
            ((self.capacity as f64) / (count as f64)).min(1.0)
        }
    }

    /// Merge another uniform reservoir into this one
    ///
    /// Both reservoirs must have the same capacity. `other` is copied under its
    /// own lock before this reservoir is locked, so the two locks are never held
    /// together.
    pub fn try_merge(&self, other: &UniformReservoir) -> Result<(), MergeError> {
        check_capacity(self.capacity, other.capacity)?;

        let (other_values, other_count) = {
            let other = other.state.lock();
            (other.values.clone(), other.count)
        };

        if other_count == 0 {
            return Ok(());
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.count == 0 {
            state.values = other_values;
            state.count = other_count;
            return Ok(());
        }

        let total_count = state.count + other_count;

        if state.values.len() + other_values.len() <= self.capacity {
            // Both underfilled: all samples fit in the reservoir
            state.values.extend(other_values);
        } else {
            // Each retained sample stands for count / len observations of its
            // stream, so draw each output slot from this side with probability
            // self.count / total_count. Draws are without replacement; once one
            // side runs dry the other fills the remainder.
            let mut mine = mem::take(&mut state.values);
            let mut theirs = other_values;
            let mut merged = Vec::with_capacity(self.capacity);

            while merged.len() < self.capacity {
                let from_mine = match (mine.is_empty(), theirs.is_empty()) {
                    (true, true) => break,
                    (false, true) => true,
                    (true, false) => false,
                    (false, false) => next_bounded(&mut *state.rng, total_count) < state.count,
                };
                let side = if from_mine { &mut mine } else { &mut theirs };
                let idx = next_bounded(&mut *state.rng, side.len() as u64) as usize;
                merged.push(side.swap_remove(idx));
            }

            state.values = merged;
        }

        state.count = total_count;
        Ok(())
    }
}

impl Reservoir for UniformReservoir {
    fn update(&self, value: i64, tag: Option<&str>) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.count += 1;

        if state.values.len() < self.capacity {
            // Reservoir not full - just add
            let sample = WeightedSample::unweighted(value, tag, self.clock.now());
            state.values.push(sample);
        } else {
            // Reservoir full - maybe replace
            let j = next_bounded(&mut *state.rng, state.count) as usize;
            if j < self.capacity {
                state.values[j] = WeightedSample::unweighted(value, tag, self.clock.now());
            }
        }
    }

    fn snapshot(&self, reset: bool) -> Snapshot {
        let mut state = self.state.lock();
        if !reset {
            return Snapshot::from_samples(state.count, &state.values);
        }

        let values = mem::replace(&mut state.values, Vec::with_capacity(self.capacity));
        let count = mem::take(&mut state.count);
        drop(state);

        tracing::trace!(count, "Reset uniform reservoir on snapshot.");
        Snapshot::from_samples(count, &values)
    }

    fn merge(&self, other: &dyn Reservoir) -> bool {
        let result = downcast_other(self, other).and_then(|other| self.try_merge(other));
        merge_outcome(self.strategy(), result)
    }

    fn reset(&self) {
        let mut state = self.state.lock();
        state.values.clear();
        state.count = 0;
    }

    fn strategy(&self) -> &'static str {
        "uniform"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
