//! Sliding window sampling over the most recent observations
//!
//! The window is count-based: it always holds exactly the last `capacity`
//! observations in arrival order, evicting the oldest first. There is no
//! randomness and no weighting.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{assert_capacity, check_capacity, WeightedSample, DEFAULT_SIZE};
use crate::clock::{self, Clock};
use crate::statistics::Snapshot;
use crate::traits::{downcast_other, merge_outcome, MergeError, Reservoir};

struct WindowState {
    /// Oldest sample at the front
    values: VecDeque<WeightedSample>,
    count: u64,
}

/// Reservoir holding the last `capacity` observations
///
/// # Example
///
/// ```
/// use flowhist::sampling::SlidingWindowReservoir;
/// use flowhist::traits::Reservoir;
///
/// let reservoir = SlidingWindowReservoir::new(3);
///
/// for i in 1..=5 {
///     reservoir.update(i, None);
/// }
///
/// assert_eq!(reservoir.snapshot(false).values(), &[3, 4, 5]);
/// ```
pub struct SlidingWindowReservoir {
    capacity: usize,
    clock: Arc<dyn Clock>,
    state: Mutex<WindowState>,
}

impl Default for SlidingWindowReservoir {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE)
    }
}

impl fmt::Debug for SlidingWindowReservoir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SlidingWindowReservoir")
            .field("capacity", &self.capacity)
            .field("len", &state.values.len())
            .field("count", &state.count)
            .finish()
    }
}

impl SlidingWindowReservoir {
    /// Create a new window of the given size
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, clock::monotonic())
    }

    /// Create a new window stamping arrivals with the given clock
    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        assert_capacity(capacity);

        Self {
            capacity,
            clock,
            state: Mutex::new(WindowState {
                values: VecDeque::with_capacity(capacity),
                count: 0,
            }),
        }
    }

    /// Get the window size
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the number of samples currently in the window
    pub fn len(&self) -> usize {
        self.state.lock().values.len()
    }

    /// Check if the window is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the number of observations recorded since the last reset
    pub fn items_seen(&self) -> u64 {
        self.state.lock().count
    }

    /// Merge another window into this one
    ///
    /// Samples from both windows are interleaved by arrival time and only the
    /// most recent `capacity` are kept. On equal timestamps this window's
    /// samples are ordered first.
    pub fn try_merge(&self, other: &SlidingWindowReservoir) -> Result<(), MergeError> {
        check_capacity(self.capacity, other.capacity)?;

        let (theirs, other_count) = {
            let other = other.state.lock();
            (other.values.clone(), other.count)
        };

        if other_count == 0 {
            return Ok(());
        }

        let mut state = self.state.lock();
        let mine = mem::take(&mut state.values);

        let mut merged = Vec::with_capacity(mine.len() + theirs.len());
        let mut mine = mine.into_iter().peekable();
        let mut theirs = theirs.into_iter().peekable();
        loop {
            let take_mine = match (mine.peek(), theirs.peek()) {
                (Some(a), Some(b)) => a.timestamp <= b.timestamp,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            let next = if take_mine { mine.next() } else { theirs.next() };
            merged.extend(next);
        }

        let skip = merged.len().saturating_sub(self.capacity);
        state.values = merged.into_iter().skip(skip).collect();
        state.count += other_count;
        Ok(())
    }
}

impl Reservoir for SlidingWindowReservoir {
    fn update(&self, value: i64, tag: Option<&str>) {
        let mut state = self.state.lock();
        // Stamped under the lock so buffer order matches timestamp order.
        let sample = WeightedSample::unweighted(value, tag, self.clock.now());
        state.count += 1;
        if state.values.len() == self.capacity {
            state.values.pop_front();
        }
        state.values.push_back(sample);
    }

    fn snapshot(&self, reset: bool) -> Snapshot {
        let mut state = self.state.lock();
        if !reset {
            return Snapshot::from_samples(state.count, &state.values);
        }

        let values = mem::replace(&mut state.values, VecDeque::with_capacity(self.capacity));
        let count = mem::take(&mut state.count);
        drop(state);

        tracing::trace!(count, "Reset sliding window on snapshot.");
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
        "sliding_window"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
