//! Correctness and invariant tests for flowhist
//!
//! These tests verify sampling guarantees, reset and merge semantics, and
//! behaviour under concurrent writers across all reservoir strategies. They
//! complement the unit tests in each module by focusing on properties that must
//! always hold.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use flowhist::prelude::*;
use rand::rngs::mock::StepRng;
use rand::rngs::SmallRng;
use rand::SeedableRng;

fn uniform(capacity: usize, seed: u64) -> UniformReservoir {
    UniformReservoir::with_rng(capacity, SmallRng::seed_from_u64(seed))
}

fn decaying(capacity: usize, clock: &ManualClock, seed: u64) -> ExponentiallyDecayingReservoir {
    ExponentiallyDecayingReservoir::with_clock_and_rng(
        capacity,
        0.015,
        Arc::new(clock.clone()),
        Box::new(SmallRng::seed_from_u64(seed)),
    )
}

// ============================================================================
// Uniform Reservoir
// ============================================================================

mod uniform_reservoir {
    use super::*;

    #[test]
    fn inclusion_frequency_converges_to_capacity_over_n() {
        let capacity = 10;
        let n = 100;
        let trials = 2000;
        let mut hits = vec![0usize; n];

        for trial in 0..trials {
            let reservoir = uniform(capacity, 0x9e37_79b9 + trial as u64);
            for v in 0..n as i64 {
                reservoir.update(v, None);
            }
            for &v in reservoir.snapshot(false).values() {
                hits[v as usize] += 1;
            }
        }

        let expected = trials as f64 * capacity as f64 / n as f64;
        for (value, &count) in hits.iter().enumerate() {
            let relative_error = (count as f64 - expected).abs() / expected;
            assert!(
                relative_error < 0.35,
                "Value {} sampled {} times (expected ~{})",
                value,
                count,
                expected
            );
        }
    }

    #[test]
    fn fixed_draws_give_known_sample() {
        // Every raw draw is 1, so each over-capacity insert replaces slot 1.
        let reservoir = UniformReservoir::with_rng(3, StepRng::new(1, 0));

        for value in [10, 20, 30, 40] {
            reservoir.update(value, None);
        }

        let snapshot = reservoir.snapshot(false);
        let values: HashSet<i64> = snapshot.values().iter().copied().collect();
        assert_eq!(values, HashSet::from([10, 40, 30]));
        assert_eq!(snapshot.count(), 4);
    }

    #[test]
    fn merge_preserves_total_count() {
        let r1 = uniform(10, 42);
        let r2 = uniform(10, 99);

        for i in 0..10_000 {
            r1.update(i, None);
        }
        for i in 10_000..20_000 {
            r2.update(i, None);
        }

        assert!(r1.merge(&r2));

        assert_eq!(
            r1.items_seen(),
            20_000,
            "After merging two reservoirs that each saw 10,000 items, \
             total count should be 20,000 but got {}",
            r1.items_seen()
        );
    }

    #[test]
    fn merge_produces_unbiased_sample() {
        let capacity = 1000;
        let n_per_side = 100_000i64;
        let trials = 20;
        let mut total_from_side2 = 0usize;

        for trial in 0..trials {
            let r1 = uniform(capacity, 1000 + trial * 7);
            let r2 = uniform(capacity, 2000 + trial * 13);

            for i in 0..n_per_side {
                r1.update(i, None);
            }
            for i in n_per_side..(2 * n_per_side) {
                r2.update(i, None);
            }

            assert!(r1.merge(&r2));

            let from_side2 = r1
                .snapshot(false)
                .values()
                .iter()
                .filter(|&&x| x >= n_per_side)
                .count();
            total_from_side2 += from_side2;
        }

        // Expected: ~50% from each side
        let expected = (capacity as f64 * trials as f64) / 2.0;
        let actual = total_from_side2 as f64;
        let relative_error = (actual - expected).abs() / expected;

        assert!(
            relative_error < 0.15,
            "Merged reservoir is biased: {:.1}% of items from side 2 \
             (expected ~50%, relative error {:.1}%)",
            (actual / (capacity as f64 * trials as f64)) * 100.0,
            relative_error * 100.0,
        );
    }

    #[test]
    fn merge_underfilled_reservoirs_preserves_all_items() {
        let r1 = uniform(100, 1);
        let r2 = uniform(100, 2);

        for i in 0..30 {
            r1.update(i, None);
        }
        for i in 30..50 {
            r2.update(i, None);
        }

        assert!(r1.merge(&r2));
        assert_eq!(r1.items_seen(), 50);

        let snapshot = r1.snapshot(false);
        assert_eq!(snapshot.values(), (0..50).collect::<Vec<i64>>().as_slice());
    }

    #[test]
    fn merge_with_empty_is_identity() {
        let r1 = uniform(10, 1);
        let r2 = uniform(10, 2);

        for i in 0..1000 {
            r1.update(i, None);
        }

        let before = r1.snapshot(false);
        assert!(r1.merge(&r2));
        assert_eq!(
            r1.snapshot(false),
            before,
            "Merging with an empty reservoir should not change the sample"
        );
    }

    #[test]
    fn merge_empty_into_populated() {
        let empty = uniform(10, 1);
        let populated = uniform(10, 2);

        for i in 0..1000 {
            populated.update(i, None);
        }

        assert!(empty.merge(&populated));

        assert_eq!(empty.items_seen(), 1000);
        assert_eq!(empty.snapshot(false), populated.snapshot(false));
    }
}

// ============================================================================
// Exponentially Decaying Reservoir
// ============================================================================

mod decaying_reservoir {
    use super::*;

    #[test]
    fn never_exceeds_capacity_across_rescales() {
        let clock = ManualClock::new();
        let reservoir = decaying(50, &clock, 3);

        // Four hours at one value every five seconds.
        for i in 0..(4 * 60 * 12) {
            clock.advance(Duration::from_secs(5));
            reservoir.update(i, None);
            assert!(reservoir.len() <= 50);
        }

        let snapshot = reservoir.snapshot(false);
        assert_eq!(snapshot.size(), 50);
        assert_eq!(snapshot.count(), 4 * 60 * 12);
    }

    #[test]
    fn recency_bias_exceeds_uniform() {
        let capacity = 100;
        let clock = ManualClock::new();
        let recent = decaying(capacity, &clock, 17);
        let long_term = uniform(capacity, 17);

        for v in 0..capacity as i64 {
            recent.update(v, None);
            long_term.update(v, None);
        }
        clock.advance(Duration::from_secs(10 * 60));
        for v in capacity as i64..2 * capacity as i64 {
            recent.update(v, None);
            long_term.update(v, None);
        }

        let second_batch_share = |snapshot: &Snapshot| {
            let n = snapshot
                .values()
                .iter()
                .filter(|&&v| v >= capacity as i64)
                .count();
            n as f64 / snapshot.size() as f64
        };

        let recent_share = second_batch_share(&recent.snapshot(false));
        let uniform_share = second_batch_share(&long_term.snapshot(false));

        assert!(
            recent_share > uniform_share,
            "decaying kept {:.2} of the second batch, uniform kept {:.2}",
            recent_share,
            uniform_share
        );
        assert!(recent_share > 0.9, "decaying kept only {:.2}", recent_share);
    }

    #[test]
    fn merge_keeps_values_from_inputs_only() {
        let clock = ManualClock::new();
        let r1 = decaying(64, &clock, 1);
        let r2 = decaying(64, &clock, 2);

        for i in 0..64 {
            r1.update(i, None);
            r2.update(1000 + i, None);
        }

        assert!(r1.merge(&r2));

        let snapshot = r1.snapshot(false);
        assert!(snapshot.size() <= 64);
        assert_eq!(snapshot.count(), 128);
        for &v in snapshot.values() {
            assert!((0..64).contains(&v) || (1000..1064).contains(&v), "stray value {}", v);
        }
    }
}

// ============================================================================
// Sliding Window Reservoir
// ============================================================================

mod sliding_window {
    use super::*;

    #[test]
    fn holds_exactly_the_last_capacity_updates() {
        let capacity = 50;
        let reservoir = SlidingWindowReservoir::new(capacity);

        for i in 0..1234 {
            reservoir.update(i, None);
        }

        let snapshot = reservoir.snapshot(false);
        assert_eq!(snapshot.size(), capacity);

        let values: HashSet<i64> = snapshot.values().iter().copied().collect();
        let expected: HashSet<i64> = (1234 - capacity as i64..1234).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn merge_keeps_most_recent_across_both() {
        let clock = ManualClock::new();
        let r1 = SlidingWindowReservoir::with_clock(10, Arc::new(clock.clone()));
        let r2 = SlidingWindowReservoir::with_clock(10, Arc::new(clock.clone()));

        for i in 0..10 {
            clock.advance(Duration::from_millis(1));
            r1.update(i, None);
        }
        for i in 10..20 {
            clock.advance(Duration::from_millis(1));
            r2.update(i, None);
        }

        assert!(r1.merge(&r2));
        assert_eq!(
            r1.snapshot(false).values(),
            (10..20).collect::<Vec<i64>>().as_slice()
        );
    }
}

// ============================================================================
// Histogram Metric
// ============================================================================

mod histogram {
    use super::*;

    fn all_strategies() -> [SamplingType; 3] {
        [
            SamplingType::FavourRecent,
            SamplingType::LongTerm,
            SamplingType::SlidingWindow,
        ]
    }

    #[test]
    fn reset_then_value_is_empty() {
        for sampling in all_strategies() {
            let histogram = HistogramMetric::with_sampling(sampling);
            for i in 0..500 {
                histogram.update(i, Some("before"));
            }

            histogram.reset();

            let value = histogram.value(false);
            assert_eq!(value.last_value(), 0, "{}", sampling);
            assert_eq!(value.last_tag(), None, "{}", sampling);
            assert_eq!(value.snapshot().size(), 0, "{}", sampling);
            assert_eq!(value.snapshot().mean(), 0.0, "{}", sampling);
        }
    }

    #[test]
    fn value_with_reset_does_not_leak() {
        for sampling in all_strategies() {
            let histogram = HistogramMetric::with_sampling(sampling);
            for i in 0..500 {
                histogram.update(i, None);
            }

            let first = histogram.value(true);
            assert!(first.snapshot().size() > 0);
            assert_eq!(first.last_value(), 499);

            let second = histogram.value(true);
            assert!(second.snapshot().is_empty(), "{}", sampling);
            assert_eq!(second.count(), 0, "{}", sampling);
            assert_eq!(second.last_value(), 0, "{}", sampling);
        }
    }

    #[test]
    fn merge_disjoint_inputs_stays_within_union() {
        for sampling in all_strategies() {
            let config = ReservoirConfig::new(sampling).with_size(32);
            let h1 = HistogramMetric::from_config(&config).unwrap();
            let h2 = HistogramMetric::from_config(&config).unwrap();
            let h3 = HistogramMetric::from_config(&config).unwrap();

            for i in 0..32 {
                h1.update(i, None);
                h2.update(100 + i, None);
                h3.update(900 + i, None);
            }

            assert!(h1.merge(&h2), "{}", sampling);

            let snapshot = h1.value(false).into_snapshot();
            assert!(snapshot.size() <= 32);
            for &v in snapshot.values() {
                assert!(v < 32 || (100..132).contains(&v), "{}: stray {}", sampling, v);
            }
            assert_eq!(h2.value(false).snapshot().size(), 32);
        }
    }

    #[test]
    fn merge_across_strategies_is_rejected() {
        let strategies = all_strategies();
        for a in strategies {
            for b in strategies {
                if a == b {
                    continue;
                }
                let h1 = HistogramMetric::with_sampling(a);
                let h2 = HistogramMetric::with_sampling(b);
                h1.update(1, None);
                h2.update(2, None);

                assert!(!h1.merge(&h2), "{} merged {}", a, b);
                assert_eq!(h1.value(false).snapshot().values(), &[1]);
                assert_eq!(h2.value(false).snapshot().values(), &[2]);
            }
        }
    }

    #[test]
    fn custom_reservoir_is_used() {
        let histogram = HistogramMetric::with_reservoir(Box::new(SlidingWindowReservoir::new(2)));
        for i in 0..5 {
            histogram.update(i, None);
        }
        assert_eq!(histogram.value(false).snapshot().values(), &[3, 4]);
    }

    #[test]
    fn unknown_sampling_type_fails_construction() {
        let result = "daily"
            .parse::<SamplingType>()
            .and_then(|sampling| HistogramMetric::from_config(&ReservoirConfig::new(sampling)));

        assert!(matches!(result, Err(ConfigError::UnknownSamplingType(_))));
    }
}

// ============================================================================
// Concurrency
// ============================================================================

mod concurrency {
    use super::*;

    const PRODUCERS: i64 = 4;
    const UPDATES_PER_PRODUCER: i64 = 20_000;

    /// Drain a reservoir with `snapshot(true)` while producers write to it; the
    /// drained counts must add up to exactly the number of updates.
    fn assert_reset_snapshots_account_for_every_update(reservoir: Arc<dyn Reservoir>) {
        let done = AtomicBool::new(false);
        let mut drained = 0u64;

        thread::scope(|s| {
            let producers: Vec<_> = (0..PRODUCERS)
                .map(|p| {
                    let reservoir = &reservoir;
                    s.spawn(move || {
                        for i in 0..UPDATES_PER_PRODUCER {
                            reservoir.update(p * UPDATES_PER_PRODUCER + i, None);
                        }
                    })
                })
                .collect();

            let reader = s.spawn(|| {
                let mut total = 0u64;
                while !done.load(Ordering::Acquire) {
                    let snapshot = reservoir.snapshot(true);
                    assert!(snapshot.size() <= 128);
                    total += snapshot.count();
                }
                total
            });

            for producer in producers {
                producer.join().unwrap();
            }
            done.store(true, Ordering::Release);
            drained = reader.join().unwrap();
        });

        drained += reservoir.snapshot(true).count();
        assert_eq!(
            drained,
            (PRODUCERS * UPDATES_PER_PRODUCER) as u64,
            "{} lost or double counted updates",
            reservoir.strategy()
        );
    }

    #[test]
    fn uniform_reset_snapshots_are_atomic() {
        assert_reset_snapshots_account_for_every_update(Arc::new(UniformReservoir::new(128)));
    }

    #[test]
    fn decaying_reset_snapshots_are_atomic() {
        assert_reset_snapshots_account_for_every_update(Arc::new(
            ExponentiallyDecayingReservoir::new(128, 0.015),
        ));
    }

    #[test]
    fn sliding_window_reset_snapshots_are_atomic() {
        assert_reset_snapshots_account_for_every_update(Arc::new(SlidingWindowReservoir::new(128)));
    }

    #[test]
    fn concurrent_updates_through_rescales() {
        let clock = ManualClock::new();
        let reservoir = Arc::new(decaying(64, &clock, 9));

        thread::scope(|s| {
            for p in 0..PRODUCERS {
                let reservoir = &reservoir;
                s.spawn(move || {
                    for i in 0..5_000 {
                        reservoir.update(p * 5_000 + i, None);
                    }
                });
            }

            let clock = &clock;
            let reservoir = &reservoir;
            s.spawn(move || {
                for _ in 0..10 {
                    clock.advance(Duration::from_secs(30 * 60));
                    assert!(reservoir.snapshot(false).size() <= 64);
                    thread::yield_now();
                }
            });
        });

        let snapshot = reservoir.snapshot(false);
        assert!(snapshot.size() <= 64);
        assert_eq!(snapshot.count(), (PRODUCERS * 5_000) as u64);
    }

    /// Merge two reservoirs into each other from two threads while a producer
    /// writes to both. Each merge adds the source count to the destination, so
    /// counts grow geometrically; the round count keeps them well inside `u64`.
    fn assert_crossed_merges_complete(sampling: SamplingType) {
        const CAPACITY: usize = 32;
        const ROUNDS: usize = 20;
        const UPDATES: i64 = 2_000;

        let config = ReservoirConfig::new(sampling).with_size(CAPACITY);
        let a = config.build().unwrap();
        let b = config.build().unwrap();

        thread::scope(|s| {
            let (a, b) = (&a, &b);

            s.spawn(move || {
                for i in 0..UPDATES {
                    a.update(i, None);
                    b.update(1_000_000 + i, None);
                }
            });
            s.spawn(move || {
                for _ in 0..ROUNDS {
                    assert!(a.merge(b.as_ref()), "{}: a <- b rejected", sampling);
                    assert!(a.snapshot(false).size() <= CAPACITY);
                    thread::yield_now();
                }
            });
            s.spawn(move || {
                for _ in 0..ROUNDS {
                    assert!(b.merge(a.as_ref()), "{}: b <- a rejected", sampling);
                    assert!(b.snapshot(false).size() <= CAPACITY);
                    thread::yield_now();
                }
            });
        });

        let in_inputs =
            |v: &i64| (0..UPDATES).contains(v) || (1_000_000..1_000_000 + UPDATES).contains(v);
        let (sa, sb) = (a.snapshot(false), b.snapshot(false));
        for snapshot in [&sa, &sb] {
            assert!(snapshot.size() <= CAPACITY, "{}", sampling);
            assert!(snapshot.count() >= UPDATES as u64, "{}", sampling);
            assert!(snapshot.values().iter().all(in_inputs), "{}: stray value", sampling);
        }

        // Once quiet, a merge adds exactly the source count.
        assert!(a.merge(b.as_ref()));
        assert_eq!(
            a.snapshot(false).count(),
            sa.count() + sb.count(),
            "{}: merged count is not the sum of both sides",
            sampling
        );
        assert_eq!(b.snapshot(false), sb, "{}: merge mutated its source", sampling);
    }

    #[test]
    fn uniform_crossed_merges_do_not_deadlock() {
        assert_crossed_merges_complete(SamplingType::LongTerm);
    }

    #[test]
    fn decaying_crossed_merges_do_not_deadlock() {
        assert_crossed_merges_complete(SamplingType::FavourRecent);
    }

    #[test]
    fn sliding_window_crossed_merges_do_not_deadlock() {
        assert_crossed_merges_complete(SamplingType::SlidingWindow);
    }

    #[test]
    fn histogram_is_shareable_across_threads() {
        let histogram = HistogramMetric::with_sampling(SamplingType::LongTerm);

        thread::scope(|s| {
            for p in 0..PRODUCERS {
                let histogram = &histogram;
                s.spawn(move || {
                    for i in 0..1_000 {
                        histogram.update(p * 1_000 + i, Some("worker"));
                    }
                });
            }
        });

        let value = histogram.value(false);
        assert_eq!(value.count(), (PRODUCERS * 1_000) as u64);
        assert_eq!(value.last_tag(), Some("worker"));
    }
}
