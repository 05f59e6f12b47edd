//! The progress estimator (spec.md §4.4, component C4).
//!
//! Derives `(completed, expected, elapsed)` tuples for the UI from the live
//! counters the reconstructor publishes plus an optional cache-backed
//! estimate, and ticks at a fixed cadence independent of the event stream so
//! the elapsed clock and spinner keep moving even during a quiet package.

use std::time::Duration;
use tokio::time::Instant;

/// One progress sample, handed to the TUI on every tick or state change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressTick {
    pub completed: usize,
    pub expected: Option<usize>,
    pub elapsed: Duration,
    /// `[0, 1]`, monotonically non-decreasing over the run (spec.md §8,
    /// "No-regress progress").
    pub fraction: f64,
}

/// Tracks the running `(completed, expected)` pair and derives the
/// progress fraction described in spec.md §4.4.
#[derive(Debug)]
pub struct ProgressEstimator {
    expected: Option<usize>,
    started_at: Instant,
    best_fraction: f64,
}

impl ProgressEstimator {
    pub fn new(expected: Option<usize>) -> Self {
        Self {
            expected,
            started_at: Instant::now(),
            best_fraction: 0.0,
        }
    }

    /// Sample the estimator given the current completed-test count.
    ///
    /// The denominator widens on the fly if `completed` outgrows the
    /// cached `expected` (spec.md §4.4: "the denominator updated on the fly
    /// so the bar never regresses"), and the returned fraction never drops
    /// below the best fraction ever observed.
    pub fn sample(&mut self, completed: usize) -> ProgressTick {
        if let Some(expected) = self.expected {
            if completed > expected {
                self.expected = Some(completed);
            }
        }

        let denominator = match self.expected {
            Some(expected) => completed.max(expected).max(1),
            None => completed.max(1),
        };
        let raw = (completed as f64 / denominator as f64).min(1.0);
        self.best_fraction = self.best_fraction.max(raw);

        ProgressTick {
            completed,
            expected: self.expected,
            elapsed: self.started_at.elapsed(),
            fraction: self.best_fraction,
        }
    }
}

/// Spawns a fixed-cadence ticker that the TUI driver selects on alongside
/// state-delta snapshots, per spec.md §4.4's "emits a tick at a fixed
/// cadence (default every 100ms)".
pub fn ticker(cadence: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(cadence);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_strategy::proptest;

    #[test]
    fn fraction_never_regresses_when_expected_count_grows() {
        let mut estimator = ProgressEstimator::new(Some(10));
        let first = estimator.sample(8);
        assert!((first.fraction - 0.8).abs() < 1e-9);

        // More tests than expected show up; the bar must not jump backward.
        let second = estimator.sample(9);
        assert!(second.fraction >= first.fraction);
    }

    #[test]
    fn absent_expected_uses_completed_as_its_own_denominator() {
        let mut estimator = ProgressEstimator::new(None);
        let tick = estimator.sample(5);
        assert_eq!(tick.expected, None);
        assert!((tick.fraction - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_completed_and_zero_expected_does_not_divide_by_zero() {
        let mut estimator = ProgressEstimator::new(Some(0));
        let tick = estimator.sample(0);
        assert_eq!(tick.fraction, 0.0);
    }

    fn completed_samples() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(0u8..=50, 1..20)
    }

    /// spec.md §8's "No-regress progress" property: whatever order
    /// `completed` samples arrive in, and whatever the cached `expected`
    /// count was, the fraction handed to the UI never drops below a
    /// fraction it already reported.
    #[proptest(cases = 64)]
    fn fraction_is_monotonically_non_decreasing(
        expected: Option<u8>,
        #[strategy(completed_samples())] samples: Vec<u8>,
    ) {
        let mut estimator = ProgressEstimator::new(expected.map(|e| e as usize));
        let mut last = 0.0_f64;
        for completed in samples {
            let tick = estimator.sample(completed as usize);
            prop_assert!(tick.fraction + 1e-9 >= last);
            last = tick.fraction;
        }
    }
}
