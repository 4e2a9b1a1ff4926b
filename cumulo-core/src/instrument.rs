// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Cloneable instrument handles backed by shared atomics.
//!
//! Every handle is a thin wrapper over an [`Arc`], so clones observe and
//! update the same underlying value. Updates use relaxed atomics; a readout
//! that races a concurrent update may see it partially applied, which is
//! acceptable for periodic reporting since the next cycle observes the rest.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A cumulative count that can move in both directions.
#[derive(Clone, Debug, Default)]
pub struct Counter(Arc<AtomicI64>);

impl Counter {
    /// Create a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by one.
    pub fn inc(&self) {
        self.inc_by(1);
    }

    /// Increment by `n`.
    pub fn inc_by(&self, n: i64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    /// Decrement by one.
    pub fn dec(&self) {
        self.dec_by(1);
    }

    /// Decrement by `n`.
    pub fn dec_by(&self, n: i64) {
        self.0.fetch_sub(n, Ordering::Relaxed);
    }

    /// The current cumulative count.
    pub fn count(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A point-in-time value; reading returns the most recent [`set`](Gauge::set).
///
/// The value is stored as an `f64` bit pattern in an atomic, so setting and
/// reading never lock.
#[derive(Clone, Debug, Default)]
pub struct Gauge(Arc<AtomicU64>);

impl Gauge {
    /// Create a gauge starting at `0.0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current value.
    pub fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    /// The most recently set value.
    pub fn value(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

#[derive(Debug)]
struct HistogramCells {
    count: AtomicU64,
    sum: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
}

impl Default for HistogramCells {
    fn default() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            // min saturates downward from MAX so the first record always wins
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
        }
    }
}

/// Aggregates recorded values into a running count/sum/min/max.
///
/// This intentionally keeps only what a statistic-set style readout needs,
/// rather than a full sketch of the value distribution.
#[derive(Clone, Debug, Default)]
pub struct Histogram(Arc<HistogramCells>);

impl Histogram {
    /// Create an empty histogram.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observed value.
    pub fn record(&self, value: u64) {
        self.0.count.fetch_add(1, Ordering::Relaxed);
        self.0.sum.fetch_add(value, Ordering::Relaxed);
        self.0.min.fetch_min(value, Ordering::Relaxed);
        self.0.max.fetch_max(value, Ordering::Relaxed);
    }

    /// Read out the aggregate recorded so far.
    pub fn distribution(&self) -> Distribution {
        let count = self.0.count.load(Ordering::Relaxed);
        if count == 0 {
            return Distribution::default();
        }
        Distribution {
            count,
            sum: self.0.sum.load(Ordering::Relaxed),
            min: self.0.min.load(Ordering::Relaxed),
            max: self.0.max.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time readout of a [`Histogram`] or [`Timer`].
///
/// An empty distribution reads as all zeros.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Distribution {
    /// Number of recorded values.
    pub count: u64,
    /// Sum of all recorded values.
    pub sum: u64,
    /// Smallest recorded value.
    pub min: u64,
    /// Largest recorded value.
    pub max: u64,
}

impl Distribution {
    /// `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Arithmetic mean of the recorded values, `0.0` when empty.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }
}

/// A monotonic occurrence count.
#[derive(Clone, Debug, Default)]
pub struct Meter(Arc<AtomicU64>);

impl Meter {
    /// Create a meter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark one occurrence.
    pub fn mark(&self) {
        self.mark_by(1);
    }

    /// Mark `n` occurrences.
    pub fn mark_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    /// Total occurrences marked so far.
    pub fn count(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A [`Histogram`] over elapsed time, recorded in nanoseconds.
#[derive(Clone, Debug, Default)]
pub struct Timer(Histogram);

impl Timer {
    /// Create an empty timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one elapsed interval.
    pub fn record(&self, elapsed: Duration) {
        self.0
            .record(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX));
    }

    /// Start the clock; the returned guard records the elapsed time when
    /// dropped or explicitly [`stop`](RunningTimer::stop)ped.
    pub fn start(&self) -> RunningTimer {
        RunningTimer {
            timer: self.clone(),
            started: Instant::now(),
            recorded: false,
        }
    }

    /// Read out the aggregate of recorded intervals, in nanoseconds.
    pub fn distribution(&self) -> Distribution {
        self.0.distribution()
    }
}

/// Guard measuring one interval on a [`Timer`].
#[derive(Debug)]
pub struct RunningTimer {
    timer: Timer,
    started: Instant,
    recorded: bool,
}

impl RunningTimer {
    /// Stop the clock, record the elapsed interval, and return it.
    pub fn stop(mut self) -> Duration {
        let elapsed = self.started.elapsed();
        self.timer.record(elapsed);
        self.recorded = true;
        elapsed
    }
}

impl Drop for RunningTimer {
    fn drop(&mut self) {
        if !self.recorded {
            self.timer.record(self.started.elapsed());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counter_moves_both_directions() {
        let counter = Counter::new();
        counter.inc();
        counter.inc_by(5);
        counter.dec();
        assert_eq!(counter.count(), 5);
    }

    #[test]
    fn counter_clones_share_state() {
        let counter = Counter::new();
        let clone = counter.clone();
        clone.inc_by(3);
        assert_eq!(counter.count(), 3);
    }

    #[test]
    fn gauge_keeps_latest_value() {
        let gauge = Gauge::new();
        assert_eq!(gauge.value(), 0.0);
        gauge.set(2.5);
        gauge.set(-1.0);
        assert_eq!(gauge.value(), -1.0);
    }

    #[test]
    fn histogram_tracks_bounds() {
        let histogram = Histogram::new();
        histogram.record(3);
        histogram.record(9);
        histogram.record(6);
        let distribution = histogram.distribution();
        assert_eq!(distribution.count, 3);
        assert_eq!(distribution.sum, 18);
        assert_eq!(distribution.min, 3);
        assert_eq!(distribution.max, 9);
        assert_eq!(distribution.mean(), 6.0);
    }

    #[test]
    fn empty_histogram_reads_as_zero() {
        let distribution = Histogram::new().distribution();
        assert!(distribution.is_empty());
        assert_eq!(distribution, Distribution::default());
        assert_eq!(distribution.mean(), 0.0);
    }

    #[test]
    fn meter_accumulates_marks() {
        let meter = Meter::new();
        meter.mark();
        meter.mark_by(10);
        assert_eq!(meter.count(), 11);
    }

    #[test]
    fn timer_records_in_nanoseconds() {
        let timer = Timer::new();
        timer.record(Duration::from_millis(2));
        let distribution = timer.distribution();
        assert_eq!(distribution.count, 1);
        assert_eq!(distribution.sum, 2_000_000);
    }

    #[test]
    fn running_timer_records_on_drop() {
        let timer = Timer::new();
        drop(timer.start());
        assert_eq!(timer.distribution().count, 1);
    }

    #[test]
    fn stopped_timer_records_exactly_once() {
        let timer = Timer::new();
        let elapsed = timer.start().stop();
        let distribution = timer.distribution();
        assert_eq!(distribution.count, 1);
        assert_eq!(distribution.sum, elapsed.as_nanos() as u64);
    }
}
