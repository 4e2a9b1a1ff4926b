// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Interning registry for named instruments.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::filter::MetricFilter;
use crate::instrument::{Counter, Gauge, Histogram, Meter, Timer};
use crate::report::MetricSnapshot;

#[derive(Debug, Default)]
struct Instruments {
    counters: RwLock<BTreeMap<String, Counter>>,
    gauges: RwLock<BTreeMap<String, Gauge>>,
    histograms: RwLock<BTreeMap<String, Histogram>>,
    meters: RwLock<BTreeMap<String, Meter>>,
    timers: RwLock<BTreeMap<String, Timer>>,
}

/// Shared, cloneable collection of named instruments.
///
/// Accessors are get-or-create: the first call for a name registers the
/// instrument, and later calls (through any clone of the registry) return
/// handles to the same one. The five kinds are independent namespaces, so a
/// counter and a timer may share a name.
#[derive(Clone, Debug, Default)]
pub struct Registry(Arc<Instruments>);

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the counter registered under `name`.
    pub fn counter(&self, name: &str) -> Counter {
        get_or_create(&self.0.counters, name)
    }

    /// Get or create the gauge registered under `name`.
    pub fn gauge(&self, name: &str) -> Gauge {
        get_or_create(&self.0.gauges, name)
    }

    /// Get or create the histogram registered under `name`.
    pub fn histogram(&self, name: &str) -> Histogram {
        get_or_create(&self.0.histograms, name)
    }

    /// Get or create the meter registered under `name`.
    pub fn meter(&self, name: &str) -> Meter {
        get_or_create(&self.0.meters, name)
    }

    /// Get or create the timer registered under `name`.
    pub fn timer(&self, name: &str) -> Timer {
        get_or_create(&self.0.timers, name)
    }

    /// Collect a snapshot of every instrument whose name passes `filter`.
    ///
    /// Reading never resets instruments; counters and meters stay cumulative
    /// across snapshots.
    pub fn snapshot(&self, filter: &MetricFilter) -> MetricSnapshot {
        MetricSnapshot {
            counters: collect(&self.0.counters, filter, Counter::count),
            gauges: collect(&self.0.gauges, filter, Gauge::value),
            histograms: collect(&self.0.histograms, filter, Histogram::distribution),
            meters: collect(&self.0.meters, filter, Meter::count),
            timers: collect(&self.0.timers, filter, Timer::distribution),
        }
    }
}

fn get_or_create<T: Clone + Default>(map: &RwLock<BTreeMap<String, T>>, name: &str) -> T {
    if let Some(instrument) = map.read().unwrap().get(name) {
        return instrument.clone();
    }
    map.write()
        .unwrap()
        .entry(name.to_string())
        .or_default()
        .clone()
}

fn collect<T, V>(
    map: &RwLock<BTreeMap<String, T>>,
    filter: &MetricFilter,
    read: impl Fn(&T) -> V,
) -> BTreeMap<String, V> {
    map.read()
        .unwrap()
        .iter()
        .filter(|(name, _)| filter.matches(name))
        .map(|(name, instrument)| (name.clone(), read(instrument)))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn same_name_returns_same_instrument() {
        let registry = Registry::new();
        registry.counter("requests").inc_by(2);
        registry.counter("requests").inc();
        assert_eq!(registry.counter("requests").count(), 3);
    }

    #[test]
    fn clones_share_instruments() {
        let registry = Registry::new();
        let clone = registry.clone();
        clone.histogram("latency").record(4);
        assert_eq!(registry.histogram("latency").distribution().count, 1);
    }

    #[test]
    fn kinds_are_independent_namespaces() {
        let registry = Registry::new();
        registry.counter("work").inc();
        registry.meter("work").mark_by(5);
        let snapshot = registry.snapshot(&MetricFilter::all());
        assert_eq!(snapshot.counters["work"], 1);
        assert_eq!(snapshot.meters["work"], 5);
    }

    #[test]
    fn snapshot_is_sorted_by_name() {
        let registry = Registry::new();
        registry.counter("b").inc();
        registry.counter("a").inc();
        registry.counter("c").inc();
        let snapshot = registry.snapshot(&MetricFilter::all());
        let names: Vec<_> = snapshot.counters.keys().cloned().collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn snapshot_respects_filter() {
        let registry = Registry::new();
        registry.counter("keep").inc();
        registry.counter("drop").inc();
        registry.gauge("drop").set(1.0);
        let filter = MetricFilter::new(["keep"], None::<&str>, false).unwrap();
        let snapshot = registry.snapshot(&filter);
        assert_eq!(snapshot.counters.len(), 1);
        assert!(snapshot.counters.contains_key("keep"));
        assert!(snapshot.gauges.is_empty());
    }

    #[test]
    fn snapshot_does_not_reset_instruments() {
        let registry = Registry::new();
        registry.counter("requests").inc_by(7);
        let first = registry.snapshot(&MetricFilter::all());
        let second = registry.snapshot(&MetricFilter::all());
        assert_eq!(first.counters["requests"], 7);
        assert_eq!(second.counters["requests"], 7);
    }
}
