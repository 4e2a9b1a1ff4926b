// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Tags every reported metric with a fixed set of dimensions.

use cumulo_core::{BoxReport, MetricFilter, MetricSnapshot, Registry, Report, ReportError};
use std::collections::BTreeMap;

/// Appends a fixed dimension suffix to every metric name before delegating.
///
/// The ordered dimension tokens are joined with single spaces into one suffix
/// at construction and never change afterwards. On every report cycle, each
/// non-empty collection of the snapshot is rebuilt with `"{name} {suffix}"`
/// keys; values are moved over untouched and empty collections pass through
/// as-is. The rebuilt maps keep the snapshot's sorted-by-name discipline.
///
/// Errors from the wrapped delegate propagate unchanged; the transform itself
/// cannot fail.
#[derive(Debug)]
pub struct WithDimensions<R> {
    delegate: R,
    suffix: String,
}

impl<R: Report> WithDimensions<R> {
    /// Wrap `delegate`, tagging metrics with the given `key=value` tokens.
    pub fn new<I>(delegate: R, dimensions: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let suffix = dimensions
            .into_iter()
            .map(|dimension| dimension.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        Self { delegate, suffix }
    }

    /// The precomputed dimension suffix, empty when there are no dimensions.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// The wrapped delegate.
    pub fn delegate(&self) -> &R {
        &self.delegate
    }
}

impl<R: Report> Report for WithDimensions<R> {
    fn report(&self, snapshot: MetricSnapshot) -> Result<(), ReportError> {
        if self.suffix.is_empty() {
            return self.delegate.report(snapshot);
        }
        self.delegate.report(MetricSnapshot {
            counters: append_suffix(snapshot.counters, &self.suffix),
            gauges: append_suffix(snapshot.gauges, &self.suffix),
            histograms: append_suffix(snapshot.histograms, &self.suffix),
            meters: append_suffix(snapshot.meters, &self.suffix),
            timers: append_suffix(snapshot.timers, &self.suffix),
        })
    }
}

fn append_suffix<V>(collection: BTreeMap<String, V>, suffix: &str) -> BTreeMap<String, V> {
    if collection.is_empty() {
        return collection;
    }
    collection
        .into_iter()
        .map(|(name, value)| (format!("{name} {suffix}"), value))
        .collect()
}

/// One configured reporting pipeline over a [`Registry`].
///
/// [`report_once`](Reporter::report_once) is the callback a host scheduler
/// drives at its chosen interval; the crate itself runs no timer. Each call
/// snapshots the registry through the configured filter and hands the result
/// down the pipeline (dimension tagging, then the CloudWatch translation,
/// then the transmitting client). Any failure comes back to the caller;
/// nothing is retried or swallowed here.
pub struct Reporter {
    registry: Registry,
    filter: MetricFilter,
    pipeline: BoxReport,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl Reporter {
    pub(crate) fn new(registry: Registry, filter: MetricFilter, pipeline: BoxReport) -> Self {
        Self {
            registry,
            filter,
            pipeline,
        }
    }

    /// Run one reporting cycle.
    pub fn report_once(&self) -> Result<(), ReportError> {
        let snapshot = self.registry.snapshot(&self.filter);
        tracing::trace!(metrics = snapshot.len(), "collected metric snapshot");
        self.pipeline.report(snapshot)
    }
}

#[cfg(test)]
mod test {
    use std::io;
    use std::sync::{Arc, Mutex};

    use cumulo_core::Distribution;

    use super::*;

    /// Captures the snapshot a delegate receives.
    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Option<MetricSnapshot>>>);

    impl Capture {
        fn take(&self) -> MetricSnapshot {
            self.0.lock().unwrap().take().expect("no snapshot reported")
        }
    }

    impl Report for Capture {
        fn report(&self, snapshot: MetricSnapshot) -> Result<(), ReportError> {
            *self.0.lock().unwrap() = Some(snapshot);
            Ok(())
        }
    }

    struct Failing;

    impl Report for Failing {
        fn report(&self, _snapshot: MetricSnapshot) -> Result<(), ReportError> {
            Err(ReportError::new(io::Error::other("delegate down")))
        }
    }

    fn sample_snapshot() -> MetricSnapshot {
        let mut snapshot = MetricSnapshot::default();
        snapshot.counters.insert("requests".to_string(), 7);
        snapshot.counters.insert("errors".to_string(), 1);
        snapshot.gauges.insert("queue_depth".to_string(), 3.5);
        snapshot.timers.insert(
            "latency".to_string(),
            Distribution {
                count: 2,
                sum: 10,
                min: 4,
                max: 6,
            },
        );
        snapshot
    }

    #[test]
    fn suffix_is_space_joined_in_order() {
        let tagged = WithDimensions::new(Capture::default(), ["env=dev", "machine=i-1*"]);
        assert_eq!(tagged.suffix(), "env=dev machine=i-1*");
    }

    #[test]
    fn transform_appends_suffix_to_every_name() {
        let capture = Capture::default();
        let tagged = WithDimensions::new(capture.clone(), ["env=dev", "machine=i-1*"]);

        tagged.report(sample_snapshot()).unwrap();
        let reported = capture.take();

        let original = sample_snapshot();
        assert_eq!(reported.counters.len(), original.counters.len());
        for (name, count) in &original.counters {
            assert_eq!(reported.counters[&format!("{name} env=dev machine=i-1*")], *count);
        }
        assert_eq!(reported.gauges["queue_depth env=dev machine=i-1*"], 3.5);
        assert_eq!(
            reported.timers["latency env=dev machine=i-1*"],
            original.timers["latency"]
        );
    }

    #[test]
    fn transform_preserves_relative_order() {
        let capture = Capture::default();
        let tagged = WithDimensions::new(capture.clone(), ["env=dev"]);

        tagged.report(sample_snapshot()).unwrap();
        let reported = capture.take();

        let original_order: Vec<_> = sample_snapshot().counters.into_keys().collect();
        let reported_order: Vec<_> = reported
            .counters
            .into_keys()
            .map(|name| name.trim_end_matches(" env=dev").to_string())
            .collect();
        assert_eq!(reported_order, original_order);
    }

    #[test]
    fn empty_collections_pass_through_unchanged() {
        let capture = Capture::default();
        let tagged = WithDimensions::new(capture.clone(), ["env=dev"]);

        tagged.report(MetricSnapshot::default()).unwrap();
        assert!(capture.take().is_empty());
    }

    #[test]
    fn no_dimensions_is_the_identity_transform() {
        let capture = Capture::default();
        let tagged = WithDimensions::new(capture.clone(), None::<&str>);

        assert_eq!(tagged.suffix(), "");
        tagged.report(sample_snapshot()).unwrap();
        assert_eq!(capture.take(), sample_snapshot());
    }

    #[test]
    fn delegate_errors_propagate() {
        let tagged = WithDimensions::new(Failing, ["env=dev"]);
        let error = tagged.report(sample_snapshot()).unwrap_err();
        assert!(error.to_string().contains("delegate down"));
    }

    #[test]
    fn report_once_feeds_filtered_snapshot_through_pipeline() {
        let registry = Registry::new();
        registry.counter("keep").inc_by(2);
        registry.counter("drop").inc();

        let capture = Capture::default();
        let filter = MetricFilter::new(["keep"], None::<&str>, false).unwrap();
        let reporter = Reporter::new(
            registry,
            filter,
            Box::new(WithDimensions::new(capture.clone(), ["env=test"])),
        );

        reporter.report_once().unwrap();
        let reported = capture.take();
        assert_eq!(reported.counters["keep env=test"], 2);
        assert!(!reported.counters.contains_key("drop env=test"));
    }
}
