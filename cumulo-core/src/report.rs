// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The snapshot type handed to reporting backends, and the trait they
//! implement.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

use crate::instrument::Distribution;

/// A point-in-time readout of every instrument kind, keyed by metric name.
///
/// All five collections are ordered maps, so a backend iterating them sees
/// names in sorted order. Collections with no matching instruments are simply
/// empty; an all-empty snapshot is a valid input that backends treat as a
/// no-op.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricSnapshot {
    /// Cumulative counter values.
    pub counters: BTreeMap<String, i64>,
    /// Most recently set gauge values.
    pub gauges: BTreeMap<String, f64>,
    /// Histogram readouts.
    pub histograms: BTreeMap<String, Distribution>,
    /// Cumulative meter counts.
    pub meters: BTreeMap<String, u64>,
    /// Timer readouts, in nanoseconds.
    pub timers: BTreeMap<String, Distribution>,
}

impl MetricSnapshot {
    /// `true` if no collection holds any metric.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of metrics across all five collections.
    pub fn len(&self) -> usize {
        self.counters.len()
            + self.gauges.len()
            + self.histograms.len()
            + self.meters.len()
            + self.timers.len()
    }
}

/// Receives metric snapshots, one per reporting cycle.
///
/// Implementations either deliver the snapshot somewhere (a wire client, a
/// log stream) or transform it and delegate to a wrapped `Report`. The
/// contract is intentionally narrow: one snapshot in, one result out, no
/// scheduling and no retries. Failures from the eventual destination
/// propagate back through every layer unchanged.
pub trait Report {
    /// Report one snapshot.
    fn report(&self, snapshot: MetricSnapshot) -> Result<(), ReportError>;
}

/// A boxed [`Report`] with the concrete backend type erased.
pub type BoxReport = Box<dyn Report + Send + Sync>;

impl<R: Report + ?Sized> Report for Box<R> {
    fn report(&self, snapshot: MetricSnapshot) -> Result<(), ReportError> {
        (**self).report(snapshot)
    }
}

impl<R: Report + ?Sized> Report for std::sync::Arc<R> {
    fn report(&self, snapshot: MetricSnapshot) -> Result<(), ReportError> {
        (**self).report(snapshot)
    }
}

/// A reporting cycle that failed in the backend.
///
/// This layer introduces no failure modes of its own; the wrapped source is
/// whatever the destination client raised.
#[derive(Debug)]
pub struct ReportError {
    source: Box<dyn Error + Send + Sync>,
}

impl ReportError {
    /// Wrap a backend failure.
    pub fn new(source: impl Error + Send + Sync + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to report metrics: {}", self.source)
    }
}

impl Error for ReportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&*self.source)
    }
}

#[cfg(test)]
mod test {
    use std::io;

    use super::*;

    #[test]
    fn empty_snapshot_has_no_metrics() {
        let snapshot = MetricSnapshot::default();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.len(), 0);
    }

    #[test]
    fn len_spans_all_collections() {
        let mut snapshot = MetricSnapshot::default();
        snapshot.counters.insert("a".to_string(), 1);
        snapshot.gauges.insert("b".to_string(), 2.0);
        snapshot.meters.insert("c".to_string(), 3);
        assert_eq!(snapshot.len(), 3);
        assert!(!snapshot.is_empty());
    }

    #[test]
    fn report_error_keeps_its_source() {
        let error = ReportError::new(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        assert!(error.to_string().contains("pipe closed"));
        assert!(error.source().is_some());
    }

    #[test]
    fn boxed_reports_delegate() {
        struct Rejecting;
        impl Report for Rejecting {
            fn report(&self, _snapshot: MetricSnapshot) -> Result<(), ReportError> {
                Err(ReportError::new(io::Error::other("nope")))
            }
        }

        let boxed: BoxReport = Box::new(Rejecting);
        assert!(boxed.report(MetricSnapshot::default()).is_err());
    }
}
