// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The CloudWatch datum model, the transmitting-client seam, and the
//! translation from metric snapshots to datum batches.
//!
//! Snapshot keys arrive with their dimensions encoded in the name (space
//! separated `key=value` tokens, appended by
//! [`WithDimensions`](crate::WithDimensions)); this layer decodes them back
//! into structured [`Dimension`]s, turns values into scalars or statistic
//! sets, and hands batches to a [`CloudWatchClient`]. Everything past that
//! trait (signing, retries, the actual wire) belongs to the client
//! implementation.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::io;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use cumulo_core::{Distribution, MetricSnapshot, Report, ReportError};
use serde::Serialize;

/// CloudWatch accepts at most this many datums per `PutMetricData` call.
pub const MAX_DATUMS_PER_REQUEST: usize = 20;

const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// A `key=value` label attached to a datum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension {
    /// The dimension name.
    pub name: String,
    /// The dimension value.
    pub value: String,
}

/// Pre-aggregated statistics for a set of observations.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatisticSet {
    /// Number of observations.
    pub sample_count: f64,
    /// Sum of the observations.
    pub sum: f64,
    /// Smallest observation.
    pub minimum: f64,
    /// Largest observation.
    pub maximum: f64,
}

/// The payload of a datum: one scalar or one statistic set.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum DatumValue {
    /// A single scalar observation.
    Value(f64),
    /// Pre-aggregated statistics over many observations.
    StatisticValues(StatisticSet),
}

/// The metric value units this crate reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Unit {
    /// No unit.
    #[default]
    None,
    /// A count of occurrences.
    Count,
    /// A duration in milliseconds.
    Milliseconds,
}

impl Unit {
    /// The public name defined by CloudWatch for the unit.
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Count => "Count",
            Self::Milliseconds => "Milliseconds",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Unit {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

/// One metric observation bound for CloudWatch.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricDatum {
    /// The decoded metric name, without dimension tokens.
    pub metric_name: String,
    /// Dimensions decoded from the metric name.
    pub dimensions: Vec<Dimension>,
    /// The observation itself.
    #[serde(flatten)]
    pub value: DatumValue,
    /// The unit of the observation.
    pub unit: Unit,
    /// When the observation batch was collected.
    #[serde(serialize_with = "serialize_epoch_millis")]
    pub timestamp: SystemTime,
}

/// One `PutMetricData` request: a namespace and up to
/// [`MAX_DATUMS_PER_REQUEST`] datums.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutMetricDataInput {
    /// The namespace all datums in this batch belong to.
    pub namespace: String,
    /// The datums.
    pub metric_data: Vec<MetricDatum>,
}

pub(crate) fn epoch_millis(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn serialize_epoch_millis<S>(timestamp: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(epoch_millis(*timestamp))
}

/// The error cases for a [`CloudWatchClient`] call.
#[derive(Debug)]
pub enum ClientError {
    /// Writing to the local destination failed.
    Io(io::Error),
    /// The remote service rejected the request or the transport failed.
    Service(Box<dyn Error + Send + Sync>),
}

impl ClientError {
    /// Wrap a failure raised by an SDK-backed client.
    pub fn service(source: impl Error + Send + Sync + 'static) -> Self {
        Self::Service(Box::new(source))
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => fmt::Display::fmt(err, f),
            Self::Service(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl Error for ClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Service(err) => Some(&**err),
        }
    }
}

impl From<io::Error> for ClientError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ClientError> for ReportError {
    fn from(value: ClientError) -> Self {
        ReportError::new(value)
    }
}

/// Transmits datum batches to CloudWatch.
///
/// This is the boundary to the external delivery machinery: an SDK-backed
/// implementation signs and sends `PutMetricData` requests, the bundled
/// [`EmfClient`](crate::EmfClient) writes log lines, and tests record the
/// batches. Implementations own their retry policy; this crate never
/// retries.
pub trait CloudWatchClient: Send + Sync {
    /// Deliver one batch of at most [`MAX_DATUMS_PER_REQUEST`] datums.
    fn put_metric_data(&self, input: PutMetricDataInput) -> Result<(), ClientError>;

    /// Flush anything the client buffers. The default is a no-op.
    fn flush(&self) -> Result<(), ClientError> {
        Ok(())
    }
}

/// A boxed [`CloudWatchClient`] with the transport type erased.
pub type BoxCloudWatchClient = Box<dyn CloudWatchClient>;

impl<C: CloudWatchClient + ?Sized> CloudWatchClient for Box<C> {
    fn put_metric_data(&self, input: PutMetricDataInput) -> Result<(), ClientError> {
        (**self).put_metric_data(input)
    }

    fn flush(&self) -> Result<(), ClientError> {
        (**self).flush()
    }
}

impl<C: CloudWatchClient + ?Sized> CloudWatchClient for std::sync::Arc<C> {
    fn put_metric_data(&self, input: PutMetricDataInput) -> Result<(), ClientError> {
        (**self).put_metric_data(input)
    }

    fn flush(&self) -> Result<(), ClientError> {
        (**self).flush()
    }
}

#[derive(Default)]
struct DeltaState {
    counters: HashMap<String, i64>,
    meters: HashMap<String, u64>,
}

/// Translates snapshots into datum batches and delivers them to a client.
///
/// Counters and meters are cumulative in the snapshot; this reporter keeps
/// the previously reported totals and sends the per-cycle delta (the first
/// cycle sends the whole total). Non-positive deltas, empty distributions,
/// and non-finite gauge values produce no datum, so an idle cycle makes no
/// client call at all.
pub struct CloudWatchReporter {
    namespace: String,
    client: BoxCloudWatchClient,
    state: Mutex<DeltaState>,
}

impl fmt::Debug for CloudWatchReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudWatchReporter")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl CloudWatchReporter {
    /// A reporter delivering batches under `namespace` through `client`.
    pub fn new(namespace: impl Into<String>, client: BoxCloudWatchClient) -> Self {
        Self {
            namespace: namespace.into(),
            client,
            state: Mutex::new(DeltaState::default()),
        }
    }

    /// The namespace batches are delivered under.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl Report for CloudWatchReporter {
    fn report(&self, snapshot: MetricSnapshot) -> Result<(), ReportError> {
        let timestamp = SystemTime::now();
        let mut datums = Vec::with_capacity(snapshot.len());

        {
            let mut state = self.state.lock().unwrap();
            for (key, count) in &snapshot.counters {
                let previous = state.counters.insert(key.clone(), *count).unwrap_or(0);
                let delta = *count - previous;
                if delta <= 0 {
                    continue;
                }
                datums.push(datum(key, DatumValue::Value(delta as f64), Unit::Count, timestamp));
            }
            for (key, count) in &snapshot.meters {
                let previous = state.meters.insert(key.clone(), *count).unwrap_or(0);
                let delta = count.saturating_sub(previous);
                if delta == 0 {
                    continue;
                }
                datums.push(datum(key, DatumValue::Value(delta as f64), Unit::Count, timestamp));
            }
        }

        for (key, value) in &snapshot.gauges {
            if !value.is_finite() {
                tracing::debug!(metric = %key, value, "skipping non-finite gauge value");
                continue;
            }
            datums.push(datum(key, DatumValue::Value(*value), Unit::None, timestamp));
        }

        for (key, distribution) in &snapshot.histograms {
            if distribution.is_empty() {
                continue;
            }
            datums.push(datum(
                key,
                DatumValue::StatisticValues(statistic_set(distribution, 1.0)),
                Unit::None,
                timestamp,
            ));
        }

        for (key, distribution) in &snapshot.timers {
            if distribution.is_empty() {
                continue;
            }
            // timers record nanoseconds; CloudWatch wants milliseconds
            datums.push(datum(
                key,
                DatumValue::StatisticValues(statistic_set(distribution, NANOS_PER_MILLI)),
                Unit::Milliseconds,
                timestamp,
            ));
        }

        if datums.is_empty() {
            tracing::trace!("no datums to send this cycle");
            return Ok(());
        }
        tracing::debug!(datums = datums.len(), namespace = %self.namespace, "sending metric batch");

        for chunk in datums.chunks(MAX_DATUMS_PER_REQUEST) {
            self.client.put_metric_data(PutMetricDataInput {
                namespace: self.namespace.clone(),
                metric_data: chunk.to_vec(),
            })?;
        }
        self.client.flush()?;
        Ok(())
    }
}

fn statistic_set(distribution: &Distribution, divisor: f64) -> StatisticSet {
    StatisticSet {
        sample_count: distribution.count as f64,
        sum: distribution.sum as f64 / divisor,
        minimum: distribution.min as f64 / divisor,
        maximum: distribution.max as f64 / divisor,
    }
}

fn datum(key: &str, value: DatumValue, unit: Unit, timestamp: SystemTime) -> MetricDatum {
    let (metric_name, dimensions) = decode_name(key);
    MetricDatum {
        metric_name,
        dimensions,
        value,
        unit,
        timestamp,
    }
}

// Splits a snapshot key into the datum name and its dimensions. Keys are
// space-separated token lists; tokens containing `=` are dimensions, with a
// trailing `*` permutation marker stripped from the value. The remaining
// tokens re-join into the metric name.
fn decode_name(key: &str) -> (String, Vec<Dimension>) {
    let mut name_tokens = Vec::new();
    let mut dimensions = Vec::new();
    for token in key.split_whitespace() {
        match token.split_once('=') {
            Some((name, value)) if !name.is_empty() => {
                let value = value.strip_suffix('*').unwrap_or(value);
                dimensions.push(Dimension {
                    name: name.to_string(),
                    value: value.to_string(),
                });
            }
            _ => name_tokens.push(token),
        }
    }
    (name_tokens.join(" "), dimensions)
}
