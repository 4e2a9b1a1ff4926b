// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A [`CloudWatchClient`] that writes Embedded Metric Format log lines.
//!
//! Each datum becomes one JSON line. CloudWatch Logs extracts metrics from
//! the `_aws` directive, so shipping these lines through any log forwarder
//! produces the same metrics as calling `PutMetricData`, without signing or
//! an SDK dependency. This is the client the builder falls back to when none
//! is injected.

use std::io;
use std::sync::{Mutex, PoisonError};

use serde_json::json;
use smallvec::SmallVec;

use crate::cloudwatch::{
    ClientError, CloudWatchClient, DatumValue, MetricDatum, PutMetricDataInput, StatisticSet,
    Unit, epoch_millis,
};

/// Writes each datum as one EMF JSON line to the wrapped [`io::Write`].
pub struct EmfClient<W> {
    writer: Mutex<W>,
}

impl EmfClient<io::Stdout> {
    /// A client writing to standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: io::Write + Send> EmfClient<W> {
    /// A client writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consumes the client and returns the writer.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: io::Write + Send> CloudWatchClient for EmfClient<W> {
    fn put_metric_data(&self, input: PutMetricDataInput) -> Result<(), ClientError> {
        let mut writer = self.writer.lock().unwrap();
        for datum in &input.metric_data {
            let document = encode(&input.namespace, datum);
            writeln!(writer, "{document}")?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), ClientError> {
        Ok(self.writer.lock().unwrap().flush()?)
    }
}

fn encode(namespace: &str, datum: &MetricDatum) -> serde_json::Value {
    let dimension_names: SmallVec<[&str; 4]> = datum
        .dimensions
        .iter()
        .map(|dimension| dimension.name.as_str())
        .collect();
    let mut metric = json!({ "Name": datum.metric_name });
    if datum.unit != Unit::None {
        metric["Unit"] = json!(datum.unit.name());
    }

    let mut document = json!({
        "_aws": {
            "Timestamp": epoch_millis(datum.timestamp),
            "CloudWatchMetrics": [{
                "Namespace": namespace,
                "Dimensions": [dimension_names.as_slice()],
                "Metrics": [metric],
            }],
        },
    });
    for dimension in &datum.dimensions {
        document[dimension.name.as_str()] = json!(dimension.value);
    }
    document[datum.metric_name.as_str()] = match datum.value {
        DatumValue::Value(value) => json!(value),
        DatumValue::StatisticValues(set) => histogram_value(set),
    };
    document
}

// EMF has no statistic-set form, only value/count histograms. Rebuild a
// histogram whose count, sum, minimum and maximum match the set exactly:
// the minimum and maximum once each, and the remaining mass at the mean of
// what is left.
fn histogram_value(set: StatisticSet) -> serde_json::Value {
    let count = set.sample_count;
    if count <= 1.0 {
        return json!({ "Values": [set.sum], "Counts": [count] });
    }
    if count == 2.0 {
        return json!({ "Values": [set.minimum, set.maximum], "Counts": [1, 1] });
    }
    let middle = (set.sum - set.minimum - set.maximum) / (count - 2.0);
    json!({
        "Values": [set.minimum, middle, set.maximum],
        "Counts": [1, count - 2.0, 1],
    })
}
