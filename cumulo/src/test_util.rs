// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Test utilities for asserting on reported metric batches.
//!
//! Enable the `test-util` feature to use these from a host application's
//! tests:
//!
//! ```
//! use cumulo::test_util::test_client;
//! use cumulo::{DatumValue, Registry, ReporterBuilder, ReporterConfig};
//! # struct Offline;
//! # impl cumulo::MetadataSource for Offline {
//! #     fn fetch(&self) -> Result<cumulo::InstanceMetadata, cumulo::MetadataError> {
//! #         let path = "/latest/meta-data/instance-id";
//! #         Err(cumulo::MetadataError::Status { path, status: 404 })
//! #     }
//! # }
//!
//! let test = test_client();
//! let registry = Registry::new();
//! let config = ReporterConfig {
//!     namespace: "myspace".to_string(),
//!     machine_dimension: Some("test".to_string()),
//!     ..Default::default()
//! };
//! let reporter = ReporterBuilder::from_config(config)
//!     .metadata_source(Offline)
//!     .client(test.client)
//!     .build(registry.clone())
//!     .unwrap();
//!
//! registry.counter("requests").inc();
//! reporter.report_once().unwrap();
//!
//! assert_eq!(test.inspector.datum("requests").value, DatumValue::Value(1.0));
//! ```

use std::sync::{Arc, Mutex};

use crate::cloudwatch::{ClientError, CloudWatchClient, MetricDatum, PutMetricDataInput};

/// A [`RecordingClient`] together with the [`Inspector`] that reads what it
/// received.
#[derive(Debug)]
pub struct TestClient {
    /// Reads the captured requests.
    pub inspector: Inspector,
    /// The client to inject into the reporter pipeline.
    pub client: RecordingClient,
}

/// Creates a connected [`RecordingClient`] and [`Inspector`] pair.
pub fn test_client() -> TestClient {
    let requests = Arc::new(Mutex::new(Vec::new()));
    TestClient {
        inspector: Inspector {
            requests: requests.clone(),
        },
        client: RecordingClient { requests },
    }
}

/// A [`CloudWatchClient`] that records every request instead of sending it.
#[derive(Clone, Debug)]
pub struct RecordingClient {
    requests: Arc<Mutex<Vec<PutMetricDataInput>>>,
}

impl CloudWatchClient for RecordingClient {
    fn put_metric_data(&self, input: PutMetricDataInput) -> Result<(), ClientError> {
        self.requests.lock().unwrap().push(input);
        Ok(())
    }
}

/// Reads the requests captured by the paired [`RecordingClient`].
#[derive(Clone, Debug)]
pub struct Inspector {
    requests: Arc<Mutex<Vec<PutMetricDataInput>>>,
}

impl Inspector {
    /// All requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<PutMetricDataInput> {
        self.requests.lock().unwrap().clone()
    }

    /// All datums received so far, flattened across requests.
    pub fn datums(&self) -> Vec<MetricDatum> {
        self.requests()
            .into_iter()
            .flat_map(|request| request.metric_data)
            .collect()
    }

    /// The single datum reported under `name`.
    ///
    /// # Panics
    ///
    /// Panics if no datum or more than one datum carries that name.
    pub fn datum(&self, name: &str) -> MetricDatum {
        let mut matches: Vec<_> = self
            .datums()
            .into_iter()
            .filter(|datum| datum.metric_name == name)
            .collect();
        match matches.len() {
            0 => panic!("no datum named {name:?} was reported"),
            1 => matches.remove(0),
            n => panic!("{n} datums named {name:?} were reported"),
        }
    }
}
