// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![deny(missing_docs)]

pub use cumulo_core::{
    BoxReport, Counter, Distribution, Gauge, Histogram, InvalidPatternError, Meter, MetricFilter,
    MetricSnapshot, Registry, Report, ReportError, RunningTimer, Timer,
};

pub use crate::builder::ReporterBuilder;
pub use crate::cloudwatch::{
    BoxCloudWatchClient, ClientError, CloudWatchClient, CloudWatchReporter, DatumValue, Dimension,
    MAX_DATUMS_PER_REQUEST, MetricDatum, PutMetricDataInput, StatisticSet, Unit,
};
pub use crate::config::{ClientSettings, ConfigError, Credentials, ReporterConfig};
pub use crate::emf::EmfClient;
pub use crate::environment::{
    DEFAULT_REGION, Environment, Imds, ImdsBuilder, InstanceMetadata, LOCALHOST, MetadataError,
    MetadataSource,
};
pub use crate::reporter::{Reporter, WithDimensions};

pub mod builder;
pub mod cloudwatch;
pub mod config;
pub mod emf;
pub mod environment;
pub mod reporter;
#[cfg(any(test, feature = "test-util"))]
pub mod test_util;
