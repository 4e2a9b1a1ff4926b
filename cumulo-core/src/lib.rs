// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![deny(missing_docs)]

pub use crate::filter::{InvalidPatternError, MetricFilter};
pub use crate::instrument::{
    Counter, Distribution, Gauge, Histogram, Meter, RunningTimer, Timer,
};
pub use crate::registry::Registry;
pub use crate::report::{BoxReport, MetricSnapshot, Report, ReportError};

pub mod filter;
pub mod instrument;
pub mod registry;
pub mod report;
