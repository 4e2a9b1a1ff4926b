// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Discovery of the hosting environment from EC2 instance metadata.
//!
//! [`Environment`] wraps a [`MetadataSource`] and memoizes its one probe:
//! however many times the resolved machine id, region, or availability flag
//! are read, the source is consulted at most once. A failed probe is logged
//! at WARN and cached as "not on EC2", never surfaced as an error, so hosts
//! running outside EC2 fall back to explicit configuration or defaults
//! without special casing.

use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

/// Region used when neither instance metadata nor explicit configuration
/// provides one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Machine identifier used when no override is configured and instance
/// metadata is unavailable.
pub const LOCALHOST: &str = "localhost";

const DEFAULT_BASE_URL: &str = "http://169.254.169.254";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
const INSTANCE_ID_PATH: &str = "/latest/meta-data/instance-id";
const AVAILABILITY_ZONE_PATH: &str = "/latest/meta-data/placement/availability-zone";

/// Identity read from the instance metadata service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceMetadata {
    /// The instance id, e.g. `i-0123456789abcdef0`.
    pub instance_id: String,
    /// The availability zone the instance runs in, e.g. `us-east-1a`.
    pub availability_zone: String,
}

/// One-shot probe of the hosting environment.
///
/// [`Imds`] is the production source; tests substitute failing or canned
/// sources to pin down the fallback behavior.
pub trait MetadataSource: Send + Sync {
    /// Fetch the instance identity, failing if the environment does not
    /// provide one.
    fn fetch(&self) -> Result<InstanceMetadata, MetadataError>;
}

/// The error cases for a metadata probe.
#[derive(Debug)]
pub enum MetadataError {
    /// The metadata endpoint could not be reached, the request timed out, or
    /// the response body could not be read.
    Http(reqwest::Error),
    /// The metadata endpoint answered with a non-success status.
    Status {
        /// The metadata path that was requested.
        path: &'static str,
        /// The HTTP status code of the response.
        status: u16,
    },
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(err) => fmt::Display::fmt(err, f),
            Self::Status { path, status } => {
                write!(f, "metadata request for {path} returned status {status}")
            }
        }
    }
}

impl std::error::Error for MetadataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(err) => Some(err),
            Self::Status { .. } => None,
        }
    }
}

impl From<reqwest::Error> for MetadataError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

/// Instance metadata service client (IMDS, `http://169.254.169.254`).
///
/// Requests use short timeouts: on EC2 the link-local endpoint answers in
/// microseconds, and off EC2 the probe should give up quickly rather than
/// stall the host's startup. The HTTP client is built lazily inside
/// [`fetch`](MetadataSource::fetch), which runs at most once behind an
/// [`Environment`].
#[derive(Clone, Debug)]
pub struct Imds {
    base_url: String,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl Default for Imds {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Imds {
    /// Start building a client for the standard endpoint.
    pub fn builder() -> ImdsBuilder {
        ImdsBuilder::default()
    }

    fn get(
        &self,
        client: &reqwest::blocking::Client,
        path: &'static str,
    ) -> Result<String, MetadataError> {
        let response = client.get(format!("{}{path}", self.base_url)).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Status {
                path,
                status: status.as_u16(),
            });
        }
        Ok(response.text()?.trim().to_string())
    }
}

impl MetadataSource for Imds {
    fn fetch(&self) -> Result<InstanceMetadata, MetadataError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.read_timeout)
            .build()?;
        Ok(InstanceMetadata {
            instance_id: self.get(&client, INSTANCE_ID_PATH)?,
            availability_zone: self.get(&client, AVAILABILITY_ZONE_PATH)?,
        })
    }
}

/// Builder for [`Imds`].
#[derive(Clone, Debug)]
pub struct ImdsBuilder {
    base_url: String,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl Default for ImdsBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ImdsBuilder {
    /// Point the client at a different endpoint, e.g. a local mock server.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        // A trailing slash would double up with the absolute metadata paths.
        while self.base_url.ends_with('/') {
            self.base_url.pop();
        }
        self
    }

    /// Maximum time to wait for the TCP connection.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Maximum time to wait for a complete response.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Finish building the client.
    pub fn build(self) -> Imds {
        Imds {
            base_url: self.base_url,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
        }
    }
}

/// Memoizing resolver for machine identity and region.
///
/// The probe result (success or failure) is cached for the lifetime of the
/// `Environment`; environment changes after the first probe are intentionally
/// not observed. Building the reporter resolves everything eagerly, so the
/// probe's latency is paid once at startup and never on a reporting cycle.
pub struct Environment {
    source: Box<dyn MetadataSource>,
    probed: OnceLock<Option<InstanceMetadata>>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("probed", &self.probed)
            .finish()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::detect()
    }
}

impl Environment {
    /// An environment probed through the given source.
    pub fn new(source: impl MetadataSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            probed: OnceLock::new(),
        }
    }

    /// An environment probed through the standard instance metadata endpoint.
    pub fn detect() -> Self {
        Self::new(Imds::default())
    }

    /// The probed instance identity, or `None` off EC2.
    ///
    /// The first call runs the probe; every later call returns the cached
    /// outcome. A probe failure is logged and cached as `None`.
    pub fn metadata(&self) -> Option<&InstanceMetadata> {
        self.probed
            .get_or_init(|| match self.source.fetch() {
                Ok(metadata) => Some(metadata),
                Err(error) => {
                    tracing::warn!(
                        %error,
                        "instance metadata unavailable, assuming this host is not on EC2"
                    );
                    None
                }
            })
            .as_ref()
    }

    /// `true` if the instance metadata service answered the probe.
    pub fn is_metadata_available(&self) -> bool {
        self.metadata().is_some()
    }

    /// Resolve the machine identifier.
    ///
    /// A non-empty explicit value wins without consulting the probe; next
    /// comes the probed instance id; [`LOCALHOST`] covers everything else,
    /// including a probed id that is empty.
    pub fn machine_id(&self, explicit: Option<&str>) -> String {
        if let Some(explicit) = non_empty(explicit) {
            return explicit.to_string();
        }
        match self.metadata() {
            Some(metadata) if !metadata.instance_id.is_empty() => metadata.instance_id.clone(),
            _ => LOCALHOST.to_string(),
        }
    }

    /// Resolve the region.
    ///
    /// A probed availability zone wins, with its trailing zone letter
    /// stripped (`us-east-1a` becomes `us-east-1`); next comes the non-empty
    /// explicit value; last the [`DEFAULT_REGION`].
    pub fn region(&self, explicit: Option<&str>) -> String {
        if let Some(metadata) = self.metadata() {
            let zone = metadata.availability_zone.trim();
            if !zone.is_empty() {
                let mut region = zone.chars();
                region.next_back();
                return region.as_str().to_string();
            }
        }
        if let Some(explicit) = non_empty(explicit) {
            return explicit.to_string();
        }
        DEFAULT_REGION.to_string()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

#[cfg(test)]
mod test {
    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Counts probes and answers with a canned result.
    struct CountingSource {
        probes: Arc<AtomicUsize>,
        result: Option<InstanceMetadata>,
    }

    impl CountingSource {
        fn succeeding(instance_id: &str, availability_zone: &str) -> (Arc<AtomicUsize>, Self) {
            let probes = Arc::new(AtomicUsize::new(0));
            let source = Self {
                probes: probes.clone(),
                result: Some(InstanceMetadata {
                    instance_id: instance_id.to_string(),
                    availability_zone: availability_zone.to_string(),
                }),
            };
            (probes, source)
        }

        fn failing() -> Self {
            Self {
                probes: Arc::new(AtomicUsize::new(0)),
                result: None,
            }
        }
    }

    impl MetadataSource for CountingSource {
        fn fetch(&self) -> Result<InstanceMetadata, MetadataError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            match &self.result {
                Some(metadata) => Ok(metadata.clone()),
                None => Err(MetadataError::Status {
                    path: "/",
                    status: 500,
                }),
            }
        }
    }

    #[test]
    fn probe_runs_at_most_once() {
        let (probes, source) = CountingSource::succeeding("i-1234", "us-east-1a");
        let environment = Environment::new(source);
        assert!(environment.is_metadata_available());
        assert!(environment.is_metadata_available());
        environment.machine_id(None);
        environment.region(None);
        assert_eq!(probes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_probe_is_cached() {
        let environment = Environment::new(CountingSource::failing());
        assert!(!environment.is_metadata_available());
        assert!(!environment.is_metadata_available());
        assert_eq!(environment.metadata(), None);
    }

    #[test]
    fn explicit_machine_id_wins_over_probe() {
        let (probes, source) = CountingSource::succeeding("i-1234", "us-east-1a");
        let environment = Environment::new(source);
        assert_eq!(environment.machine_id(Some("10.0.0.1")), "10.0.0.1");
        // the override short-circuits before the probe
        assert_eq!(probes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn machine_id_falls_back_to_localhost() {
        let environment = Environment::new(CountingSource::failing());
        assert_eq!(environment.machine_id(None), "localhost");
        assert_eq!(environment.machine_id(Some("")), "localhost");
    }

    #[test]
    fn empty_probed_instance_id_counts_as_missing() {
        let (_, source) = CountingSource::succeeding("", "us-east-1a");
        let environment = Environment::new(source);
        assert_eq!(environment.machine_id(None), "localhost");
    }

    #[test]
    fn probed_machine_id_is_the_instance_id() {
        let (_, source) = CountingSource::succeeding("i-1234", "us-east-1a");
        let environment = Environment::new(source);
        assert_eq!(environment.machine_id(None), "i-1234");
    }

    #[test]
    fn region_strips_the_zone_letter() {
        let (_, source) = CountingSource::succeeding("i-1234", "us-east-1a");
        let environment = Environment::new(source);
        assert_eq!(environment.region(None), "us-east-1");
        // the probed zone also wins over an explicit region
        assert_eq!(environment.region(Some("eu-west-1")), "us-east-1");
    }

    #[test]
    fn explicit_region_is_used_when_probe_fails() {
        let environment = Environment::new(CountingSource::failing());
        assert_eq!(environment.region(Some("ap-southeast-2")), "ap-southeast-2");
    }

    #[test]
    fn region_defaults_when_nothing_resolves() {
        let environment = Environment::new(CountingSource::failing());
        assert_eq!(environment.region(None), DEFAULT_REGION);
        assert_eq!(environment.region(Some("")), DEFAULT_REGION);
    }

    #[test]
    fn empty_probed_zone_falls_through_to_explicit() {
        let (_, source) = CountingSource::succeeding("i-1234", "");
        let environment = Environment::new(source);
        assert_eq!(environment.region(Some("eu-central-1")), "eu-central-1");
    }

    #[test]
    fn metadata_error_display_names_the_path() {
        let error = MetadataError::Status {
            path: "/latest/meta-data/instance-id",
            status: 404,
        };
        let message = error.to_string();
        assert!(message.contains("/latest/meta-data/instance-id"));
        assert!(message.contains("404"));
        let _ = io::Error::other(error); // usable as a boxed source
    }
}
