// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Reporter configuration, shaped for direct deserialization from a host's
//! config file.

use std::env;
use std::error::Error;
use std::fmt;

use cumulo_core::InvalidPatternError;
use serde::{Deserialize, Serialize};

use crate::environment::DEFAULT_REGION;

/// Configuration for [`ReporterBuilder`](crate::ReporterBuilder).
///
/// Every field has a default, so a config file only names what it changes.
/// The one field without a usable default is `namespace`: building with an
/// empty namespace fails validation.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// The CloudWatch namespace all metrics report under. Required.
    pub namespace: String,
    /// Dimensions attached to every reported metric, as `key=value` tokens.
    pub global_dimensions: Vec<String>,
    /// Overrides the auto-discovered machine dimension value. When unset,
    /// the EC2 instance id is used, or `localhost` off EC2.
    pub machine_dimension: Option<String>,
    /// The region to report to when none can be discovered from instance
    /// metadata. A discovered availability zone always wins.
    pub aws_region: String,
    /// Static access key id. Both halves must be set to take effect.
    pub aws_access_key_id: Option<String>,
    /// Static secret access key. Both halves must be set to take effect.
    pub aws_secret_key: Option<String>,
    /// Session token accompanying temporary static credentials.
    pub aws_session_token: Option<String>,
    /// Network settings for the transmitting client.
    pub aws_client_configuration: ClientSettings,
    /// Metric names (or patterns, with `use_regex_filters`) to report.
    /// Empty means report everything.
    pub includes: Vec<String>,
    /// Metric names (or patterns, with `use_regex_filters`) to suppress.
    /// An exclude always beats an include.
    pub excludes: Vec<String>,
    /// Treat `includes` and `excludes` as regular expressions that must
    /// match the whole metric name, instead of literal names.
    pub use_regex_filters: bool,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            global_dimensions: Vec::new(),
            machine_dimension: None,
            aws_region: DEFAULT_REGION.to_string(),
            aws_access_key_id: None,
            aws_secret_key: None,
            aws_session_token: None,
            aws_client_configuration: ClientSettings::default(),
            includes: Vec::new(),
            excludes: Vec::new(),
            use_regex_filters: false,
        }
    }
}

impl fmt::Debug for ReporterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReporterConfig")
            .field("namespace", &self.namespace)
            .field("global_dimensions", &self.global_dimensions)
            .field("machine_dimension", &self.machine_dimension)
            .field("aws_region", &self.aws_region)
            .field("aws_access_key_id", &self.aws_access_key_id)
            .field("aws_secret_key", &redacted(&self.aws_secret_key))
            .field("aws_session_token", &redacted(&self.aws_session_token))
            .field("aws_client_configuration", &self.aws_client_configuration)
            .field("includes", &self.includes)
            .field("excludes", &self.excludes)
            .field("use_regex_filters", &self.use_regex_filters)
            .finish()
    }
}

impl ReporterConfig {
    /// Check the parts of the config that can be statically wrong: the
    /// namespace must be non-empty and every global dimension must be a
    /// well-formed `key=value` token.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::MissingNamespace);
        }
        for dimension in &self.global_dimensions {
            if !is_dimension_token(dimension) {
                return Err(ConfigError::InvalidDimension(dimension.clone()));
            }
        }
        Ok(())
    }
}

/// Network settings passed through to the transmitting client.
///
/// The bundled [`EmfClient`](crate::EmfClient) ignores these; an SDK-backed
/// client reads them via
/// [`ReporterBuilder::client_settings`](crate::ReporterBuilder::client_settings).
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Proxy host name, if requests must traverse a proxy.
    pub proxy_host: Option<String>,
    /// Proxy port.
    pub proxy_port: Option<u16>,
    /// Proxy user name, for authenticating proxies.
    pub proxy_username: Option<String>,
    /// Proxy password, for authenticating proxies.
    pub proxy_password: Option<String>,
    /// Connect timeout in milliseconds. Unset means the client's default.
    pub connect_timeout_ms: Option<u64>,
    /// Request timeout in milliseconds. Unset means the client's default.
    pub request_timeout_ms: Option<u64>,
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSettings")
            .field("proxy_host", &self.proxy_host)
            .field("proxy_port", &self.proxy_port)
            .field("proxy_username", &self.proxy_username)
            .field("proxy_password", &redacted(&self.proxy_password))
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

/// Static credentials resolved from the config or the process environment.
#[derive(Clone)]
pub struct Credentials {
    /// The access key id.
    pub access_key_id: String,
    /// The secret access key.
    pub secret_access_key: String,
    /// The session token, when the credentials are temporary.
    pub session_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &redacted(&self.session_token))
            .finish()
    }
}

impl Credentials {
    /// Resolve static credentials: an explicit pair in the config wins, then
    /// the standard `AWS_*` process environment. `None` means the
    /// transmitting client should fall back to its own provider chain.
    pub fn resolve(config: &ReporterConfig) -> Option<Self> {
        let explicit = non_empty(&config.aws_access_key_id).zip(non_empty(&config.aws_secret_key));
        if let Some((access_key_id, secret_access_key)) = explicit {
            return Some(Self {
                access_key_id: access_key_id.to_string(),
                secret_access_key: secret_access_key.to_string(),
                session_token: config.aws_session_token.clone(),
            });
        }
        Self::from_env()
    }

    /// Read `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and, if present,
    /// `AWS_SESSION_TOKEN` from the process environment.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            access_key_id: non_empty_var("AWS_ACCESS_KEY_ID")?,
            secret_access_key: non_empty_var("AWS_SECRET_ACCESS_KEY")?,
            session_token: non_empty_var("AWS_SESSION_TOKEN"),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

fn redacted(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "<redacted>")
}

fn is_dimension_token(token: &str) -> bool {
    match token.split_once('=') {
        Some((key, value)) => {
            !key.is_empty() && !value.is_empty() && !token.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

/// The ways building a reporter from a config can fail.
#[derive(Debug)]
pub enum ConfigError {
    /// The namespace was empty.
    MissingNamespace,
    /// A global dimension was not a `key=value` token.
    InvalidDimension(String),
    /// A metric filter pattern failed to compile.
    InvalidFilter(InvalidPatternError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingNamespace => f.write_str("metric namespace must not be empty"),
            Self::InvalidDimension(token) => {
                write!(f, "global dimension {token:?} is not a key=value token")
            }
            Self::InvalidFilter(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MissingNamespace | Self::InvalidDimension(_) => None,
            Self::InvalidFilter(err) => Some(err),
        }
    }
}

impl From<InvalidPatternError> for ConfigError {
    fn from(value: InvalidPatternError) -> Self {
        Self::InvalidFilter(value)
    }
}
