// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Wires a [`ReporterConfig`] into a runnable [`Reporter`].

use cumulo_core::{MetricFilter, Registry};

use crate::cloudwatch::{BoxCloudWatchClient, CloudWatchClient, CloudWatchReporter};
use crate::config::{ClientSettings, ConfigError, Credentials, ReporterConfig};
use crate::emf::EmfClient;
use crate::environment::{Environment, MetadataSource};
use crate::reporter::{Reporter, WithDimensions};

/// Builds a [`Reporter`] from a [`ReporterConfig`].
///
/// ```no_run
/// use cumulo::{Registry, ReporterBuilder, ReporterConfig};
///
/// # fn main() -> Result<(), cumulo::ConfigError> {
/// let registry = Registry::new();
/// let config = ReporterConfig {
///     namespace: "myspace".to_string(),
///     global_dimensions: vec!["env=dev".to_string()],
///     ..Default::default()
/// };
/// let reporter = ReporterBuilder::from_config(config).build(registry)?;
/// # Ok(())
/// # }
/// ```
///
/// `build` resolves the environment once: the machine dimension comes from
/// the config override or the EC2 instance id (falling back to `localhost`),
/// and the region from the instance's availability zone (falling back to the
/// configured one). Without an injected client, metrics go to standard
/// output as EMF log lines.
pub struct ReporterBuilder {
    config: ReporterConfig,
    client: Option<BoxCloudWatchClient>,
    environment: Option<Environment>,
}

impl ReporterBuilder {
    /// Start building from a config.
    pub fn from_config(config: ReporterConfig) -> Self {
        Self {
            config,
            client: None,
            environment: None,
        }
    }

    /// Inject the transmitting client. Tests inject a recording client here;
    /// hosts with an SDK inject their `PutMetricData` adapter.
    pub fn client(mut self, client: impl CloudWatchClient + 'static) -> Self {
        self.client = Some(Box::new(client));
        self
    }

    /// Replace the instance metadata source behind environment discovery.
    pub fn metadata_source(mut self, source: impl MetadataSource + 'static) -> Self {
        self.environment = Some(Environment::new(source));
        self
    }

    /// Share an already-constructed [`Environment`], so its one probe serves
    /// both this reporter and the host's own region lookup.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Static credentials resolved from the config or process environment,
    /// for hosts constructing an SDK-backed client. `None` means let the
    /// SDK's own provider chain decide.
    pub fn resolved_credentials(&self) -> Option<Credentials> {
        Credentials::resolve(&self.config)
    }

    /// Network settings for the transmitting client's transport.
    pub fn client_settings(&self) -> &ClientSettings {
        &self.config.aws_client_configuration
    }

    /// Validate the config, resolve the environment, and assemble the
    /// reporting pipeline over `registry`.
    pub fn build(self, registry: Registry) -> Result<Reporter, ConfigError> {
        let Self {
            config,
            client,
            environment,
        } = self;
        config.validate()?;

        let filter =
            MetricFilter::new(&config.includes, &config.excludes, config.use_regex_filters)?;

        let environment = environment.unwrap_or_else(Environment::detect);
        let machine_id = environment.machine_id(config.machine_dimension.as_deref());
        let region = environment.region(Some(&config.aws_region));

        // The configured dimension list is never mutated, so building twice
        // from one config cannot stack machine tokens.
        let mut dimensions = config.global_dimensions.clone();
        dimensions.push(format!("machine={machine_id}*"));

        let client = client.unwrap_or_else(|| Box::new(EmfClient::stdout()));

        tracing::info!(
            namespace = %config.namespace,
            %region,
            machine = %machine_id,
            "configured CloudWatch metric reporting"
        );

        let pipeline = WithDimensions::new(
            CloudWatchReporter::new(config.namespace, client),
            &dimensions,
        );
        Ok(Reporter::new(registry, filter, Box::new(pipeline)))
    }
}
