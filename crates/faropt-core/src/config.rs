use std::path::{Path, PathBuf};
use std::time::Duration;

use faropt_api::FarOptCredentials;
use faropt_api::schemas::StackSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use url::Url;

use crate::error::FarOptError;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error("Invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("Missing `{0}`: set it in the configuration or deploy the stack that provides it")]
    Missing(&'static str),
}

/// How `tell_model` writes the updated optimizer back.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ConcurrencyMode {
    /// Unconditional overwrite. Concurrent tells race and the last upload wins.
    #[default]
    LastWriteWins,
    /// Compare the object version observed at download before writing.
    Optimistic,
}

/// Configuration for the FarOpt context. Can be created with [FarOptConfigBuilder], from a
/// TOML file, or both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FarOptConfig {
    /// Base URL of the FarOpt gateway.
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Name of the deployed backend stack.
    pub stack_name: String,
    /// Bucket holding job archives and outputs.
    pub bucket: Option<String>,
    /// Bucket holding model blobs.
    pub async_bucket: Option<String>,
    pub job_table: Option<String>,
    pub recipe_table: Option<String>,
    pub cluster: String,
    pub task_definition: String,
    /// Container receiving the job location overrides.
    pub container_name: String,
    pub micro_function: String,
    pub log_group: String,
    pub log_stream_prefix: String,
    pub metrics_namespace: String,
    pub poll_interval_secs: u64,
    pub micro_timeout_secs: u64,
    pub concurrency: ConcurrencyMode,
    /// Local directory for packaged archives. Defaults to the system temp dir.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for FarOptConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9080".into(),
            api_key: None,
            stack_name: "faropt".into(),
            bucket: None,
            async_bucket: None,
            job_table: None,
            recipe_table: None,
            cluster: "FarOptCluster".into(),
            task_definition: "FarOptTask".into(),
            container_name: "FarOptImage".into(),
            micro_function: "faropt-micro".into(),
            log_group: "faroptlogGroup".into(),
            log_stream_prefix: "faroptlogs/FarOptImage".into(),
            metrics_namespace: "FarOpt".into(),
            poll_interval_secs: 3,
            micro_timeout_secs: 15 * 60,
            concurrency: ConcurrencyMode::LastWriteWins,
            scratch_dir: None,
        }
    }
}

impl FarOptConfig {
    /// Create a new [FarOptConfigBuilder] starting from the defaults.
    pub fn builder() -> FarOptConfigBuilder {
        FarOptConfigBuilder::new()
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Override fields from `FAROPT_ENDPOINT`, `FAROPT_API_KEY` and `FAROPT_STACK`.
    pub fn apply_env(self) -> Self {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// [`FarOptConfig::apply_env`] with variables looked up through `var`.
    pub fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(endpoint) = var("FAROPT_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(api_key) = var("FAROPT_API_KEY") {
            self.api_key = Some(api_key);
        }
        if let Some(stack) = var("FAROPT_STACK") {
            self.stack_name = stack;
        }
        self
    }

    /// Fill the storage locations that were not set explicitly from the stack outputs.
    pub fn apply_stack_outputs(&mut self, stack: &StackSchema) {
        fn fill(field: &mut Option<String>, stack: &StackSchema, key: &str) {
            if field.is_none() {
                *field = stack.output(key).map(str::to_string);
            }
        }
        fill(&mut self.bucket, stack, "s3output");
        fill(&mut self.async_bucket, stack, "s3asyncoutput");
        fill(&mut self.job_table, stack, "jobtable");
        fill(&mut self.recipe_table, stack, "recipetable");
    }

    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.endpoint).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            reason: e.to_string(),
        })
    }

    pub fn credentials(&self) -> Option<FarOptCredentials> {
        self.api_key.as_deref().map(FarOptCredentials::new)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn micro_timeout(&self) -> Duration {
        Duration::from_secs(self.micro_timeout_secs)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("faropt"))
    }

    pub fn bucket(&self) -> Result<&str, FarOptError> {
        required(&self.bucket, "bucket")
    }

    pub fn async_bucket(&self) -> Result<&str, FarOptError> {
        required(&self.async_bucket, "async_bucket")
    }

    pub fn job_table(&self) -> Result<&str, FarOptError> {
        required(&self.job_table, "job_table")
    }

    pub fn recipe_table(&self) -> Result<&str, FarOptError> {
        required(&self.recipe_table, "recipe_table")
    }
}

fn required<'a>(field: &'a Option<String>, name: &'static str) -> Result<&'a str, FarOptError> {
    field
        .as_deref()
        .ok_or(FarOptError::Config(ConfigError::Missing(name)))
}

/// Builder for the FarOptConfig
pub struct FarOptConfigBuilder {
    config: FarOptConfig,
}

impl FarOptConfigBuilder {
    pub(crate) fn new() -> FarOptConfigBuilder {
        FarOptConfigBuilder {
            config: FarOptConfig::default(),
        }
    }

    /// Start from an existing configuration, e.g. one loaded from a file.
    pub fn from_config(config: FarOptConfig) -> FarOptConfigBuilder {
        FarOptConfigBuilder { config }
    }

    /// Set the endpoint of the FarOpt gateway
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> FarOptConfigBuilder {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> FarOptConfigBuilder {
        self.config.api_key = Some(api_key.into());
        self
    }

    pub fn with_stack_name(mut self, stack_name: impl Into<String>) -> FarOptConfigBuilder {
        self.config.stack_name = stack_name.into();
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> FarOptConfigBuilder {
        self.config.bucket = Some(bucket.into());
        self
    }

    pub fn with_async_bucket(mut self, bucket: impl Into<String>) -> FarOptConfigBuilder {
        self.config.async_bucket = Some(bucket.into());
        self
    }

    pub fn with_job_table(mut self, table: impl Into<String>) -> FarOptConfigBuilder {
        self.config.job_table = Some(table.into());
        self
    }

    pub fn with_recipe_table(mut self, table: impl Into<String>) -> FarOptConfigBuilder {
        self.config.recipe_table = Some(table.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> FarOptConfigBuilder {
        self.config.poll_interval_secs = interval.as_secs();
        self
    }

    pub fn with_concurrency(mut self, mode: ConcurrencyMode) -> FarOptConfigBuilder {
        self.config.concurrency = mode;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> FarOptConfigBuilder {
        self.config.scratch_dir = Some(dir.into());
        self
    }

    /// Build the FarOptConfig
    pub fn build(self) -> FarOptConfig {
        self.config
    }
}
