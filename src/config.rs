//! Configuration management for the CRPT client.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{CrptError, Result};
use crate::ratelimit::TimeWindow;

/// Default document creation endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://ismp.crpt.ru/api/v3/lk/documents/create";

/// Prefix for environment variable overrides, e.g.
/// `CRPT_RATE_LIMITING__REQUEST_LIMIT=5`.
const ENV_PREFIX: &str = "CRPT";

/// Main configuration for the CRPT client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrptConfig {
    /// HTTP client configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// HTTP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Document creation endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ClientConfig {
    /// Per-request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// Rate limiting configuration.
///
/// The window is one `time_unit` unless `interval_ms` overrides it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Maximum requests per window
    #[serde(default = "default_request_limit")]
    pub request_limit: u32,

    /// Window length as a named time unit
    #[serde(default)]
    pub time_unit: TimeWindow,

    /// Explicit window length in milliseconds
    #[serde(default)]
    pub interval_ms: Option<u64>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            request_limit: default_request_limit(),
            time_unit: TimeWindow::default(),
            interval_ms: None,
        }
    }
}

impl RateLimitingConfig {
    /// Effective window length.
    pub fn interval(&self) -> Duration {
        match self.interval_ms {
            Some(ms) => Duration::from_millis(ms),
            None => self.time_unit.duration(),
        }
    }
}

fn default_request_limit() -> u32 {
    10
}

impl CrptConfig {
    /// Load configuration from a file path, then apply environment overrides.
    ///
    /// The file format is inferred from the extension (YAML, TOML or JSON).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let builder = config::Config::builder().add_source(config::File::from(path));
        Self::build(builder)
    }

    /// Load configuration from environment overrides on top of the defaults.
    pub fn from_env() -> Result<Self> {
        Self::build(config::Config::builder())
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .map_err(|e| CrptError::Config(e.to_string()))?;
        Self::finish(settings)
    }

    /// Render the configuration as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| CrptError::Config(e.to_string()))
    }

    /// Reject values the rate limiter cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.request_limit == 0 {
            return Err(CrptError::InvalidConfiguration(
                "rate_limiting.request_limit must be positive".to_string(),
            ));
        }
        if self.rate_limiting.interval().is_zero() {
            return Err(CrptError::InvalidConfiguration(
                "rate_limiting.interval_ms must be positive".to_string(),
            ));
        }
        if self.client.endpoint.is_empty() {
            return Err(CrptError::InvalidConfiguration(
                "client.endpoint must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| CrptError::Config(e.to_string()))?;
        Self::finish(settings)
    }

    fn finish(settings: config::Config) -> Result<Self> {
        let config: CrptConfig = settings
            .try_deserialize()
            .map_err(|e| CrptError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
