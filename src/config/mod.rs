//! Harness configuration with YAML schema and validation.
//!
//! Configuration is checked in two passes:
//! - field ranges via the `validator` derive
//! - semantic checks that span fields (URL shape, timeout ordering)
//!
//! Credentials are not part of the file; hosts pass them to the API client
//! explicitly.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

use crate::error::{DocError, DocResult};
use crate::logging::Verbosity;
use crate::result::NumberMode;

/// Top-level harness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, Default)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Documentation service connection.
    #[validate(nested)]
    #[serde(default)]
    pub api: ApiConfig,

    /// Test execution.
    #[validate(nested)]
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HarnessConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - YAML parsing fails
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> DocResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns error if parsing or validation fails.
    pub fn from_yaml(yaml: &str) -> DocResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.check()?;
        Ok(config)
    }

    /// Create a builder.
    #[must_use]
    pub fn builder() -> HarnessConfigBuilder {
        HarnessConfigBuilder::default()
    }

    /// Run field and semantic validation.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn check(&self) -> DocResult<()> {
        self.validate()?;
        self.validate_semantic()
    }

    fn validate_semantic(&self) -> DocResult<()> {
        let host = self.api.host.trim();
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(DocError::config(format!(
                "api.host must be an http(s) URL, got '{}'",
                self.api.host
            )));
        }
        if self.api.handshake_timeout_secs > self.api.request_timeout_secs {
            return Err(DocError::config(format!(
                "api.handshake_timeout_secs ({}) must not exceed api.request_timeout_secs ({})",
                self.api.handshake_timeout_secs, self.api.request_timeout_secs
            )));
        }
        Ok(())
    }
}

/// Connection settings for the documentation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://api.example.com/tracking`.
    #[validate(length(min = 1))]
    #[serde(default = "default_host")]
    pub host: String,

    /// Handshake timeout.
    #[validate(range(min = 1, max = 600))]
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Per-request timeout for uploads.
    #[validate(range(min = 1, max = 3600))]
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Concurrent in-flight uploads before producers block.
    #[validate(range(min = 1, max = 256))]
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Sent as `X-MONITORING`.
    #[serde(default)]
    pub monitoring: bool,

    /// Reject non-finite numbers instead of encoding them as null.
    #[serde(default = "default_true")]
    pub strict_numbers: bool,
}

fn default_host() -> String {
    "http://localhost:5000/api/v1/tracking".to_string()
}

const fn default_handshake_timeout() -> u64 {
    30
}

const fn default_request_timeout() -> u64 {
    60
}

const fn default_max_in_flight() -> usize {
    16
}

const fn default_true() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            handshake_timeout_secs: default_handshake_timeout(),
            request_timeout_secs: default_request_timeout(),
            max_in_flight: default_max_in_flight(),
            monitoring: false,
            strict_numbers: true,
        }
    }
}

impl ApiConfig {
    /// Defaults with the given host.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Handshake timeout.
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Numeric encoding mode for uploads.
    #[must_use]
    pub const fn number_mode(&self) -> NumberMode {
        if self.strict_numbers {
            NumberMode::Strict
        } else {
            NumberMode::Lenient
        }
    }

    /// Host without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.host.trim().trim_end_matches('/')
    }
}

/// Test execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Suite worker threads; 1 runs leaves sequentially.
    #[validate(range(min = 1, max = 256))]
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Convert panics inside tests into execution errors.
    #[serde(default = "default_true")]
    pub catch_panics: bool,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4)
        .min(256)
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            catch_panics: true,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default verbosity when no filter variable is set.
    #[serde(default)]
    pub verbosity: Verbosity,
}

/// Configuration builder for programmatic construction.
#[derive(Debug, Default)]
pub struct HarnessConfigBuilder {
    host: Option<String>,
    workers: Option<usize>,
    max_in_flight: Option<usize>,
    request_timeout_secs: Option<u64>,
    monitoring: Option<bool>,
    strict_numbers: Option<bool>,
    verbosity: Option<Verbosity>,
}

impl HarnessConfigBuilder {
    /// Set the service host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the suite worker count.
    #[must_use]
    pub const fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Set the in-flight upload bound.
    #[must_use]
    pub const fn max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = Some(max_in_flight);
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub const fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    /// Set the monitoring flag.
    #[must_use]
    pub const fn monitoring(mut self, monitoring: bool) -> Self {
        self.monitoring = Some(monitoring);
        self
    }

    /// Choose strict or lenient number encoding.
    #[must_use]
    pub const fn strict_numbers(mut self, strict: bool) -> Self {
        self.strict_numbers = Some(strict);
        self
    }

    /// Set the logging verbosity.
    #[must_use]
    pub const fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = Some(verbosity);
        self
    }

    /// Build the configuration. Call [`HarnessConfig::check`] to validate.
    #[must_use]
    pub fn build(self) -> HarnessConfig {
        let mut config = HarnessConfig::default();

        if let Some(host) = self.host {
            config.api.host = host;
        }
        if let Some(workers) = self.workers {
            config.execution.workers = workers;
        }
        if let Some(max_in_flight) = self.max_in_flight {
            config.api.max_in_flight = max_in_flight;
        }
        if let Some(secs) = self.request_timeout_secs {
            config.api.request_timeout_secs = secs;
        }
        if let Some(monitoring) = self.monitoring {
            config.api.monitoring = monitoring;
        }
        if let Some(strict) = self.strict_numbers {
            config.api.strict_numbers = strict;
        }
        if let Some(verbosity) = self.verbosity {
            config.logging.verbosity = verbosity;
        }

        config
    }
}
