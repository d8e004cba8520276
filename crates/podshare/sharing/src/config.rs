//! Configuration for the sharing services

use podshare_audit::LogLayout;
use podshare_policy::DEFAULT_ACR_SUFFIX;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sharing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingConfig {
    /// Upper bound for every object-store call, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Suffix of the policy document stored next to each resource
    #[serde(default = "default_acr_suffix")]
    pub acr_suffix: String,

    /// Notify recipients of grants
    #[serde(default = "default_true")]
    pub notify: bool,

    /// Notify recipients of revocations as well
    #[serde(default)]
    pub notify_on_revoke: bool,

    /// Audit log placement
    #[serde(default)]
    pub audit: LogLayout,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for SharingConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            acr_suffix: default_acr_suffix(),
            notify: true,
            notify_on_revoke: false,
            audit: LogLayout::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_acr_suffix() -> String {
    DEFAULT_ACR_SUFFIX.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SharingConfig {
    /// Load defaults, then the optional file, then `PODSHARE_*` variables.
    /// Nested keys use a double underscore: `PODSHARE_LOGGING__JSON=true`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        Self::load_with(path, environment())
    }

    fn load_with(
        path: Option<&str>,
        env: config::Environment,
    ) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        builder = builder.add_source(config::Config::try_from(&SharingConfig::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(env);
        builder.build()?.try_deserialize()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("PODSHARE")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
