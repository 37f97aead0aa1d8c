//! # Environment-Based Configuration
//!
//! Settings for the drivers that loop a backup session to completion.
//!
//! ## Environment Variables
//!
//! - `HOTCOPY_PAGES_PER_STEP` - Pages per step, a positive integer or `all`/`-1` (default: 100)
//! - `HOTCOPY_PAUSE_MS` - Pause between steps in milliseconds (default: 250)
//! - `HOTCOPY_MAX_RETRIES` - Consecutive busy/locked retries before giving up (default: 10)
//! - `HOTCOPY_RETRY_BACKOFF_MS` - Initial retry backoff in milliseconds, doubled per attempt (default: 100)
//! - `HOTCOPY_RETRY_MAX_BACKOFF_MS` - Backoff ceiling in milliseconds (default: 5000)
//! - `HOTCOPY_STEP_TIMEOUT_SECS` - Host-level deadline for a single step (default: none)
//! - `HOTCOPY_SOURCE_SCHEMA` - Attached database to copy from (default: main)
//! - `HOTCOPY_DEST_SCHEMA` - Attached database to copy into (default: main)

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pages::StepSize;
use crate::schema::SchemaName;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Backoff schedule for busy/locked steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Consecutive retryable failures tolerated before giving up
    pub max_retries: u32,
    /// Wait before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single wait
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Never retry; the first busy/locked step ends the run.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Wait before retry number `attempt` (1-based), doubling each time.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// Settings for driving a backup session to completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Pages copied per step
    pub pages_per_step: StepSize,
    /// Pause between successful steps, letting other users of the source in
    pub pause: Duration,
    /// Handling of busy/locked steps
    pub retry: RetryPolicy,
    /// Host-level deadline for a single step (async driver only)
    pub step_timeout: Option<Duration>,
    /// Attached database to copy from
    pub source_schema: SchemaName,
    /// Attached database to copy into
    pub destination_schema: SchemaName,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            pages_per_step: StepSize::default(),
            pause: Duration::from_millis(250),
            retry: RetryPolicy::default(),
            step_timeout: None,
            source_schema: SchemaName::main(),
            destination_schema: SchemaName::main(),
        }
    }
}

impl BackupConfig {
    pub fn builder() -> BackupConfigBuilder {
        BackupConfigBuilder::new()
    }

    /// Defaults overridden by `HOTCOPY_*` environment variables, validated
    pub fn from_env() -> Result<Self, ConfigError> {
        BackupConfigBuilder::from_env()?.build()
    }
}

/// Builder for `BackupConfig` with environment variable support
#[derive(Debug, Clone, Default)]
pub struct BackupConfigBuilder {
    config: BackupConfig,
}

impl BackupConfigBuilder {
    /// Create a new builder with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any environment variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = Self::default();

        if let Some(value) = get_env_string("HOTCOPY_PAGES_PER_STEP") {
            let pages = value
                .parse::<StepSize>()
                .map_err(|e| ConfigError::InvalidEnvVar {
                    key: "HOTCOPY_PAGES_PER_STEP".to_string(),
                    message: e.to_string(),
                })?;
            builder = builder.pages_per_step(pages);
        }
        if let Some(ms) = get_env_u64("HOTCOPY_PAUSE_MS")? {
            builder = builder.pause(Duration::from_millis(ms));
        }

        let mut retry = RetryPolicy::default();
        if let Some(max) = get_env_u32("HOTCOPY_MAX_RETRIES")? {
            retry.max_retries = max;
        }
        if let Some(ms) = get_env_u64("HOTCOPY_RETRY_BACKOFF_MS")? {
            retry.initial_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = get_env_u64("HOTCOPY_RETRY_MAX_BACKOFF_MS")? {
            retry.max_backoff = Duration::from_millis(ms);
        }
        builder = builder.retry(retry);

        if let Some(secs) = get_env_u64("HOTCOPY_STEP_TIMEOUT_SECS")? {
            builder = builder.step_timeout(Some(Duration::from_secs(secs)));
        }
        if let Some(schema) = get_env_schema("HOTCOPY_SOURCE_SCHEMA")? {
            builder = builder.source_schema(schema);
        }
        if let Some(schema) = get_env_schema("HOTCOPY_DEST_SCHEMA")? {
            builder = builder.destination_schema(schema);
        }

        Ok(builder)
    }

    #[must_use]
    pub fn pages_per_step(mut self, pages: StepSize) -> Self {
        self.config.pages_per_step = pages;
        self
    }

    #[must_use]
    pub fn pause(mut self, pause: Duration) -> Self {
        self.config.pause = pause;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.retry.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.step_timeout = timeout;
        self
    }

    #[must_use]
    pub fn source_schema(mut self, schema: SchemaName) -> Self {
        self.config.source_schema = schema;
        self
    }

    #[must_use]
    pub fn destination_schema(mut self, schema: SchemaName) -> Self {
        self.config.destination_schema = schema;
        self
    }

    /// Validate and build the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for inconsistent settings.
    pub fn build(self) -> Result<BackupConfig, ConfigError> {
        let config = self.config;

        if config.retry.initial_backoff > config.retry.max_backoff {
            return Err(ConfigError::ValidationError(format!(
                "retry backoff {:?} exceeds its ceiling {:?}",
                config.retry.initial_backoff, config.retry.max_backoff
            )));
        }

        if config.step_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ValidationError(
                "step timeout must be greater than zero".to_string(),
            ));
        }

        Ok(config)
    }
}

fn get_env_string(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn get_env_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid u64 value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}

fn get_env_u32(key: &str) -> Result<Option<u32>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<u32>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid u32 value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}

fn get_env_schema(key: &str) -> Result<Option<SchemaName>, ConfigError> {
    match env::var(key) {
        Ok(val) => SchemaName::new(val.clone())
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid schema name '{val}'"),
            }),
        Err(_) => Ok(None),
    }
}
