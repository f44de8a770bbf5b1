//! Configuration module for Deckhand.
//!
//! Provides typed configuration structs that map to the YAML configuration
//! file, with loading, validation, defaults, and a builder for programmatic
//! use (mostly in tests).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for Deckhand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub conflicts: ConflictsConfig,
    pub logging: LoggingConfig,
}

/// Local database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between periodic background sync passes (0 disables the timer;
    /// sync then only runs on explicit triggers).
    pub interval_secs: u64,
    /// Maximum attempts per remote request before the entity is left for the
    /// next pass.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential retry backoff.
    pub retry_base_delay_ms: u64,
    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
}

/// Conflict resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictsConfig {
    /// Default conflict policy: `manual`, `keep_local`, or `accept_remote`.
    pub policy: String,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/deckhand/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("deckhand")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("deckhand")
                .join("deckhand.db"),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            max_retries: 5,
            retry_base_delay_ms: 1000,
            request_timeout_secs: 30,
        }
    }
}

impl Default for ConflictsConfig {
    fn default() -> Self {
        Self {
            policy: "manual".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.max_retries"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `conflicts.policy`.
const VALID_CONFLICT_POLICIES: &[&str] = &["manual", "keep_local", "accept_remote"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.sync.max_retries == 0 {
            errors.push(ValidationError {
                field: "sync.max_retries".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.retry_base_delay_ms == 0 {
            errors.push(ValidationError {
                field: "sync.retry_base_delay_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.request_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "sync.request_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        if !VALID_CONFLICT_POLICIES.contains(&self.conflicts.policy.as_str()) {
            errors.push(ValidationError {
                field: "conflicts.policy".into(),
                message: format!(
                    "invalid policy '{}'; valid options: {}",
                    self.conflicts.policy,
                    VALID_CONFLICT_POLICIES.join(", ")
                ),
            });
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.database.path = path;
        self
    }

    pub fn sync_interval_secs(mut self, seconds: u64) -> Self {
        self.config.sync.interval_secs = seconds;
        self
    }

    pub fn sync_max_retries(mut self, n: u32) -> Self {
        self.config.sync.max_retries = n;
        self
    }

    pub fn sync_retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.sync.retry_base_delay_ms = ms;
        self
    }

    pub fn sync_request_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.sync.request_timeout_secs = seconds;
        self
    }

    pub fn conflicts_policy(mut self, policy: impl Into<String>) -> Self {
        self.config.conflicts.policy = policy.into();
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
