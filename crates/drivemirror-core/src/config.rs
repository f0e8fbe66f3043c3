//! Configuration module for drivemirror.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation and defaults.
//! Every section is optional in the file; missing keys take their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for drivemirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub retry: RetryConfig,
    pub rate_limiting: RateLimitingConfig,
    pub uploads: UploadConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Concurrent folder listings while walking the remote tree.
    pub list_concurrency: usize,
    /// Concurrent file transfers within one folder.
    pub upload_concurrency: usize,
}

/// Backoff for transient remote failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt; 0 disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each further attempt.
    pub base_delay_ms: u64,
    /// Upper bound for a single delay.
    pub max_delay_ms: u64,
}

/// Client-side Drive API rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    pub list_requests_per_minute: u32,
    pub write_requests_per_minute: u32,
    pub upload_requests_per_minute: u32,
}

/// File transfer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Files larger than this many MiB go through a resumable session.
    /// 0 sends every file through one.
    pub resumable_threshold_mb: u64,
    /// Size of each resumable chunk in MiB.
    pub chunk_size_mb: u64,
}

impl UploadConfig {
    const MIB: u64 = 1024 * 1024;

    pub fn resumable_threshold_bytes(&self) -> u64 {
        self.resumable_threshold_mb.saturating_mul(Self::MIB)
    }

    pub fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size_mb.saturating_mul(Self::MIB)
    }
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Optional file that receives a copy of every log line.
    pub file: Option<PathBuf>,
    /// Write the log file as JSON lines.
    pub json: bool,
}

/// Authentication / OAuth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Google OAuth client ID ("Desktop app"). `None` until configured.
    pub client_id: Option<String>,
    /// Client secret issued alongside the desktop client ID.
    pub client_secret: Option<String>,
    /// Keyring username under which tokens are stored.
    pub account: String,
    /// Loopback port for the OAuth redirect.
    pub redirect_port: u16,
}

// ---------------------------------------------------------------------------
// Config::load()
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
    /// Typically `$XDG_CONFIG_HOME/drivemirror/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("drivemirror")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            list_concurrency: 8,
            upload_concurrency: 4,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            list_requests_per_minute: 600,
            write_requests_per_minute: 180,
            upload_requests_per_minute: 120,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            resumable_threshold_mb: 5,
            chunk_size_mb: 8,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json: false,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            account: "default".to_string(),
            redirect_port: 8400,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.list_concurrency"`.
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
pub const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Upper bound for both concurrency knobs.
const MAX_CONCURRENCY: usize = 64;

/// Upper bound for `uploads.chunk_size_mb`.
const MAX_CHUNK_SIZE_MB: u64 = 256;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        for (field, value) in [
            ("sync.list_concurrency", self.sync.list_concurrency),
            ("sync.upload_concurrency", self.sync.upload_concurrency),
        ] {
            if value == 0 || value > MAX_CONCURRENCY {
                errors.push(ValidationError {
                    field: field.into(),
                    message: format!("must be in range 1..={MAX_CONCURRENCY}"),
                });
            }
        }

        // --- retry ---
        if self.retry.base_delay_ms == 0 {
            errors.push(ValidationError {
                field: "retry.base_delay_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            errors.push(ValidationError {
                field: "retry.max_delay_ms".into(),
                message: format!(
                    "max_delay_ms ({}) must not be below base_delay_ms ({})",
                    self.retry.max_delay_ms, self.retry.base_delay_ms
                ),
            });
        }

        // --- rate_limiting ---
        for (field, value) in [
            (
                "rate_limiting.list_requests_per_minute",
                self.rate_limiting.list_requests_per_minute,
            ),
            (
                "rate_limiting.write_requests_per_minute",
                self.rate_limiting.write_requests_per_minute,
            ),
            (
                "rate_limiting.upload_requests_per_minute",
                self.rate_limiting.upload_requests_per_minute,
            ),
        ] {
            if value == 0 {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        }

        // --- uploads ---
        if self.uploads.chunk_size_mb == 0 || self.uploads.chunk_size_mb > MAX_CHUNK_SIZE_MB {
            errors.push(ValidationError {
                field: "uploads.chunk_size_mb".into(),
                message: format!("must be in range 1..={MAX_CHUNK_SIZE_MB}"),
            });
        }

        // --- logging ---
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

        // --- auth ---
        if matches!(self.auth.client_id.as_deref(), Some(id) if id.trim().is_empty()) {
            errors.push(ValidationError {
                field: "auth.client_id".into(),
                message: "must not be empty when set".into(),
            });
        }
        if self.auth.account.trim().is_empty() {
            errors.push(ValidationError {
                field: "auth.account".into(),
                message: "must not be empty".into(),
            });
        }
        if self.auth.redirect_port == 0 {
            errors.push(ValidationError {
                field: "auth.redirect_port".into(),
                message: "must be greater than 0".into(),
            });
        }

        errors
    }
}
