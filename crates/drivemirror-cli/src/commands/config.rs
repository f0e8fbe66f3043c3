//! Config command - View and manage drivemirror configuration
//!
//! Provides the `drivemirror config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Sets individual values via dot-notation keys
//! 3. Validates the configuration file and reports errors
//! 4. Prints the configuration file path

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use clap::Subcommand;
use tracing::info;

use drivemirror_core::config::Config;

use super::AppContext;

/// Keys accepted by `config set`
const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("sync.list_concurrency", "Concurrent folder listings"),
    ("sync.upload_concurrency", "Concurrent file transfers per folder"),
    ("retry.max_retries", "Retries for transient failures"),
    ("retry.base_delay_ms", "First backoff delay"),
    ("retry.max_delay_ms", "Backoff ceiling"),
    ("rate_limiting.list_requests_per_minute", ""),
    ("rate_limiting.write_requests_per_minute", ""),
    ("rate_limiting.upload_requests_per_minute", ""),
    ("uploads.resumable_threshold_mb", "Size above which uploads are resumable"),
    ("uploads.chunk_size_mb", "Resumable chunk size"),
    ("logging.level", "trace|debug|info|warn|error"),
    ("logging.file", "Log file path, empty to unset"),
    ("logging.json", "true|false"),
    ("auth.client_id", "Google OAuth client id, empty to unset"),
    ("auth.client_secret", "Google OAuth client secret, empty to unset"),
    ("auth.account", "Keyring account name"),
    ("auth.redirect_port", "Loopback port for the OAuth redirect"),
];

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "retry.max_retries")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &AppContext, config: &Config) -> Result<ExitCode> {
        match self {
            ConfigCommand::Show => execute_show(ctx, config),
            ConfigCommand::Set { key, value } => execute_set(ctx, config, key, value),
            ConfigCommand::Validate => execute_validate(ctx, config),
            ConfigCommand::Path => execute_path(ctx),
        }
    }
}

fn execute_show(ctx: &AppContext, config: &Config) -> Result<ExitCode> {
    let formatter = ctx.formatter();
    info!(config_path = %ctx.config_path.display(), "Showing configuration");

    if ctx.is_json() {
        let json = serde_json::to_value(config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration to YAML")?;
        formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
        formatter.info("");
        for line in yaml.lines() {
            formatter.info(line);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn execute_set(ctx: &AppContext, config: &Config, key: &str, value: &str) -> Result<ExitCode> {
    let formatter = ctx.formatter();
    let mut config = config.clone();

    if let Err(e) = apply_config_value(&mut config, key, value) {
        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": false,
                "key": key,
                "error": e.to_string(),
            }));
        } else {
            formatter.error(&format!("Failed to set '{key}': {e}"));
            formatter.info("Supported keys:");
            for (name, help) in SUPPORTED_KEYS {
                formatter.info(&format!("  {name:<42} {help}"));
            }
        }
        return Ok(ExitCode::from(1));
    }

    let errors: Vec<String> = config.validate().iter().map(ToString::to_string).collect();
    if !errors.is_empty() {
        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": false,
                "key": key,
                "errors": errors,
            }));
        } else {
            formatter.error(&format!("Invalid value for '{key}': {}", errors.join("; ")));
        }
        return Ok(ExitCode::from(1));
    }

    if let Some(parent) = ctx.config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
    }
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
    std::fs::write(&ctx.config_path, yaml).context("Failed to write configuration file")?;
    info!(key = %key, "Configuration value set");

    if ctx.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "key": key,
            "value": value,
            "config_path": ctx.config_path.display().to_string(),
        }));
    } else {
        formatter.success(&format!("Set {key} = {value}"));
        formatter.info(&format!("Saved to {}", ctx.config_path.display()));
    }
    Ok(ExitCode::SUCCESS)
}

fn execute_validate(ctx: &AppContext, config: &Config) -> Result<ExitCode> {
    let formatter = ctx.formatter();
    let exists = ctx.config_path.exists();
    let errors: Vec<String> = config.validate().iter().map(ToString::to_string).collect();

    if ctx.is_json() {
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": ctx.config_path.display().to_string(),
            "file_exists": exists,
            "errors": errors,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        if exists {
            formatter.info(&format!("File: {}", ctx.config_path.display()));
        } else {
            formatter.info(&format!(
                "No file at {}; using defaults",
                ctx.config_path.display()
            ));
        }
    } else {
        formatter.error(&format!("Configuration has {} error(s)", errors.len()));
        for error in &errors {
            formatter.info(&format!("- {error}"));
        }
    }

    Ok(if errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn execute_path(ctx: &AppContext) -> Result<ExitCode> {
    if ctx.is_json() {
        ctx.formatter().print_json(&serde_json::json!({
            "config_path": ctx.config_path.display().to_string(),
            "exists": ctx.config_path.exists(),
        }));
    } else {
        // Plain stdout so the path can be used in scripts
        println!("{}", ctx.config_path.display());
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Dot-notation setter
// ============================================================================

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| anyhow!("invalid value '{value}' for {key}: {e}"))
}

/// Empty string means unset
fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Applies `key = value` to `config`
pub fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "sync.list_concurrency" => config.sync.list_concurrency = parse(key, value)?,
        "sync.upload_concurrency" => config.sync.upload_concurrency = parse(key, value)?,
        "retry.max_retries" => config.retry.max_retries = parse(key, value)?,
        "retry.base_delay_ms" => config.retry.base_delay_ms = parse(key, value)?,
        "retry.max_delay_ms" => config.retry.max_delay_ms = parse(key, value)?,
        "rate_limiting.list_requests_per_minute" => {
            config.rate_limiting.list_requests_per_minute = parse(key, value)?
        }
        "rate_limiting.write_requests_per_minute" => {
            config.rate_limiting.write_requests_per_minute = parse(key, value)?
        }
        "rate_limiting.upload_requests_per_minute" => {
            config.rate_limiting.upload_requests_per_minute = parse(key, value)?
        }
        "uploads.resumable_threshold_mb" => {
            config.uploads.resumable_threshold_mb = parse(key, value)?
        }
        "uploads.chunk_size_mb" => config.uploads.chunk_size_mb = parse(key, value)?,
        "logging.level" => config.logging.level = value.to_lowercase(),
        "logging.file" => config.logging.file = optional(value).map(PathBuf::from),
        "logging.json" => config.logging.json = parse(key, value)?,
        "auth.client_id" => config.auth.client_id = optional(value),
        "auth.client_secret" => config.auth.client_secret = optional(value),
        "auth.account" => config.auth.account = value.to_string(),
        "auth.redirect_port" => config.auth.redirect_port = parse(key, value)?,
        _ => bail!("unknown configuration key '{key}'"),
    }
    Ok(())
}
