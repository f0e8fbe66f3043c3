//! Command implementations for the `drivemirror` binary

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use drivemirror_core::config::Config;

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

pub mod auth;
pub mod config;
pub mod sync;

/// Settings shared by every command
#[derive(Debug, Clone)]
pub struct AppContext {
    pub format: OutputFormat,
    pub quiet: bool,
    /// Configuration file in use
    pub config_path: PathBuf,
    /// Whether the path came from `--config`
    pub config_explicit: bool,
}

impl AppContext {
    pub fn new(format: OutputFormat, quiet: bool, config_path: Option<PathBuf>) -> Self {
        let config_explicit = config_path.is_some();
        Self {
            format,
            quiet,
            config_path: config_path.unwrap_or_else(Config::default_path),
            config_explicit,
        }
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format, self.quiet)
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Loads the configuration file
    ///
    /// A missing default file yields the defaults; a missing `--config`
    /// file or an unparsable one is an error.
    pub fn load_config(&self) -> Result<Config> {
        load_config_from(&self.config_path, self.config_explicit)
    }
}

fn load_config_from(path: &Path, explicit: bool) -> Result<Config> {
    if path.exists() {
        return Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()));
    }
    if explicit {
        bail!("Configuration file not found: {}", path.display());
    }
    Ok(Config::default())
}
