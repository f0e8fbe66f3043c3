//! drivemirror CLI - Command-line interface for drivemirror
//!
//! Provides the `drivemirror` binary: one-way mirroring of a local folder
//! into Google Drive, plus authentication and configuration management.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;
mod logging;
mod output;

use commands::{auth::AuthCommand, config::ConfigCommand, sync::SyncCommand, AppContext};
use drivemirror_sync::SyncError;
use logging::{LogLevel, LogSettings};
use output::{get_formatter, OutputFormat};

/// drivemirror - Mirror a local folder into Google Drive
#[derive(Parser)]
#[command(name = "drivemirror", version, about, long_about = None)]
struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Append log output to this file
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Log level (DEBUG, INFO, WARNING, ERROR, CRITICAL)
    #[arg(long, global = true, value_enum, ignore_case = true, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror a local folder into Drive
    Sync(SyncCommand),
    /// Manage authentication
    #[command(subcommand)]
    Auth(AuthCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = AppContext::new(format, cli.quiet, cli.config.clone());
    let formatter = get_formatter(format, cli.quiet);

    let config = match ctx.load_config() {
        Ok(config) => config,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return ExitCode::from(1);
        }
    };

    let settings = LogSettings {
        level: logging::resolve_level(cli.log_level, cli.verbose, cli.quiet, &config.logging.level),
        file: cli.log_file.clone().or_else(|| config.logging.file.clone()),
        json: config.logging.json,
    };
    if let Err(e) = logging::init(&settings) {
        formatter.error(&format!("{e:#}"));
        return ExitCode::from(1);
    }

    let result = match &cli.command {
        Commands::Sync(cmd) => cmd.execute(&ctx, &config).await,
        Commands::Auth(cmd) => cmd.execute(&ctx, &config).await,
        Commands::Config(cmd) => cmd.execute(&ctx, &config).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            let code = e
                .downcast_ref::<SyncError>()
                .map(SyncError::exit_code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
