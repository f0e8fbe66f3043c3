//! Sync command - Mirror a local folder into Drive
//!
//! Provides the `drivemirror sync` CLI command which:
//! 1. Checks the local folder before any remote call
//! 2. Loads (and if needed refreshes) the stored OAuth tokens
//! 3. Runs the sync engine, or only plans the run with `--dry-run`
//! 4. Prints the mutation summary; Ctrl-C or SIGTERM cancel the run

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use drivemirror_core::config::Config;
use drivemirror_core::domain::SyncPlan;
use drivemirror_gdrive::auth::{DriveAuthAdapter, KeyringTokenRefresher, KeyringTokenStorage, OAuth2Config};
use drivemirror_gdrive::client::DriveClient;
use drivemirror_gdrive::provider::DriveRemoteStore;
use drivemirror_gdrive::rate_limit::AdaptiveRateLimiter;
use drivemirror_sync::filesystem::LocalFileSystemAdapter;
use drivemirror_sync::{SyncEngine, SyncError, SyncResult};

use super::AppContext;
use crate::output::{format_duration_ms, plural, OutputFormatter};

/// Arguments of `drivemirror sync`
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Local folder to mirror; its name becomes the top-level Drive folder
    pub local_folder: PathBuf,

    /// Show the structural changes without touching Drive
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &AppContext, config: &Config) -> Result<ExitCode> {
        let formatter = ctx.formatter();

        let errors = config.validate();
        if !errors.is_empty() {
            let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
            return Err(SyncError::Config(format!("invalid configuration: {}", joined.join("; "))).into());
        }

        let root = preflight(&self.local_folder)?;
        info!(root = %root.display(), dry_run = self.dry_run, "Starting sync");

        let store = build_remote_store(config).await?;
        let cancel = CancellationToken::new();
        let engine = SyncEngine::new(Arc::new(store), Arc::new(LocalFileSystemAdapter::new()), config)
            .with_cancellation(cancel.clone());

        let signal = tokio::spawn(shutdown_signal(cancel.clone()));

        let outcome = if self.dry_run {
            engine.plan(&root).await.map(|plan| {
                print_plan(formatter.as_ref(), ctx.is_json(), &plan);
                ExitCode::SUCCESS
            })
        } else {
            engine
                .sync(&root)
                .await
                .map(|result| print_result(formatter.as_ref(), ctx.is_json(), &result))
        };

        signal.abort();
        Ok(outcome?)
    }
}

/// Makes the folder absolute and checks it can be walked
///
/// Symlinks are not resolved: the last segment as typed names the remote
/// root. A path ending in `..` has no such segment and is resolved instead.
fn preflight(folder: &Path) -> Result<PathBuf, SyncError> {
    let cannot_access =
        |e: std::io::Error| SyncError::Config(format!("cannot access {}: {e}", folder.display()));

    let mut root = std::path::absolute(folder).map_err(cannot_access)?;
    if root.file_name().is_none() {
        root = root.canonicalize().map_err(cannot_access)?;
    }
    let metadata = std::fs::metadata(&root).map_err(cannot_access)?;
    if !metadata.is_dir() {
        return Err(SyncError::Config(format!("{} is not a directory", root.display())));
    }
    std::fs::read_dir(&root).map_err(|e| {
        SyncError::Config(format!("{} is not readable: {e}", root.display()))
    })?;
    Ok(root)
}

/// Builds the Drive store from the keyring tokens
///
/// Tokens close to expiry are refreshed first. Without a configured client
/// id the stored access token is used as-is and a 401 ends the run.
async fn build_remote_store(config: &Config) -> Result<DriveRemoteStore, SyncError> {
    let account = config.auth.account.as_str();
    let tokens = KeyringTokenStorage::load(account)
        .map_err(|e| SyncError::Auth(format!("{e:#}")))?
        .ok_or_else(|| {
            SyncError::Auth(format!(
                "no stored credentials for account '{account}'; run `drivemirror auth login`"
            ))
        })?;

    let limiter = Arc::new(AdaptiveRateLimiter::new(&config.rate_limiting));
    let client_for = |access_token: String| {
        DriveClient::new(access_token)
            .with_rate_limiter(Arc::clone(&limiter))
            .with_upload_limits(
                config.uploads.resumable_threshold_bytes(),
                config.uploads.chunk_size_bytes(),
            )
    };

    if config.auth.client_id.is_none() {
        if tokens.is_expired(Utc::now()) {
            return Err(SyncError::Auth(
                "access token expired and auth.client_id is not set; cannot refresh".to_string(),
            ));
        }
        warn!("auth.client_id is not set; tokens will not be refreshed during the run");
        return Ok(DriveRemoteStore::new(client_for(tokens.access_token)));
    }

    let oauth = OAuth2Config::from_auth_config(&config.auth).map_err(|e| SyncError::Config(format!("{e:#}")))?;
    let tokens = DriveAuthAdapter::new(oauth.clone())
        .ensure_fresh(account, tokens)
        .await
        .map_err(|e| SyncError::Auth(format!("{e:#}")))?;
    debug!(expires_at = %tokens.expires_at, "Using stored access token");

    let client = client_for(tokens.access_token);
    let refresher = KeyringTokenRefresher::new(DriveAuthAdapter::new(oauth), account);
    Ok(DriveRemoteStore::new(client).with_refresher(Arc::new(refresher)))
}

/// Cancels `token` on Ctrl-C or SIGTERM
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), cancelling sync");
        }
        _ = terminate => {
            info!("Received SIGTERM, cancelling sync");
        }
    }

    token.cancel();
}

fn print_plan(formatter: &dyn OutputFormatter, json: bool, plan: &SyncPlan) {
    if json {
        match serde_json::to_value(plan) {
            Ok(value) => formatter.print_json(&value),
            Err(e) => formatter.error(&format!("Failed to serialize plan: {e}")),
        }
        return;
    }

    if plan.is_structurally_unchanged() {
        formatter.success(&format!(
            "Dry run: folder structure of '{}' is already mirrored",
            plan.root
        ));
    } else {
        formatter.success(&format!("Dry run for '{}'", plan.root));
    }
    for path in &plan.to_create {
        formatter.info(&format!("+ {path}/"));
    }
    for path in &plan.to_delete {
        formatter.info(&format!("- {path}/"));
    }
    formatter.info(&format!(
        "{} to create, {} to delete, {} to reconcile",
        plural(plan.to_create.len(), "folder"),
        plural(plan.to_delete.len(), "folder"),
        plural(plan.common.len(), "folder"),
    ));
}

/// Prints the run summary; item errors give a non-zero exit
fn print_result(formatter: &dyn OutputFormatter, json: bool, result: &SyncResult) -> ExitCode {
    let code = if result.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    };

    if json {
        match serde_json::to_value(result) {
            Ok(value) => formatter.print_json(&value),
            Err(e) => formatter.error(&format!("Failed to serialize result: {e}")),
        }
        return code;
    }

    if result.total_mutations() == 0 && result.is_clean() {
        formatter.success(&format!(
            "Already up to date ({})",
            format_duration_ms(result.duration_ms)
        ));
        return code;
    }

    formatter.success(&format!(
        "Sync finished in {}",
        format_duration_ms(result.duration_ms)
    ));
    formatter.info(&format!(
        "Folders: {} created, {} deleted",
        result.folders_created, result.folders_deleted
    ));
    formatter.info(&format!(
        "Files:   {} created, {} updated, {} deleted",
        result.files_created, result.files_updated, result.files_deleted
    ));

    if !result.is_clean() {
        formatter.warn(&format!("{} failed", plural(result.errors.len(), "item")));
        for error in &result.errors {
            formatter.warn(&format!("  {error}"));
        }
    }
    code
}
