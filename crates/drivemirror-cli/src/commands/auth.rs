//! Auth command - Manage Google Drive authentication
//!
//! Provides the `drivemirror auth` CLI command with three subcommands:
//! - `login`: interactive OAuth2 PKCE flow, tokens go to the OS keyring
//! - `logout`: removes the stored tokens
//! - `status`: shows token expiry and the Drive account

use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Subcommand;
use tracing::info;

use drivemirror_core::config::Config;
use drivemirror_gdrive::auth::{DriveAuthAdapter, KeyringTokenStorage, OAuth2Config, Tokens};
use drivemirror_gdrive::client::{AccountInfo, DriveClient};

use super::AppContext;
use crate::output::OutputFormatter;

/// Auth subcommands
#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Sign in to Google Drive
    Login {
        /// OAuth client id, overriding auth.client_id
        #[arg(long)]
        client_id: Option<String>,
        /// OAuth client secret, overriding auth.client_secret
        #[arg(long)]
        client_secret: Option<String>,
    },
    /// Remove the stored credentials
    Logout,
    /// Show the current authentication state
    Status,
}

impl AuthCommand {
    pub async fn execute(&self, ctx: &AppContext, config: &Config) -> Result<ExitCode> {
        match self {
            AuthCommand::Login {
                client_id,
                client_secret,
            } => {
                execute_login(ctx, config, client_id.clone(), client_secret.clone()).await
            }
            AuthCommand::Logout => execute_logout(ctx, config),
            AuthCommand::Status => execute_status(ctx, config).await,
        }
    }
}

/// Applies the command-line overrides to the configured OAuth client
fn oauth_config(
    config: &Config,
    client_id: Option<String>,
    client_secret: Option<String>,
) -> Result<OAuth2Config> {
    let mut auth = config.auth.clone();
    if client_id.is_some() {
        auth.client_id = client_id;
    }
    if client_secret.is_some() {
        auth.client_secret = client_secret;
    }
    OAuth2Config::from_auth_config(&auth)
}

async fn execute_login(
    ctx: &AppContext,
    config: &Config,
    client_id: Option<String>,
    client_secret: Option<String>,
) -> Result<ExitCode> {
    let formatter = ctx.formatter();
    let account = config.auth.account.as_str();

    let adapter = DriveAuthAdapter::new(oauth_config(config, client_id, client_secret)?);
    let tokens = adapter
        .login(|url| {
            formatter.info("Opening your browser to sign in to Google Drive.");
            formatter.info(&format!("If it does not open, visit: {url}"));
        })
        .await?;

    KeyringTokenStorage::store(account, &tokens).context("Failed to store tokens in the keyring")?;
    info!(account = %account, "Tokens stored");

    let about = DriveClient::new(tokens.access_token.clone()).about().await;

    if ctx.is_json() {
        let mut json = serde_json::json!({
            "success": true,
            "account": account,
            "expires_at": tokens.expires_at.to_rfc3339(),
        });
        if let Ok(info) = &about {
            json["user"] = account_json(info);
        }
        formatter.print_json(&json);
    } else {
        match &about {
            Ok(info) => formatter.success(&format!(
                "Logged in as {} <{}>",
                info.display_name, info.email
            )),
            Err(e) => {
                formatter.success("Logged in");
                formatter.warn(&format!("Could not fetch account details: {e}"));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn execute_logout(ctx: &AppContext, config: &Config) -> Result<ExitCode> {
    let formatter = ctx.formatter();
    let account = config.auth.account.as_str();

    KeyringTokenStorage::clear(account).context("Failed to clear the keyring entry")?;
    info!(account = %account, "Tokens removed");

    if ctx.is_json() {
        formatter.print_json(&serde_json::json!({"success": true, "account": account}));
    } else {
        formatter.success(&format!("Logged out of account '{account}'"));
    }
    Ok(ExitCode::SUCCESS)
}

async fn execute_status(ctx: &AppContext, config: &Config) -> Result<ExitCode> {
    let formatter = ctx.formatter();
    let account = config.auth.account.as_str();

    let Some(tokens) = KeyringTokenStorage::load(account)? else {
        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "authenticated": false,
                "account": account,
            }));
        } else {
            formatter.warn(&format!("Not logged in (account '{account}')"));
            formatter.info("Run `drivemirror auth login` to sign in.");
        }
        return Ok(ExitCode::from(3));
    };

    let tokens = refresh_if_possible(config, account, tokens, formatter.as_ref()).await;
    let expired = tokens.is_expired(Utc::now());
    let about = if expired {
        None
    } else {
        DriveClient::new(tokens.access_token.clone()).about().await.ok()
    };

    if ctx.is_json() {
        let mut json = serde_json::json!({
            "authenticated": !expired,
            "account": account,
            "expires_at": tokens.expires_at.to_rfc3339(),
            "has_refresh_token": tokens.refresh_token.is_some(),
        });
        if let Some(info) = &about {
            json["user"] = account_json(info);
        }
        formatter.print_json(&json);
    } else {
        if expired {
            formatter.warn(&format!("Token for account '{account}' has expired"));
        } else {
            formatter.success(&format!("Authenticated (account '{account}')"));
        }
        formatter.info(&format!("Token expires: {}", tokens.expires_at.to_rfc3339()));
        if let Some(info) = &about {
            formatter.info(&format!("User: {} <{}>", info.display_name, info.email));
            formatter.info(&format!("Storage: {}", format_quota(info)));
        }
    }

    Ok(if expired { ExitCode::from(3) } else { ExitCode::SUCCESS })
}

/// Refreshes near-expiry tokens when a client id is configured
async fn refresh_if_possible(
    config: &Config,
    account: &str,
    tokens: Tokens,
    formatter: &dyn OutputFormatter,
) -> Tokens {
    let Ok(oauth) = OAuth2Config::from_auth_config(&config.auth) else {
        return tokens;
    };
    match DriveAuthAdapter::new(oauth).ensure_fresh(account, tokens.clone()).await {
        Ok(fresh) => fresh,
        Err(e) => {
            formatter.warn(&format!("Token refresh failed: {e:#}"));
            tokens
        }
    }
}

fn account_json(info: &AccountInfo) -> serde_json::Value {
    serde_json::json!({
        "display_name": info.display_name,
        "email": info.email,
        "quota_used": info.quota_used,
        "quota_total": info.quota_total,
    })
}

fn format_quota(info: &AccountInfo) -> String {
    match info.quota_total {
        Some(total) => format!("{} of {} used", format_bytes(info.quota_used), format_bytes(total)),
        None => format!("{} used (unlimited)", format_bytes(info.quota_used)),
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
