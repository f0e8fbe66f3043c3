//! OAuth2 PKCE authentication for Google Drive
//!
//! Implements the installed-app Authorization Code flow with PKCE
//! (RFC 7636) against Google's OAuth endpoints.
//!
//! ## Components
//!
//! - [`OAuth2Config`] - Client credentials, redirect URI and scopes
//! - [`Tokens`] - Access/refresh token pair with expiry
//! - [`KeyringTokenStorage`] - Token persistence in the system keyring
//! - [`PKCEFlow`] - Authorization URL, code exchange and refresh
//! - [`LocalCallbackServer`] - Loopback HTTP server for the redirect
//! - [`DriveAuthAdapter`] - Browser login orchestration
//! - [`KeyringTokenRefresher`] - Refresh-and-store hook used by the provider
//!
//! ## Design Notes
//!
//! - Google only issues a refresh token when asked for offline access, and
//!   only on the first consent unless consent is prompted again. The
//!   authorization URL therefore carries `access_type=offline` and
//!   `prompt=consent`.
//! - Desktop-app clients registered with Google come with a client secret
//!   that is not actually secret; it is optional here and sent when set.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken,
    Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use drivemirror_core::config::AuthConfig;

use crate::provider::TokenRefresher;

/// Google OAuth2 authorization endpoint
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google OAuth2 token endpoint
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Full read/write access to the user's Drive
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Keyring service name for storing tokens
const KEYRING_SERVICE: &str = "drivemirror";

/// Tokens this close to expiry are refreshed before use
const REFRESH_MARGIN_MINUTES: i64 = 5;

// ============================================================================
// OAuth2Config
// ============================================================================

/// Configuration for the OAuth2 PKCE flow
#[derive(Debug, Clone)]
pub struct OAuth2Config {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl OAuth2Config {
    /// Config with the Drive scope and a loopback redirect on `port`
    pub fn new(client_id: impl Into<String>, port: u16) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: redirect_uri(port),
            scopes: vec![DRIVE_SCOPE.to_string()],
        }
    }

    /// Builds the config from the `auth` section
    ///
    /// # Errors
    /// Returns an error if no client id is configured
    pub fn from_auth_config(auth: &AuthConfig) -> Result<Self> {
        let client_id = auth
            .client_id
            .clone()
            .context("No OAuth client id configured (set auth.client_id or pass --client-id)")?;
        let mut config = Self::new(client_id, auth.redirect_port);
        config.client_secret = auth.client_secret.clone();
        Ok(config)
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }
}

fn redirect_uri(port: u16) -> String {
    format!("http://127.0.0.1:{port}/callback")
}

// ============================================================================
// Tokens
// ============================================================================

/// OAuth tokens as stored in the keyring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Tokens {
    /// Whether the access token is expired or expires within five minutes
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::minutes(REFRESH_MARGIN_MINUTES) <= now
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// ============================================================================
// KeyringTokenStorage
// ============================================================================

/// Stores and retrieves OAuth tokens from the system keyring
///
/// Tokens are serialized as JSON under the service name "drivemirror", with
/// the configured account name as the keyring username.
pub struct KeyringTokenStorage;

impl KeyringTokenStorage {
    fn entry(account: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(KEYRING_SERVICE, account).context("Failed to create keyring entry")
    }

    pub fn store(account: &str, tokens: &Tokens) -> Result<()> {
        let json = serde_json::to_string(tokens).context("Failed to serialize tokens")?;
        Self::entry(account)?
            .set_password(&json)
            .context("Failed to store tokens in keyring")?;
        debug!(account, "Stored tokens in keyring");
        Ok(())
    }

    /// Loads tokens, or `None` if the account has none stored
    pub fn load(account: &str) -> Result<Option<Tokens>> {
        match Self::entry(account)?.get_password() {
            Ok(json) => {
                let tokens = serde_json::from_str(&json)
                    .context("Failed to deserialize tokens from keyring")?;
                debug!(account, "Loaded tokens from keyring");
                Ok(Some(tokens))
            }
            Err(keyring::Error::NoEntry) => {
                debug!(account, "No tokens found in keyring");
                Ok(None)
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
        }
    }

    pub fn clear(account: &str) -> Result<()> {
        match Self::entry(account)?.delete_credential() {
            Ok(()) => {
                info!(account, "Cleared tokens from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => {
                debug!(account, "No tokens to clear");
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to delete from keyring")),
        }
    }
}

// ============================================================================
// PKCEFlow
// ============================================================================

/// OAuth2 PKCE flow using the `oauth2` crate
pub struct PKCEFlow {
    client: BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>,
    scopes: Vec<String>,
    http: reqwest::Client,
}

impl PKCEFlow {
    pub fn new(config: &OAuth2Config) -> Result<Self> {
        let mut client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_auth_uri(AuthUrl::new(AUTH_URL.to_string()).context("Invalid authorization URL")?)
            .set_token_uri(TokenUrl::new(TOKEN_URL.to_string()).context("Invalid token URL")?)
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_uri.clone()).context("Invalid redirect URI")?,
            );
        if let Some(secret) = &config.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }

        // Token endpoints must not be followed through redirects
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build OAuth HTTP client")?;

        Ok(Self {
            client,
            scopes: config.scopes.clone(),
            http,
        })
    }

    /// Authorization URL with a PKCE challenge
    ///
    /// Returns `(url, csrf_token, pkce_verifier)`; the verifier is needed
    /// for the code exchange.
    pub fn generate_auth_url(&self) -> (String, CsrfToken, PkceCodeVerifier) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut request = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent");
        for scope in &self.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }

        let (url, csrf_token) = request.set_pkce_challenge(pkce_challenge).url();
        debug!("Generated authorization URL");
        (url.to_string(), csrf_token, pkce_verifier)
    }

    pub async fn exchange_code(&self, code: String, pkce_verifier: PkceCodeVerifier) -> Result<Tokens> {
        info!("Exchanging authorization code for tokens");
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http)
            .await
            .context("Failed to exchange authorization code")?;

        Ok(Tokens {
            access_token: response.access_token().secret().to_string(),
            refresh_token: response.refresh_token().map(|t| t.secret().to_string()),
            expires_at: expires_at(response.expires_in()),
        })
    }

    /// Exchanges a refresh token for a new access token
    ///
    /// Google usually omits the refresh token from the response; the one
    /// passed in is kept in that case.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Tokens> {
        info!("Refreshing access token");
        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .context("Failed to refresh token")?;

        Ok(Tokens {
            access_token: response.access_token().secret().to_string(),
            refresh_token: response
                .refresh_token()
                .map(|t| t.secret().to_string())
                .or_else(|| Some(refresh_token.to_string())),
            expires_at: expires_at(response.expires_in()),
        })
    }
}

fn expires_at(expires_in: Option<std::time::Duration>) -> DateTime<Utc> {
    let lifetime = expires_in
        .and_then(|d| Duration::from_std(d).ok())
        .unwrap_or_else(|| Duration::hours(1));
    Utc::now() + lifetime
}

// ============================================================================
// LocalCallbackServer
// ============================================================================

/// Loopback HTTP server that receives the OAuth redirect
///
/// Serves connections until one carries an authorization code. Requests
/// without a code (favicon probes, user reloads) get an error page and the
/// server keeps waiting.
pub struct LocalCallbackServer {
    port: u16,
}

/// Parameters extracted from the OAuth2 callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

impl LocalCallbackServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Waits for the redirect and returns its parameters
    pub async fn wait_for_callback(&self) -> Result<CallbackParams> {
        use tokio::net::TcpListener;

        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind callback server to {addr}"))?;
        info!(%addr, "OAuth callback server listening");

        let (tx, rx) = oneshot::channel::<CallbackParams>();
        let tx = Arc::new(Mutex::new(Some(tx)));

        let acceptor = tokio::spawn(async move {
            loop {
                let stream = match listener.accept().await {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        warn!(error = %e, "Callback server accept failed");
                        continue;
                    }
                };
                tokio::spawn(serve_callback(stream, Arc::clone(&tx)));
            }
        });

        let params = rx.await;
        acceptor.abort();
        let params = params.context("Callback server stopped without receiving a code")?;
        info!("Received OAuth callback");
        Ok(params)
    }
}

type CallbackSender = Arc<Mutex<Option<oneshot::Sender<CallbackParams>>>>;

async fn serve_callback(stream: tokio::net::TcpStream, tx: CallbackSender) {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{header, Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;

    let service = service_fn(move |req: Request<hyper::body::Incoming>| {
        let tx = Arc::clone(&tx);
        async move {
            let uri = req.uri().to_string();
            debug!(uri = %uri, "Callback server received request");

            let (status, html) = match parse_callback_params(&uri) {
                Some(params) => {
                    if let Some(sender) = tx.lock().await.take() {
                        let _ = sender.send(params);
                    }
                    (StatusCode::OK, success_html())
                }
                None => (
                    StatusCode::BAD_REQUEST,
                    error_html(&callback_error(&uri)),
                ),
            };

            let mut response = Response::new(Full::new(Bytes::from(html)));
            *response.status_mut() = status;
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("text/html; charset=utf-8"),
            );
            Ok::<_, hyper::Error>(response)
        }
    });

    if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .await
    {
        warn!(error = %e, "Callback server connection error");
    }
}

/// Extracts `code` (required) and `state` from a callback URI
fn parse_callback_params(uri: &str) -> Option<CallbackParams> {
    let url = url::Url::parse(&format!("http://localhost{uri}")).ok()?;
    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }
    Some(CallbackParams {
        code: code?,
        state: state.unwrap_or_default(),
    })
}

/// Message for a callback without a code, using Google's `error` parameter if present
fn callback_error(uri: &str) -> String {
    url::Url::parse(&format!("http://localhost{uri}"))
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(k, _)| k == "error")
                .map(|(_, v)| format!("Authorization failed: {v}"))
        })
        .unwrap_or_else(|| "Missing authorization code in callback".to_string())
}

fn success_html() -> String {
    r#"<!DOCTYPE html>
<html>
<head><title>drivemirror - Authentication Successful</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Authentication Successful</h1>
    <p>drivemirror can now access your Google Drive.</p>
    <p>You can close this window and return to the terminal.</p>
</body>
</html>"#
        .to_string()
}

fn error_html(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>drivemirror - Authentication Error</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Authentication Error</h1>
    <p>{message}</p>
    <p>Please close this window and try again.</p>
</body>
</html>"#
    )
}

// ============================================================================
// DriveAuthAdapter
// ============================================================================

/// Runs the interactive login and token refreshes
pub struct DriveAuthAdapter {
    config: OAuth2Config,
}

impl DriveAuthAdapter {
    pub fn new(config: OAuth2Config) -> Self {
        Self { config }
    }

    /// Interactive login: open the browser, wait for the redirect, exchange the code
    ///
    /// `show_url` receives the authorization URL so it can be shown to the
    /// user in case no browser opens.
    pub async fn login(&self, show_url: impl FnOnce(&str)) -> Result<Tokens> {
        info!("Starting OAuth2 PKCE login flow");
        let flow = PKCEFlow::new(&self.config)?;
        let (auth_url, csrf_token, pkce_verifier) = flow.generate_auth_url();
        let port = url::Url::parse(&self.config.redirect_uri)
            .ok()
            .and_then(|u| u.port())
            .context("Redirect URI has no port")?;

        // Listen before the browser can redirect
        let server = LocalCallbackServer::new(port);
        let callback = tokio::spawn(async move { server.wait_for_callback().await });

        if let Err(e) = webbrowser::open(&auth_url) {
            warn!(error = %e, "Could not open a browser");
        }
        show_url(&auth_url);

        let params = callback.await.context("Callback server task failed")??;
        if params.state != *csrf_token.secret() {
            bail!("OAuth state mismatch; the callback did not come from this login");
        }

        let tokens = flow.exchange_code(params.code, pkce_verifier).await?;
        if tokens.refresh_token.is_none() {
            warn!("No refresh token issued; a new login will be needed when the token expires");
        }
        info!("OAuth2 PKCE login completed");
        Ok(tokens)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<Tokens> {
        PKCEFlow::new(&self.config)?.refresh_token(refresh_token).await
    }

    /// Returns tokens valid for at least five more minutes, refreshing and storing them if needed
    pub async fn ensure_fresh(&self, account: &str, tokens: Tokens) -> Result<Tokens> {
        if !tokens.needs_refresh(Utc::now()) {
            return Ok(tokens);
        }
        let Some(refresh_token) = tokens.refresh_token.as_deref() else {
            bail!("Access token expired and no refresh token is stored; run `drivemirror auth login`");
        };
        let refreshed = self.refresh(refresh_token).await?;
        KeyringTokenStorage::store(account, &refreshed)?;
        Ok(refreshed)
    }

    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }
}

// ============================================================================
// KeyringTokenRefresher
// ============================================================================

/// Refreshes the stored tokens of one account when the provider gets a 401
pub struct KeyringTokenRefresher {
    adapter: DriveAuthAdapter,
    account: String,
}

impl KeyringTokenRefresher {
    pub fn new(adapter: DriveAuthAdapter, account: impl Into<String>) -> Self {
        Self {
            adapter,
            account: account.into(),
        }
    }
}

#[async_trait]
impl TokenRefresher for KeyringTokenRefresher {
    async fn refresh_access_token(&self) -> Result<String> {
        let tokens = KeyringTokenStorage::load(&self.account)?
            .context("No stored tokens; run `drivemirror auth login`")?;
        let refresh_token = tokens
            .refresh_token
            .context("No refresh token stored; run `drivemirror auth login`")?;
        let refreshed = self.adapter.refresh(&refresh_token).await?;
        KeyringTokenStorage::store(&self.account, &refreshed)?;
        Ok(refreshed.access_token)
    }
}
