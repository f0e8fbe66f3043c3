//! drivemirror Google Drive - Drive v3 adapter
//!
//! Provides:
//! - OAuth2 authentication (Authorization Code with PKCE, keyring storage)
//! - A typed HTTP client for the Drive v3 `files` and `about` resources
//! - Client-side rate limiting per request class
//! - [`provider::DriveRemoteStore`], the `IRemoteStore` implementation
//!
//! ## Modules
//!
//! - [`auth`] - OAuth2 PKCE flow, loopback callback server, token storage
//! - [`client`] - Drive API HTTP client
//! - [`query`] - Drive search query construction
//! - [`rate_limit`] - Adaptive token buckets
//! - [`provider`] - Port adapter with error classification

pub mod auth;
pub mod client;
pub mod provider;
pub mod query;
pub mod rate_limit;

use std::time::Duration;

use drivemirror_core::ports::RemoteError;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// 403 reason reported when the account is out of storage
const REASON_QUOTA: &str = "storageQuotaExceeded";

/// 403 reasons that mean "slow down" rather than "not allowed"
const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

/// Errors returned by the Drive HTTP client
#[derive(Debug, Error)]
pub enum DriveError {
    /// The access token is missing, invalid or expired (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The request was refused (403); `reason` is Drive's error reason code
    #[error("Forbidden ({reason}): {message}")]
    Forbidden { reason: String, message: String },

    /// The file or folder does not exist (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request was invalid for this item (400, 409, 413)
    #[error("Request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// Rate limit exceeded (429)
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests { retry_after: Option<Duration> },

    /// Server-side failure (5xx)
    #[error("Server error (HTTP {status}): {message}")]
    ServerError {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    /// The request never got a response
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The response could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Any other status code
    #[error("Unexpected response (HTTP {status}): {message}")]
    Unexpected { status: u16, message: String },
}

// ============================================================================
// Drive error payload
// ============================================================================

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    reason: Option<String>,
}

impl DriveError {
    /// Builds the error for a non-success response
    ///
    /// `body` is the raw response text; Drive's JSON error envelope is used
    /// for the message and the 403 reason when present.
    pub fn from_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> Self {
        let (message, reason) = match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => {
                let reason = envelope
                    .error
                    .errors
                    .into_iter()
                    .find_map(|detail| detail.reason);
                (envelope.error.message, reason)
            }
            Err(_) => (body.trim().to_string(), None),
        };
        let message = if message.is_empty() {
            status.canonical_reason().unwrap_or("no message").to_string()
        } else {
            message
        };

        match status.as_u16() {
            401 => Self::Unauthorized(message),
            403 => Self::Forbidden {
                reason: reason.unwrap_or_else(|| "forbidden".to_string()),
                message,
            },
            404 => Self::NotFound(message),
            400 | 409 | 413 => Self::Rejected {
                status: status.as_u16(),
                message,
            },
            429 => Self::TooManyRequests { retry_after },
            500..=599 => Self::ServerError {
                status: status.as_u16(),
                message,
                retry_after,
            },
            other => Self::Unexpected {
                status: other,
                message,
            },
        }
    }

    /// Whether the server asked the client to slow down
    pub fn is_throttle(&self) -> bool {
        match self {
            Self::TooManyRequests { .. } => true,
            Self::Forbidden { reason, .. } => RATE_LIMIT_REASONS.contains(&reason.as_str()),
            _ => false,
        }
    }
}

impl From<DriveError> for RemoteError {
    fn from(err: DriveError) -> Self {
        match err {
            DriveError::Unauthorized(message) => RemoteError::Auth(message),
            DriveError::Forbidden { reason, message } => {
                if reason == REASON_QUOTA {
                    RemoteError::QuotaExceeded(message)
                } else if RATE_LIMIT_REASONS.contains(&reason.as_str()) {
                    RemoteError::Transient {
                        message: format!("{reason}: {message}"),
                        retry_after: None,
                    }
                } else {
                    RemoteError::PermissionDenied(format!("{reason}: {message}"))
                }
            }
            DriveError::NotFound(message) => RemoteError::NotFound(message),
            DriveError::Rejected { status, message } => {
                RemoteError::Rejected(format!("HTTP {status}: {message}"))
            }
            DriveError::TooManyRequests { retry_after } => RemoteError::Transient {
                message: "too many requests".to_string(),
                retry_after,
            },
            DriveError::ServerError {
                status,
                message,
                retry_after,
            } => RemoteError::Transient {
                message: format!("HTTP {status}: {message}"),
                retry_after,
            },
            DriveError::NetworkError(e) if e.is_connect() || e.is_timeout() => {
                RemoteError::transient(e.to_string())
            }
            other => RemoteError::Fatal(other.to_string()),
        }
    }
}
