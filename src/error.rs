//! Error types shared by the token guard, the stores and the Gmail client.

use thiserror::Error;

/// Failure to establish authorization for an outbound call.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Terminal until the user re-authorizes.
    #[error("no refresh token available; re-authorization required")]
    NoRefreshToken,

    #[error("authorization code exchange failed: {detail}")]
    ExchangeFailed { detail: String },

    #[error("token refresh failed: {detail}")]
    RefreshFailed { detail: String },

    #[error("failed to persist token state: {0}")]
    Persist(#[from] StoreError),
}

impl AuthError {
    /// Stable machine-readable reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::NoRefreshToken => "no_refresh_token",
            AuthError::ExchangeFailed { .. } => "exchange_failed",
            AuthError::RefreshFailed { .. } => "refresh_failed",
            AuthError::Persist(_) => "persist_failed",
        }
    }

    /// Provider error detail, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            AuthError::ExchangeFailed { detail } | AuthError::RefreshFailed { detail } => {
                Some(detail)
            }
            _ => None,
        }
    }
}

/// Missing or malformed client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("client_id is not configured")]
    MissingClientId,

    #[error("client_secret is not configured")]
    MissingClientSecret,

    #[error("redirect_uri is not configured")]
    MissingRedirectUri,

    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("could not determine config directory")]
    NoConfigDir,

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Network-level failure talking to a remote endpoint.
#[derive(Debug, Error)]
#[error("transport error: {message}")]
pub struct TransportError {
    pub message: String,
    pub timed_out: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self {
            timed_out: e.is_timeout(),
            message: e.to_string(),
        }
    }
}

/// A persisted store could not be read or written.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// For stores outside this crate (keyring, database) to report a failed
    /// read or write.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result of [`TokenGuard::authorized_call`](crate::auth::TokenGuard::authorized_call).
///
/// `Auth` means the pre-call check failed and the request was never issued.
/// `Api` carries the builder's own error unchanged.
#[derive(Debug, Error)]
pub enum CallError<E> {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Api(E),
}

impl<E> CallError<E> {
    pub fn auth(&self) -> Option<&AuthError> {
        match self {
            CallError::Auth(e) => Some(e),
            CallError::Api(_) => None,
        }
    }
}

/// Errors returned by Gmail API requests.
#[derive(Debug, Error)]
pub enum GmailError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Non-2xx status; 401 is surfaced here without a retry.
    #[error("Gmail API returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode Gmail response: {0}")]
    Decode(String),

    #[error("field \"{0}\" is required")]
    InvalidInput(&'static str),
}

impl From<reqwest::Error> for GmailError {
    fn from(e: reqwest::Error) -> Self {
        GmailError::Transport(e.into())
    }
}
