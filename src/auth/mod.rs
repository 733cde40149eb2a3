//! Authentication module for Gmail
//!
//! Implements the OAuth2 authorization code flow against Google's endpoints
//! and keeps the resulting token pair valid for outbound API calls.

pub mod guard;
pub mod http;
pub mod tokens;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub use guard::{AuthStatus, TokenGrant, TokenGuard};
pub use http::{ReqwestTokenHttp, TokenHttp};
pub use tokens::{unix_now, MemoryStore, PersistedStore, TokenState};

/// Scopes requested on authorization: read, send and modify.
pub const GMAIL_SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.modify",
];

/// Default safety margin subtracted from the provider's token lifetime.
pub const DEFAULT_EXPIRY_MARGIN_SECS: u64 = 30;

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// OAuth2 client credentials. Fixed for the life of a guard unless
/// explicitly replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl Credentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
        }
    }

    /// Check that every field is present. Callers run this before building a
    /// guard.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::MissingClientId);
        }
        if self.client_secret.trim().is_empty() {
            return Err(ConfigError::MissingClientSecret);
        }
        if self.redirect_uri.trim().is_empty() {
            return Err(ConfigError::MissingRedirectUri);
        }
        Ok(())
    }
}

/// Authorization and token endpoint URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Browser redirect target; never called by the guard itself.
    pub auth_url: String,
    /// Form-encoded POST target for code exchange and refresh.
    pub token_url: String,
}

impl Endpoints {
    /// Google's OAuth2 endpoints
    pub fn google() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::google()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_reports_first_missing_field() {
        let creds = Credentials::new("", "secret", "http://localhost/cb");
        assert!(matches!(creds.validate(), Err(ConfigError::MissingClientId)));

        let creds = Credentials::new("id", " ", "http://localhost/cb");
        assert!(matches!(
            creds.validate(),
            Err(ConfigError::MissingClientSecret)
        ));

        let creds = Credentials::new("id", "secret", "");
        assert!(matches!(
            creds.validate(),
            Err(ConfigError::MissingRedirectUri)
        ));

        let creds = Credentials::new("id", "secret", "http://localhost/cb");
        assert!(creds.validate().is_ok());
    }
}
