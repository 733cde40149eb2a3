//! Configuration and credential storage

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::{Credentials, PersistedStore, TokenState, DEFAULT_EXPIRY_MARGIN_SECS};
use crate::error::{ConfigError, StoreError};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Tunables for token handling and outbound requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Seconds subtracted from the provider's token lifetime
    pub expiry_margin_secs: u64,
    /// Timeout for token endpoint and Gmail API requests
    pub request_timeout_secs: u64,
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            expiry_margin_secs: DEFAULT_EXPIRY_MARGIN_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Application configuration
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OAuth2 client credentials
    pub credentials: Credentials,
    /// Persisted token state
    pub token: TokenState,
    pub settings: Settings,
}

impl Config {
    /// Get config directory path
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        let proj_dirs = ProjectDirs::from("com", "gmail-guard", "gmail-guard")
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        // Set restrictive permissions on config file (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(path, perms)?;
        }

        Ok(())
    }

    /// Credentials with environment overrides applied, validated.
    ///
    /// `GMAIL_CLIENT_ID`, `GMAIL_CLIENT_SECRET` and `GMAIL_REDIRECT_URI` take
    /// precedence over the file.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let credentials = self.credentials_with(|key| std::env::var(key).ok());
        credentials.validate()?;
        Ok(credentials)
    }

    fn credentials_with(&self, env: impl Fn(&str) -> Option<String>) -> Credentials {
        let pick = |key: &str, fallback: &str| {
            env(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| fallback.to_string())
        };
        Credentials {
            client_id: pick("GMAIL_CLIENT_ID", &self.credentials.client_id),
            client_secret: pick("GMAIL_CLIENT_SECRET", &self.credentials.client_secret),
            redirect_uri: pick("GMAIL_REDIRECT_URI", &self.credentials.redirect_uri),
        }
    }
}

/// Token store backed by the config file.
///
/// Only the `[token]` table is rewritten; credentials and settings are
/// re-read on every save so edits made elsewhere are preserved.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default config location
    pub fn default_location() -> Result<Self, ConfigError> {
        Ok(Self::new(Config::config_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PersistedStore for FileStore {
    fn load(&self) -> Result<TokenState, StoreError> {
        Ok(Config::load_from(&self.path)?.token)
    }

    fn save(&self, state: &TokenState) -> Result<(), StoreError> {
        let mut config = Config::load_from(&self.path)?;
        config.token = state.clone();
        config.save_to(&self.path)?;
        tracing::debug!("Token state written to {}", self.path.display());
        Ok(())
    }
}
