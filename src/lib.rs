//! Gmail token guard
//!
//! Keeps an OAuth2 access token valid around Gmail API calls: builds the
//! authorization URL, exchanges the returned code, persists the token pair
//! through a pluggable store and refreshes it lazily when a call finds it
//! expired.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;

pub use api::{GmailClient, MessageFormat, OutgoingEmail};
pub use auth::{
    Credentials, Endpoints, MemoryStore, PersistedStore, ReqwestTokenHttp, TokenGuard, TokenHttp,
    TokenState,
};
pub use config::{Config, FileStore, Settings};
pub use error::{AuthError, CallError, ConfigError, GmailError, StoreError, TransportError};
