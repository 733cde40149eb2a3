//! Token storage and management

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::StoreError;

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Current access/refresh token pair.
///
/// `expires_at` is the instant (Unix seconds) at or after which
/// `access_token` must be treated as invalid. Zero means never authorized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenState {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: u64,
}

impl TokenState {
    /// Build a state for a token issued `now` with lifetime `expires_in`,
    /// minus the safety margin.
    ///
    /// `expires_at` is capped at `i64::MAX` so it stays representable in
    /// the TOML config file.
    pub fn issued(
        access_token: String,
        refresh_token: String,
        now: u64,
        expires_in: u64,
        margin: u64,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: now
                .saturating_add(expires_in.saturating_sub(margin))
                .min(i64::MAX as u64),
        }
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now())
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }
}

/// Key-value collaborator holding the persisted token state.
///
/// Read once when a guard is built and written after every mutation.
pub trait PersistedStore: Send + Sync {
    fn load(&self) -> Result<TokenState, StoreError>;
    fn save(&self, state: &TokenState) -> Result<(), StoreError>;
}

impl<S: PersistedStore + ?Sized> PersistedStore for Arc<S> {
    fn load(&self) -> Result<TokenState, StoreError> {
        (**self).load()
    }

    fn save(&self, state: &TokenState) -> Result<(), StoreError> {
        (**self).save(state)
    }
}

/// In-memory store. Keeps every saved state so callers can inspect the
/// write history.
#[derive(Debug, Default)]
pub struct MemoryStore {
    current: Mutex<TokenState>,
    saves: Mutex<Vec<TokenState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: TokenState) -> Self {
        Self {
            current: Mutex::new(state),
            saves: Mutex::new(Vec::new()),
        }
    }

    /// Last persisted state.
    pub fn current(&self) -> TokenState {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Every state passed to `save`, oldest first.
    pub fn saves(&self) -> Vec<TokenState> {
        self.saves.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl PersistedStore for MemoryStore {
    fn load(&self) -> Result<TokenState, StoreError> {
        Ok(self.current())
    }

    fn save(&self, state: &TokenState) -> Result<(), StoreError> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = state.clone();
        self.saves
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(state.clone());
        Ok(())
    }
}
