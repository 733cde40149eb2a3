//! Mailbox profile endpoint (`users/me/profile`)

use super::client::{GmailClient, GmailResult};
use crate::auth::{PersistedStore, TokenHttp};
use crate::models::Profile;

impl<S: PersistedStore, H: TokenHttp> GmailClient<S, H> {
    pub async fn profile(&self) -> GmailResult<Profile> {
        self.get("/users/me/profile", &[]).await
    }

    /// Strong authorization check: a token is held and the server accepts it.
    ///
    /// Returns the profile on success, `None` otherwise.
    pub async fn check_auth(&self) -> Option<Profile> {
        if !self.guard().is_authorized() {
            return None;
        }
        match self.profile().await {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::debug!("Authorization check failed: {}", e);
                None
            }
        }
    }
}
