//! Label listing

use super::client::{GmailClient, GmailResult};
use crate::auth::{PersistedStore, TokenHttp};
use crate::models::{Label, LabelList};

impl<S: PersistedStore, H: TokenHttp> GmailClient<S, H> {
    pub async fn list_labels(&self) -> GmailResult<Vec<Label>> {
        let list: LabelList = self.get("/users/me/labels", &[]).await?;
        Ok(list.labels)
    }
}
