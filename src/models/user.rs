//! User-related models

use serde::{Deserialize, Serialize};

/// Mailbox profile (`users/me/profile`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub email_address: String,
    #[serde(default)]
    pub messages_total: u64,
    #[serde(default)]
    pub threads_total: u64,
    pub history_id: Option<String>,
}
