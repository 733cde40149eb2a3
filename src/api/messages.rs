//! Message operations: list, read, send and label changes

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Serialize;

use super::client::{GmailClient, GmailResult};
use crate::auth::{PersistedStore, TokenHttp};
use crate::error::{CallError, GmailError};
use crate::models::{Message, MessageList, ModifyLabels, LABEL_STARRED, LABEL_UNREAD};

/// Response detail requested from `messages.get`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageFormat {
    #[default]
    Full,
    Metadata,
    Minimal,
    Raw,
}

impl MessageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageFormat::Full => "full",
            MessageFormat::Metadata => "metadata",
            MessageFormat::Minimal => "minimal",
            MessageFormat::Raw => "raw",
        }
    }
}

/// A page of fully fetched messages.
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub next_page_token: Option<String>,
}

/// Plain-text or HTML email to send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub from: Option<String>,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub is_html: bool,
}

impl OutgoingEmail {
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    /// `to`, `subject` and `body` must be non-empty.
    pub fn validate(&self) -> Result<(), GmailError> {
        for (field, value) in [
            ("to", &self.to),
            ("subject", &self.subject),
            ("body", &self.body),
        ] {
            if value.trim().is_empty() {
                return Err(GmailError::InvalidInput(field));
            }
        }
        Ok(())
    }

    /// RFC 2822 message text: header block, blank line, body.
    pub fn to_rfc2822(&self) -> String {
        let mut headers = vec![
            format!("To: {}", header_value(&self.to)),
            format!("Subject: {}", header_value(&self.subject)),
        ];
        let optional = [("From", &self.from), ("Cc", &self.cc), ("Bcc", &self.bcc)];
        for (name, value) in optional {
            if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
                headers.push(format!("{}: {}", name, header_value(value)));
            }
        }
        let content_type = if self.is_html { "text/html" } else { "text/plain" };
        headers.push(format!("Content-Type: {}; charset=UTF-8", content_type));
        headers.push("MIME-Version: 1.0".to_string());

        format!("{}\r\n\r\n{}", headers.join("\r\n"), self.body)
    }

    /// Message encoded as the API's `raw` field (base64url, no padding).
    pub fn to_raw(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.to_rfc2822())
    }
}

/// Header values cannot carry line breaks.
fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

#[derive(Serialize)]
struct SendRequest<'a> {
    raw: &'a str,
}

/// Message ids are opaque URL-safe tokens; anything else could change the
/// request path.
fn require_id(id: &str) -> Result<(), CallError<GmailError>> {
    let valid = !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if !valid {
        return Err(CallError::Api(GmailError::InvalidInput("id")));
    }
    Ok(())
}

impl<S: PersistedStore, H: TokenHttp> GmailClient<S, H> {
    /// List message references matching `query` (Gmail search syntax).
    pub async fn list_messages(
        &self,
        query: &str,
        max_results: u32,
        page_token: Option<&str>,
    ) -> GmailResult<MessageList> {
        let mut params = vec![("maxResults", max_results.to_string())];
        if !query.is_empty() {
            params.push(("q", query.to_string()));
        }
        if let Some(token) = page_token.filter(|t| !t.is_empty()) {
            params.push(("pageToken", token.to_string()));
        }

        self.get("/users/me/messages", &params).await
    }

    pub async fn get_message(&self, id: &str, format: MessageFormat) -> GmailResult<Message> {
        require_id(id)?;
        let path = format!("/users/me/messages/{}", id);
        self.get(&path, &[("format", format.as_str().to_string())])
            .await
    }

    /// List matching messages and fetch each in full.
    ///
    /// Messages that fail to load are skipped with a warning; a failure of
    /// the list call itself is returned.
    pub async fn fetch_messages(
        &self,
        query: &str,
        max_results: u32,
        page_token: Option<&str>,
    ) -> GmailResult<MessagePage> {
        let list = self.list_messages(query, max_results, page_token).await?;

        let fetches = list
            .messages
            .iter()
            .map(|r| self.get_message(&r.id, MessageFormat::Full));
        let results = futures::future::join_all(fetches).await;

        let mut messages = Vec::with_capacity(results.len());
        for (reference, result) in list.messages.iter().zip(results) {
            match result {
                Ok(message) => messages.push(message),
                Err(CallError::Auth(e)) => return Err(CallError::Auth(e)),
                Err(e) => tracing::warn!("Skipping message {}: {}", reference.id, e),
            }
        }

        Ok(MessagePage {
            messages,
            next_page_token: list.next_page_token,
        })
    }

    /// Send an email. Returns the id of the sent message.
    pub async fn send_message(&self, email: &OutgoingEmail) -> GmailResult<String> {
        email.validate().map_err(CallError::Api)?;
        let raw = email.to_raw();

        let sent: Message = self
            .post("/users/me/messages/send", &SendRequest { raw: &raw })
            .await?;
        tracing::info!("Message sent ({})", sent.id);
        Ok(sent.id)
    }

    pub async fn modify_labels(
        &self,
        id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> GmailResult<Message> {
        require_id(id)?;
        let body = ModifyLabels {
            add_label_ids: add.iter().map(|l| l.to_string()).collect(),
            remove_label_ids: remove.iter().map(|l| l.to_string()).collect(),
        };
        let path = format!("/users/me/messages/{}/modify", id);
        self.post(&path, &body).await
    }

    pub async fn mark_read(&self, id: &str) -> GmailResult<Message> {
        self.modify_labels(id, &[], &[LABEL_UNREAD]).await
    }

    pub async fn mark_unread(&self, id: &str) -> GmailResult<Message> {
        self.modify_labels(id, &[LABEL_UNREAD], &[]).await
    }

    pub async fn star(&self, id: &str) -> GmailResult<Message> {
        self.modify_labels(id, &[LABEL_STARRED], &[]).await
    }

    pub async fn unstar(&self, id: &str) -> GmailResult<Message> {
        self.modify_labels(id, &[], &[LABEL_STARRED]).await
    }
}
