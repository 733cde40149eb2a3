//! Authenticated HTTP client for the Gmail API
//!
//! Every request is issued through the token guard, which hands it a valid
//! bearer token and refreshes an expired one first.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::{PersistedStore, TokenGuard, TokenHttp};
use crate::error::{CallError, GmailError, TransportError};

const GMAIL_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

pub type GmailResult<T> = Result<T, CallError<GmailError>>;

/// Gmail API client layered over a [`TokenGuard`].
pub struct GmailClient<S, H> {
    http: reqwest::Client,
    guard: TokenGuard<S, H>,
    base_url: String,
}

impl<S: PersistedStore, H: TokenHttp> GmailClient<S, H> {
    pub fn new(guard: TokenGuard<S, H>, timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            guard,
            base_url: GMAIL_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn guard(&self) -> &TokenGuard<S, H> {
        &self.guard
    }

    /// GET `path` under the API base and decode the JSON body.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> GmailResult<T> {
        let url = format!("{}{}", self.base_url, path);
        self.guard
            .authorized_call(|token| {
                tracing::debug!("Gmail GET {}", url);
                execute(self.http.get(&url).query(query).bearer_auth(token), &url)
            })
            .await
    }

    /// POST a JSON body to `path` under the API base and decode the reply.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> GmailResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        self.guard
            .authorized_call(|token| {
                tracing::debug!("Gmail POST {}", url);
                execute(self.http.post(&url).bearer_auth(token).json(body), &url)
            })
            .await
    }
}

async fn execute<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    url: &str,
) -> Result<T, GmailError> {
    let resp = request.send().await?;
    decode(check_response(resp, url).await?).await
}

/// Check HTTP response status code and return a clear error on failure.
///
/// A 401 is reported as-is; the token is not refreshed and the request is
/// not retried.
async fn check_response(
    resp: reqwest::Response,
    url: &str,
) -> Result<reqwest::Response, GmailError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        tracing::warn!("401 Unauthorized for {}. Token may have been revoked.", url);
    }
    Err(GmailError::Status {
        status: status.as_u16(),
        message: api_error_message(&body),
    })
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, GmailError> {
    let body = resp.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| GmailError::Decode(e.to_string()))
}

/// `error.message` from a Google API error body, else the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                "API request failed".to_string()
            } else {
                body.to_string()
            }
        })
}
