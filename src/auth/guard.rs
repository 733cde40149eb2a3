//! Token guard: keeps the access token valid around outbound calls.
//!
//! Every call that needs Gmail authorization goes through
//! [`TokenGuard::authorized_call`], so the refresh policy lives in one place.
//! Refresh is lazy: it only happens when a call observes an expired token.

use std::future::Future;
use std::sync::RwLock;

use oauth2::basic::{BasicClient, BasicErrorResponse, BasicTokenResponse};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, RedirectUrl, RefreshToken,
    RequestTokenError, TokenResponse, TokenUrl,
};
use tokio::sync::Mutex;

use super::http::TokenHttp;
use super::tokens::{unix_now, PersistedStore, TokenState};
use super::{
    Credentials, Endpoints, DEFAULT_EXPIRES_IN_SECS, DEFAULT_EXPIRY_MARGIN_SECS, GMAIL_SCOPES,
};
use crate::error::{AuthError, CallError, ConfigError, StoreError, TransportError};

/// Token payload parsed from a successful token endpoint response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Absent when Google omits it on re-consent.
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    pub scopes: Vec<String>,
}

impl From<&BasicTokenResponse> for TokenGrant {
    fn from(response: &BasicTokenResponse) -> Self {
        Self {
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            expires_in: response
                .expires_in()
                .map(|d| d.as_secs())
                .unwrap_or(DEFAULT_EXPIRES_IN_SECS),
            scopes: response
                .scopes()
                .map(|scopes| scopes.iter().map(|s| s.as_str().to_string()).collect())
                .unwrap_or_default(),
        }
    }
}

/// Offline snapshot of the authorization state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStatus {
    pub authorized: bool,
    pub expired: bool,
    pub has_refresh_token: bool,
    pub expires_at: u64,
}

/// Owns client credentials and the current token pair.
///
/// Reads the persisted state once on construction and writes it back after
/// every mutation. Refresh is single-flight: concurrent callers that observe
/// an expired token wait for the first refresh and reuse its result.
pub struct TokenGuard<S, H> {
    credentials: RwLock<Credentials>,
    endpoints: Endpoints,
    expiry_margin: u64,
    state: RwLock<TokenState>,
    /// Serializes every operation that mutates `state`.
    refresh_gate: Mutex<()>,
    store: S,
    http: H,
}

impl<S: PersistedStore, H: TokenHttp> TokenGuard<S, H> {
    pub fn new(credentials: Credentials, store: S, http: H) -> Result<Self, StoreError> {
        let state = store.load()?;
        tracing::debug!(
            "Loaded token state (authorized: {}, expires_at: {})",
            !state.access_token.is_empty(),
            state.expires_at
        );

        Ok(Self {
            credentials: RwLock::new(credentials),
            endpoints: Endpoints::google(),
            expiry_margin: DEFAULT_EXPIRY_MARGIN_SECS,
            state: RwLock::new(state),
            refresh_gate: Mutex::new(()),
            store,
            http,
        })
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_expiry_margin(mut self, secs: u64) -> Self {
        self.expiry_margin = secs;
        self
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the client credentials. Token state is left untouched.
    pub fn update_credentials(&self, credentials: Credentials) {
        *self.credentials.write().unwrap_or_else(|e| e.into_inner()) = credentials;
        tracing::info!("Client credentials updated");
    }

    /// Copy of the in-memory token state.
    pub fn token_state(&self) -> TokenState {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Authorization URL the user visits to grant access.
    pub fn authorize_url(&self) -> String {
        let credentials = self.credentials();
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &credentials.client_id)
            .append_pair("redirect_uri", &credentials.redirect_uri)
            .append_pair("scope", &GMAIL_SCOPES.join(" "))
            .append_pair("response_type", "code")
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .finish();

        format!("{}?{}", self.endpoints.auth_url, query)
    }

    /// Exchange an authorization code for a token pair and persist it.
    ///
    /// Prior state is kept if the exchange fails.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError> {
        if code.trim().is_empty() {
            return Err(AuthError::ExchangeFailed {
                detail: "authorization code is empty".to_string(),
            });
        }

        let client = self
            .oauth_client(true)
            .map_err(|e| AuthError::ExchangeFailed {
                detail: e.to_string(),
            })?;

        let _gate = self.refresh_gate.lock().await;
        tracing::info!("Exchanging authorization code for tokens...");

        let response = client
            .exchange_code(AuthorizationCode::new(code.trim().to_string()))
            .request_async(|request| self.http.execute(request))
            .await
            .map_err(|e| {
                let detail = describe_token_error(e);
                tracing::warn!("Authorization code exchange failed: {}", detail);
                AuthError::ExchangeFailed { detail }
            })?;

        let grant = TokenGrant::from(&response);
        if grant.access_token.is_empty() {
            return Err(AuthError::ExchangeFailed {
                detail: "token endpoint returned an empty access_token".to_string(),
            });
        }

        let refresh_token = grant
            .refresh_token
            .clone()
            .unwrap_or_else(|| self.token_state().refresh_token);
        if refresh_token.is_empty() {
            tracing::warn!("No refresh token issued; re-authorization will be needed on expiry");
        }

        let next = TokenState::issued(
            grant.access_token.clone(),
            refresh_token,
            unix_now(),
            grant.expires_in,
            self.expiry_margin,
        );
        self.commit(next)?;
        tracing::info!("Authorization complete");
        Ok(grant)
    }

    /// Obtain a new access token with the held refresh token.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let _gate = self.refresh_gate.lock().await;
        self.refresh_locked().await
    }

    /// Caller must hold `refresh_gate`.
    async fn refresh_locked(&self) -> Result<(), AuthError> {
        let current = self.token_state();
        if !current.has_refresh_token() {
            tracing::warn!("Cannot refresh: no refresh token stored");
            return Err(AuthError::NoRefreshToken);
        }

        let client = self.oauth_client(false).map_err(|e| AuthError::RefreshFailed {
            detail: e.to_string(),
        })?;

        tracing::info!("Refreshing access token...");

        let response = client
            .exchange_refresh_token(&RefreshToken::new(current.refresh_token.clone()))
            .request_async(|request| self.http.execute(request))
            .await
            .map_err(|e| {
                let detail = describe_token_error(e);
                tracing::warn!("Token refresh failed: {}", detail);
                AuthError::RefreshFailed { detail }
            })?;

        let grant = TokenGrant::from(&response);
        if grant.access_token.is_empty() {
            return Err(AuthError::RefreshFailed {
                detail: "token endpoint returned an empty access_token".to_string(),
            });
        }

        // Google does not reissue the refresh token; adopt one if it does.
        let refresh_token = grant.refresh_token.unwrap_or(current.refresh_token);
        let next = TokenState::issued(
            grant.access_token,
            refresh_token,
            unix_now(),
            grant.expires_in,
            self.expiry_margin,
        );
        self.commit(next)?;
        tracing::info!("Access token refreshed");
        Ok(())
    }

    /// Run one outbound request with a currently valid access token.
    ///
    /// Refreshes first if the token is expired (or was never issued). The
    /// request's own result is returned unchanged; a 401 from the API is not
    /// retried.
    pub async fn authorized_call<F, Fut, T, E>(&self, request: F) -> Result<T, CallError<E>>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let access_token = self.valid_access_token().await?;
        request(access_token).await.map_err(CallError::Api)
    }

    async fn valid_access_token(&self) -> Result<String, AuthError> {
        let state = self.token_state();
        if !state.is_expired_at(unix_now()) {
            return Ok(state.access_token);
        }

        let _gate = self.refresh_gate.lock().await;
        // Another caller may have refreshed while we waited.
        let state = self.token_state();
        if !state.is_expired_at(unix_now()) {
            tracing::debug!("Token refreshed by a concurrent caller");
            return Ok(state.access_token);
        }

        tracing::info!("Access token expired, refreshing before call");
        self.refresh_locked().await?;
        Ok(self.token_state().access_token)
    }

    /// Weak offline check: an access token is held. Does not ask the server.
    pub fn is_authorized(&self) -> bool {
        !self
            .state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .access_token
            .is_empty()
    }

    pub fn status(&self) -> AuthStatus {
        let state = self.token_state();
        AuthStatus {
            authorized: !state.access_token.is_empty(),
            expired: state.is_expired(),
            has_refresh_token: state.has_refresh_token(),
            expires_at: state.expires_at,
        }
    }

    /// Clear the token pair and persist the cleared state. Idempotent.
    pub async fn reset(&self) -> Result<(), StoreError> {
        let _gate = self.refresh_gate.lock().await;
        let cleared = TokenState::default();
        self.store.save(&cleared)?;
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = cleared;
        tracing::info!("Authorization reset");
        Ok(())
    }

    /// Persist `next`, then adopt it. On a store failure the in-memory
    /// state is left as it was.
    fn commit(&self, next: TokenState) -> Result<(), AuthError> {
        self.store.save(&next).map_err(|e| {
            tracing::warn!("Failed to persist token state: {}", e);
            AuthError::Persist(e)
        })?;
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = next;
        Ok(())
    }

    /// Token endpoint client. The redirect URI is only sent with a code
    /// exchange, so refresh does not depend on it.
    fn oauth_client(&self, with_redirect: bool) -> Result<BasicClient, ConfigError> {
        let credentials = self.credentials();
        let auth_url = AuthUrl::new(self.endpoints.auth_url.clone())
            .map_err(|e| invalid_url(&self.endpoints.auth_url, e))?;
        let token_url = TokenUrl::new(self.endpoints.token_url.clone())
            .map_err(|e| invalid_url(&self.endpoints.token_url, e))?;

        let client = BasicClient::new(
            ClientId::new(credentials.client_id),
            Some(ClientSecret::new(credentials.client_secret)),
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::RequestBody);

        if !with_redirect {
            return Ok(client);
        }
        let redirect_url = RedirectUrl::new(credentials.redirect_uri.clone())
            .map_err(|e| invalid_url(&credentials.redirect_uri, e))?;
        Ok(client.set_redirect_uri(redirect_url))
    }
}

fn invalid_url(url: &str, e: url::ParseError) -> ConfigError {
    ConfigError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

/// Flatten a token endpoint failure into a diagnostic string that keeps the
/// provider's error body.
fn describe_token_error(err: RequestTokenError<TransportError, BasicErrorResponse>) -> String {
    match err {
        RequestTokenError::ServerResponse(response) => {
            serde_json::to_string(&response).unwrap_or_else(|_| response.to_string())
        }
        RequestTokenError::Request(e) => e.to_string(),
        RequestTokenError::Parse(e, body) => {
            format!("{} (body: {})", e, String::from_utf8_lossy(&body))
        }
        RequestTokenError::Other(message) => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::http::fake::FakeTokenHttp;
    use crate::auth::tokens::MemoryStore;
    use std::cell::RefCell;
    use std::sync::Arc;

    const TOKEN_A2: &str = r#"{"access_token":"A2","token_type":"Bearer","expires_in":3600}"#;

    fn creds() -> Credentials {
        Credentials::new("client-1", "secret-1", "http://localhost:8080/callback")
    }

    fn guard_with(
        state: TokenState,
        http: FakeTokenHttp,
    ) -> (TokenGuard<Arc<MemoryStore>, FakeTokenHttp>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_state(state));
        let guard = TokenGuard::new(creds(), store.clone(), http).unwrap();
        (guard, store)
    }

    /// Store that loads `state` but refuses every write.
    struct ReadOnlyStore {
        state: TokenState,
    }

    impl PersistedStore for ReadOnlyStore {
        fn load(&self) -> Result<TokenState, StoreError> {
            Ok(self.state.clone())
        }

        fn save(&self, _state: &TokenState) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".to_string()))
        }
    }

    fn read_only_guard(
        state: TokenState,
        http: FakeTokenHttp,
    ) -> TokenGuard<ReadOnlyStore, FakeTokenHttp> {
        TokenGuard::new(creds(), ReadOnlyStore { state }, http).unwrap()
    }

    fn expired(access: &str, refresh: &str) -> TokenState {
        TokenState {
            access_token: access.into(),
            refresh_token: refresh.into(),
            expires_at: unix_now() - 1,
        }
    }

    fn fresh(access: &str, refresh: &str) -> TokenState {
        TokenState {
            access_token: access.into(),
            refresh_token: refresh.into(),
            expires_at: unix_now() + 3000,
        }
    }

    #[test]
    fn test_authorize_url_params() {
        let (guard, _) = guard_with(TokenState::default(), FakeTokenHttp::new());
        let url = url::Url::parse(&guard.authorize_url()).unwrap();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(url.path(), "/o/oauth2/v2/auth");
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "client-1");
        assert_eq!(params["redirect_uri"], "http://localhost:8080/callback");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
        for scope in GMAIL_SCOPES {
            assert!(params["scope"].split(' ').any(|s| s == scope));
        }
    }

    #[tokio::test]
    async fn test_exchange_code_authorizes() {
        let http = FakeTokenHttp::new().respond(
            200,
            r#"{"access_token":"A1","token_type":"Bearer","expires_in":3600,"refresh_token":"R1"}"#,
        );
        let (guard, store) = guard_with(TokenState::default(), http);
        assert!(!guard.is_authorized());

        let before = unix_now();
        let grant = guard.exchange_code("valid-code").await.unwrap();
        assert_eq!(grant.access_token, "A1");
        assert_eq!(grant.refresh_token.as_deref(), Some("R1"));
        assert!(guard.is_authorized());

        let saved = store.current();
        assert_eq!(saved.access_token, "A1");
        assert_eq!(saved.refresh_token, "R1");
        let expected = before + 3600 - DEFAULT_EXPIRY_MARGIN_SECS;
        assert!(saved.expires_at >= expected && saved.expires_at <= expected + 5);

        let body = &guard.http.bodies()[0];
        assert!(body.contains("grant_type=authorization_code"));
        assert!(body.contains("code=valid-code"));
        assert!(body.contains("client_secret=secret-1"));
    }

    #[tokio::test]
    async fn test_exchange_code_without_refresh_token() {
        let http = FakeTokenHttp::new().respond(
            200,
            r#"{"access_token":"A1","token_type":"Bearer","expires_in":3600}"#,
        );
        let (guard, store) = guard_with(TokenState::default(), http);

        let grant = guard.exchange_code("valid-code").await.unwrap();
        assert!(grant.refresh_token.is_none());
        assert_eq!(store.current().access_token, "A1");
        assert_eq!(store.current().refresh_token, "");
    }

    #[tokio::test]
    async fn test_exchange_code_failure_keeps_prior_state() {
        let prior = fresh("A0", "R0");
        let http = FakeTokenHttp::new().respond(
            400,
            r#"{"error":"invalid_grant","error_description":"Malformed auth code."}"#,
        );
        let (guard, store) = guard_with(prior.clone(), http);

        let err = guard.exchange_code("bad-code").await.unwrap_err();
        assert_eq!(err.reason(), "exchange_failed");
        assert!(err.detail().unwrap().contains("invalid_grant"));
        assert!(store.saves().is_empty());
        assert_eq!(guard.token_state(), prior);
    }

    #[tokio::test]
    async fn test_exchange_empty_code_makes_no_request() {
        let (guard, _) = guard_with(TokenState::default(), FakeTokenHttp::new());
        let err = guard.exchange_code("  ").await.unwrap_err();
        assert_eq!(err.reason(), "exchange_failed");
        assert_eq!(guard.http.calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let (guard, store) = guard_with(expired("A1", ""), FakeTokenHttp::new());
        let err = guard.refresh().await.unwrap_err();
        assert!(matches!(err, AuthError::NoRefreshToken));
        assert_eq!(guard.http.calls(), 0);
        assert!(store.saves().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token() {
        let prior = expired("A1", "R1");
        let http = FakeTokenHttp::new().respond(200, TOKEN_A2);
        let (guard, store) = guard_with(prior.clone(), http);

        guard.refresh().await.unwrap();

        let saved = store.current();
        assert_eq!(saved.access_token, "A2");
        assert_eq!(saved.refresh_token, "R1");
        assert!(saved.expires_at > prior.expires_at);
        assert!(guard.http.bodies()[0].contains("grant_type=refresh_token"));
        assert!(guard.http.bodies()[0].contains("refresh_token=R1"));
    }

    #[tokio::test]
    async fn test_refresh_adopts_rotated_refresh_token() {
        let http = FakeTokenHttp::new().respond(
            200,
            r#"{"access_token":"A2","token_type":"Bearer","expires_in":3600,"refresh_token":"R2"}"#,
        );
        let (guard, store) = guard_with(expired("A1", "R1"), http);

        guard.refresh().await.unwrap();
        assert_eq!(store.current().refresh_token, "R2");
    }

    #[tokio::test]
    async fn test_refresh_invalid_grant() {
        let prior = expired("A1", "R1");
        let http = FakeTokenHttp::new().respond(400, r#"{"error":"invalid_grant"}"#);
        let (guard, store) = guard_with(prior.clone(), http);

        let err = guard.refresh().await.unwrap_err();
        assert_eq!(err.reason(), "refresh_failed");
        assert!(err.detail().unwrap().contains("invalid_grant"));
        assert!(store.saves().is_empty());
        assert_eq!(store.current(), prior);
        assert_eq!(guard.token_state(), prior);
    }

    #[tokio::test]
    async fn test_refresh_network_failure() {
        let http = FakeTokenHttp::new().fail("connection reset");
        let (guard, store) = guard_with(expired("A1", "R1"), http);

        let err = guard.refresh().await.unwrap_err();
        assert_eq!(err.reason(), "refresh_failed");
        assert!(err.detail().unwrap().contains("connection reset"));
        assert!(store.saves().is_empty());
    }

    #[tokio::test]
    async fn test_authorized_call_refreshes_expired_token() {
        let http = FakeTokenHttp::new().respond(200, TOKEN_A2);
        let (guard, store) = guard_with(expired("A1", "R1"), http);
        let seen = RefCell::new(Vec::new());

        let result = guard
            .authorized_call(|token| {
                seen.borrow_mut().push(token.clone());
                async move { Ok::<_, TransportError>(token.len()) }
            })
            .await
            .unwrap();

        assert_eq!(result, 2);
        assert_eq!(*seen.borrow(), vec!["A2".to_string()]);
        assert_eq!(store.current().access_token, "A2");
        assert_eq!(guard.http.calls(), 1);
    }

    #[tokio::test]
    async fn test_authorized_call_never_authorized() {
        let http = FakeTokenHttp::new().respond(200, TOKEN_A2);
        let state = TokenState {
            access_token: String::new(),
            refresh_token: "R1".into(),
            expires_at: 0,
        };
        let (guard, _) = guard_with(state, http);

        let token = guard
            .authorized_call(|token| async move { Ok::<_, TransportError>(token) })
            .await
            .unwrap();
        assert_eq!(token, "A2");
        assert_eq!(guard.http.calls(), 1);
    }

    #[tokio::test]
    async fn test_authorized_call_valid_token_skips_refresh() {
        let (guard, store) = guard_with(fresh("A1", "R1"), FakeTokenHttp::new());

        let token = guard
            .authorized_call(|token| async move { Ok::<_, TransportError>(token) })
            .await
            .unwrap();
        assert_eq!(token, "A1");
        assert_eq!(guard.http.calls(), 0);
        assert!(store.saves().is_empty());
    }

    #[tokio::test]
    async fn test_authorized_call_no_refresh_token_skips_builder() {
        let (guard, _) = guard_with(expired("A1", ""), FakeTokenHttp::new());
        let mut invoked = false;

        let err = guard
            .authorized_call(|token| {
                invoked = true;
                async move { Ok::<_, TransportError>(token) }
            })
            .await
            .unwrap_err();

        assert!(!invoked);
        assert!(matches!(err, CallError::Auth(AuthError::NoRefreshToken)));
    }

    #[tokio::test]
    async fn test_authorized_call_passes_api_error_through() {
        let (guard, _) = guard_with(fresh("A1", "R1"), FakeTokenHttp::new());

        let err = guard
            .authorized_call(|_token| async {
                Err::<(), _>(TransportError::new("HTTP 401 from API"))
            })
            .await
            .unwrap_err();

        match err {
            CallError::Api(e) => assert_eq!(e.message, "HTTP 401 from API"),
            other => panic!("unexpected error: {other:?}"),
        }
        // No retry after a mid-call failure.
        assert_eq!(guard.http.calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_calls_refresh_once() {
        let http = FakeTokenHttp::new().respond(200, TOKEN_A2);
        let (guard, store) = guard_with(expired("A1", "R1"), http);

        let calls = (0..5).map(|_| {
            guard.authorized_call(|token| async move { Ok::<_, TransportError>(token) })
        });
        let tokens = futures::future::join_all(calls).await;

        for token in tokens {
            assert_eq!(token.unwrap(), "A2");
        }
        assert_eq!(guard.http.calls(), 1);
        assert_eq!(store.saves().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let (guard, store) = guard_with(fresh("A1", "R1"), FakeTokenHttp::new());

        guard.reset().await.unwrap();
        guard.reset().await.unwrap();

        assert!(!guard.is_authorized());
        let saves = store.saves();
        assert_eq!(saves.len(), 2);
        assert_eq!(saves[0], saves[1]);
        assert_eq!(saves[0], TokenState::default());
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let (guard, _) = guard_with(expired("A1", "R1"), FakeTokenHttp::new());
        let status = guard.status();
        assert!(status.authorized);
        assert!(status.expired);
        assert!(status.has_refresh_token);
    }

    #[tokio::test]
    async fn test_update_credentials_keeps_tokens() {
        let (guard, _) = guard_with(fresh("A1", "R1"), FakeTokenHttp::new());
        guard.update_credentials(Credentials::new("client-2", "secret-2", "http://localhost/cb"));

        assert_eq!(guard.credentials().client_id, "client-2");
        assert!(guard.authorize_url().contains("client_id=client-2"));
        assert_eq!(guard.token_state().access_token, "A1");
    }

    #[tokio::test]
    async fn test_custom_margin_and_endpoints() {
        let http = FakeTokenHttp::new().respond(200, TOKEN_A2);
        let (guard, store) = guard_with(expired("A1", "R1"), http);
        let guard = guard
            .with_expiry_margin(600)
            .with_endpoints(Endpoints {
                auth_url: "https://auth.example.com/authorize".into(),
                token_url: "https://auth.example.com/token".into(),
            });

        let before = unix_now();
        guard.refresh().await.unwrap();
        let expires_at = store.current().expires_at;
        assert!(expires_at >= before + 3000 && expires_at <= before + 3005);
        assert!(guard
            .authorize_url()
            .starts_with("https://auth.example.com/authorize?"));
    }

    #[tokio::test]
    async fn test_exchange_persist_failure_keeps_prior_state() {
        let http = FakeTokenHttp::new().respond(
            200,
            r#"{"access_token":"A1","token_type":"Bearer","expires_in":3600,"refresh_token":"R1"}"#,
        );
        let guard = read_only_guard(TokenState::default(), http);

        let err = guard.exchange_code("valid-code").await.unwrap_err();
        assert!(matches!(err, AuthError::Persist(StoreError::Unavailable(_))));
        assert_eq!(err.reason(), "persist_failed");
        assert!(!guard.is_authorized());
        assert_eq!(guard.token_state(), TokenState::default());
    }

    #[tokio::test]
    async fn test_refresh_persist_failure_keeps_prior_state() {
        let prior = expired("A1", "R1");
        let http = FakeTokenHttp::new().respond(200, TOKEN_A2);
        let guard = read_only_guard(prior.clone(), http);

        let err = guard.refresh().await.unwrap_err();
        assert_eq!(err.reason(), "persist_failed");
        assert_eq!(guard.token_state(), prior);
    }

    #[tokio::test]
    async fn test_authorized_call_persist_failure_skips_builder() {
        let http = FakeTokenHttp::new().respond(200, TOKEN_A2);
        let guard = read_only_guard(expired("A1", "R1"), http);
        let mut invoked = false;

        let err = guard
            .authorized_call(|token| {
                invoked = true;
                async move { Ok::<_, TransportError>(token) }
            })
            .await
            .unwrap_err();

        assert!(!invoked);
        assert!(matches!(err, CallError::Auth(AuthError::Persist(_))));
        assert_eq!(guard.token_state().access_token, "A1");
    }

    #[tokio::test]
    async fn test_reset_persist_failure_keeps_state() {
        let prior = fresh("A1", "R1");
        let guard = read_only_guard(prior.clone(), FakeTokenHttp::new());

        let err = guard.reset().await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(guard.is_authorized());
        assert_eq!(guard.token_state(), prior);
    }

    #[tokio::test]
    async fn test_refresh_huge_expires_in() {
        let http = FakeTokenHttp::new().respond(
            200,
            r#"{"access_token":"A2","token_type":"Bearer","expires_in":18446744073709551615}"#,
        );
        let (guard, store) = guard_with(expired("A1", "R1"), http);

        guard.refresh().await.unwrap();
        let saved = store.current();
        assert_eq!(saved.access_token, "A2");
        assert_eq!(saved.expires_at, i64::MAX as u64);
        assert!(!saved.is_expired());
    }

    #[tokio::test]
    async fn test_refresh_ignores_redirect_uri() {
        let http = FakeTokenHttp::new().respond(200, TOKEN_A2);
        let (guard, store) = guard_with(expired("A1", "R1"), http);
        guard.update_credentials(Credentials::new("client-1", "secret-1", ""));

        guard.refresh().await.unwrap();
        assert_eq!(store.current().access_token, "A2");
        assert!(!guard.http.bodies()[0].contains("redirect_uri"));
    }

    #[tokio::test]
    async fn test_exchange_requires_valid_redirect_uri() {
        let (guard, _) = guard_with(TokenState::default(), FakeTokenHttp::new());
        guard.update_credentials(Credentials::new("client-1", "secret-1", "not a url"));

        let err = guard.exchange_code("valid-code").await.unwrap_err();
        assert_eq!(err.reason(), "exchange_failed");
        assert_eq!(guard.http.calls(), 0);
    }
}
