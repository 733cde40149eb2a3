//! HTTP collaborator used for token endpoint requests.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use oauth2::{HttpRequest, HttpResponse};

use crate::error::TransportError;

/// Executes one token endpoint request.
///
/// The guard never talks to the network directly; it hands the form-encoded
/// request built by `oauth2` to this collaborator.
pub trait TokenHttp: Send + Sync {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

impl<T: TokenHttp> TokenHttp for Arc<T> {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        (**self).execute(request)
    }
}

/// `reqwest`-backed collaborator with a bounded request timeout.
#[derive(Debug, Clone)]
pub struct ReqwestTokenHttp {
    client: reqwest::Client,
}

impl ReqwestTokenHttp {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            // Token endpoints must not be followed across redirects.
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }
}

impl TokenHttp for ReqwestTokenHttp {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        tracing::debug!("Token endpoint {} {}", request.method, request.url);

        let response = self
            .client
            .request(request.method, request.url.as_str())
            .headers(request.headers)
            .body(request.body)
            .send()
            .await?;

        let status_code = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status_code,
            headers,
            body,
        })
    }
}
