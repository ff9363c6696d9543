//! HTTP collaborator for identity provider calls
//!
//! The credential cache decides *what* to request and *when*; an
//! [`IdpHttpClient`] decides *how*. [`ReqwestIdpClient`] is the production
//! implementation.
//!
//! ## Security Configuration
//!
//! The reqwest client is configured to:
//! - NOT follow redirects (SSRF protection per OAuth2 security guidance)
//! - Apply a bounded request timeout (default 10 seconds)
//! - Use rustls for TLS (no OpenSSL dependency)

use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;

use crate::error::TransportError;

/// Default request timeout for IdP calls
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Status and body of a completed IdP request
#[derive(Debug, Clone)]
pub struct HttpReply {
    /// Response status
    pub status: StatusCode,
    /// Raw response body
    pub body: Vec<u8>,
}

impl HttpReply {
    /// Build a reply
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Outbound HTTP used by the credential cache
///
/// Implementations must bound every request in time; a request that cannot
/// complete is reported as [`TransportError`], never by hanging.
#[async_trait]
pub trait IdpHttpClient: Send + Sync + std::fmt::Debug {
    /// GET `url`, optionally with `Authorization: Bearer {bearer}`
    async fn get(&self, url: &str, bearer: Option<&str>) -> Result<HttpReply, TransportError>;

    /// POST `form` as `application/x-www-form-urlencoded`
    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<HttpReply, TransportError>;
}

/// [`IdpHttpClient`] backed by reqwest
#[derive(Clone)]
pub struct ReqwestIdpClient {
    inner: reqwest::Client,
}

impl ReqwestIdpClient {
    /// Create a client with security-hardened defaults
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Request`] if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Request`] if the TLS backend cannot be initialised.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let inner = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request {
                url: String::new(),
                message: e.to_string(),
            })?;

        Ok(Self { inner })
    }

    /// Create from an existing reqwest client
    ///
    /// # Warning
    /// Ensure the client has a timeout and `redirect::Policy::none()`.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { inner: client }
    }

    async fn read(url: &str, response: reqwest::Response) -> Result<HttpReply, TransportError> {
        let status = response.status();
        let body = response.bytes().await.map_err(|e| TransportError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        Ok(HttpReply::new(status, body.to_vec()))
    }
}

impl std::fmt::Debug for ReqwestIdpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestIdpClient")
            .field("inner", &"<reqwest::Client>")
            .finish()
    }
}

#[async_trait]
impl IdpHttpClient for ReqwestIdpClient {
    async fn get(&self, url: &str, bearer: Option<&str>) -> Result<HttpReply, TransportError> {
        let mut request = self.inner.get(url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url, &e))?;

        Self::read(url, response).await
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<HttpReply, TransportError> {
        let response = self
            .inner
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url, &e))?;

        Self::read(url, response).await
    }
}
