//! Tower Service for bearer authentication
//!
//! Rejections are ordinary HTTP responses built with an empty `ResBody`, so the
//! inner service's error type passes through untouched.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
use tower_service::Service;
use tracing::{debug, warn};

use crate::validator::{TokenValidator, Verdict};

use super::{BearerAuthConfig, TokenInfo};

/// Tower Service that validates the bearer token before forwarding
///
/// On success the request carries [`TokenInfo`] and
/// [`DecodedClaims`](crate::DecodedClaims) extensions.
#[derive(Debug, Clone)]
pub struct BearerAuthService<S> {
    inner: S,
    validator: TokenValidator,
    config: Arc<BearerAuthConfig>,
}

impl<S> BearerAuthService<S> {
    /// Wrap `inner`
    pub fn new(inner: S, validator: TokenValidator, config: Arc<BearerAuthConfig>) -> Self {
        Self {
            inner,
            validator,
            config,
        }
    }

    /// Layer configuration
    pub fn config(&self) -> &BearerAuthConfig {
        &self.config
    }

    /// Get a reference to the inner service
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get a mutable reference to the inner service
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

/// Future returned by [`BearerAuthService`]
pub type BearerAuthServiceFuture<T, E> = BoxFuture<'static, Result<T, E>>;

/// What the `Authorization` header holds
#[derive(Debug, PartialEq, Eq)]
enum Credentials {
    Missing,
    OtherScheme,
    Bearer(String),
}

fn credentials(headers: &HeaderMap) -> Credentials {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Credentials::Missing;
    };
    let Ok(value) = value.to_str() else {
        return Credentials::OtherScheme;
    };

    let (scheme, token) = value.trim().split_once(' ').unwrap_or((value.trim(), ""));
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Credentials::OtherScheme;
    }

    match token.trim() {
        "" => Credentials::Missing,
        token => Credentials::Bearer(token.to_string()),
    }
}

fn reject<B: Default>(status: StatusCode, config: &BearerAuthConfig) -> Response<B> {
    let mut response = Response::new(B::default());
    *response.status_mut() = status;

    if status == StatusCode::UNAUTHORIZED {
        match HeaderValue::from_str(&config.challenge()) {
            Ok(challenge) => {
                response.headers_mut().insert(WWW_AUTHENTICATE, challenge);
            }
            Err(e) => warn!(realm = %config.realm, error = %e, "Realm is not a valid header value"),
        }
    }
    response
}

impl<S, B, ResBody> Service<Request<B>> for BearerAuthService<S>
where
    S: Service<Request<B>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send + 'static,
    B: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BearerAuthServiceFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let token = match credentials(req.headers()) {
            Credentials::Bearer(token) => token,
            Credentials::Missing => {
                debug!("Request without bearer credentials");
                let response = reject(StatusCode::UNAUTHORIZED, &self.config);
                return Box::pin(async move { Ok(response) });
            }
            Credentials::OtherScheme => {
                debug!("Request with a non-bearer authorization scheme");
                let response = reject(StatusCode::BAD_REQUEST, &self.config);
                return Box::pin(async move { Ok(response) });
            }
        };

        let validator = self.validator.clone();
        let config = Arc::clone(&self.config);
        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);

        Box::pin(async move {
            let scopes: Vec<&str> = config.required_scopes.iter().map(String::as_str).collect();
            let claims = match validator.authenticate(&token, &scopes).await {
                Verdict {
                    valid: true,
                    claims: Some(claims),
                } => claims,
                _ => return Ok(reject(StatusCode::UNAUTHORIZED, &config)),
            };

            if !config.permits(&claims) {
                warn!(subject = claims.sub().unwrap_or_default(), "Token rejected by auth policy");
                return Ok(reject(StatusCode::UNAUTHORIZED, &config));
            }

            req.extensions_mut().insert(TokenInfo::from(&claims));
            req.extensions_mut().insert(claims);
            inner.call(req).await
        })
    }
}
