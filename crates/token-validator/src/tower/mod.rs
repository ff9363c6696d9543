//! # Tower Middleware for Bearer Authentication
//!
//! [`BearerAuthLayer`] wraps an HTTP service with [`BearerAuthService`], which
//! pulls the bearer token out of `Authorization`, validates it with a
//! [`TokenValidator`](crate::TokenValidator) and only then forwards the request.
//!
//! | Request | Response |
//! |---------|----------|
//! | no `Authorization` header | `401` with `WWW-Authenticate: Bearer realm="..."` |
//! | scheme other than `Bearer` | `400` |
//! | invalid token, or rejected by the policy | `401` |
//! | valid token | forwarded |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tower::ServiceBuilder;
//! use token_validator::tower::BearerAuthLayer;
//!
//! let service = ServiceBuilder::new()
//!     .layer(BearerAuthLayer::new(validator).require_scope("billing:read"))
//!     .service(my_inner_service);
//! ```
//!
//! ## Request Extensions
//!
//! Forwarded requests carry the token's [`TokenInfo`] and its full
//! [`DecodedClaims`]:
//!
//! ```rust,ignore
//! if let Some(info) = req.extensions().get::<TokenInfo>() {
//!     println!("partner: {:?}", info.get("partner_guid"));
//! }
//! ```

mod layer;
mod service;

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::claims::DecodedClaims;

pub use layer::BearerAuthLayer;
pub use service::{BearerAuthService, BearerAuthServiceFuture};

/// Default `WWW-Authenticate` realm
pub const DEFAULT_REALM: &str = "api";

/// Post-validation check; returning `false` rejects the request with `401`
pub type AuthPolicy = Arc<dyn Fn(&DecodedClaims) -> bool + Send + Sync>;

/// Business claims of an accepted token (protocol claims removed)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TokenInfo(pub Map<String, Value>);

impl TokenInfo {
    /// Claim value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Subject of the token
    pub fn subject(&self) -> Option<&str> {
        self.0.get("sub").and_then(Value::as_str)
    }
}

impl From<&DecodedClaims> for TokenInfo {
    fn from(claims: &DecodedClaims) -> Self {
        Self(claims.token_info())
    }
}

/// Configuration for the bearer auth layer
#[derive(Clone)]
pub struct BearerAuthConfig {
    /// Realm announced in `WWW-Authenticate`
    pub realm: String,
    /// Scopes of which the token must grant at least one (empty: any)
    pub required_scopes: Vec<String>,
    /// Optional extra check on the claims of a valid token
    pub policy: Option<AuthPolicy>,
}

impl Default for BearerAuthConfig {
    fn default() -> Self {
        Self {
            realm: DEFAULT_REALM.to_string(),
            required_scopes: Vec::new(),
            policy: None,
        }
    }
}

impl std::fmt::Debug for BearerAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuthConfig")
            .field("realm", &self.realm)
            .field("required_scopes", &self.required_scopes)
            .field("policy", &self.policy.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl BearerAuthConfig {
    /// Set the realm
    #[must_use]
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    /// Add an accepted scope
    #[must_use]
    pub fn require_scope(mut self, scope: impl Into<String>) -> Self {
        self.required_scopes.push(scope.into());
        self
    }

    /// Set the post-validation policy
    #[must_use]
    pub fn policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&DecodedClaims) -> bool + Send + Sync + 'static,
    {
        self.policy = Some(Arc::new(policy));
        self
    }

    /// Whether `claims` pass the policy (always, without one)
    pub fn permits(&self, claims: &DecodedClaims) -> bool {
        self.policy.as_ref().is_none_or(|policy| policy(claims))
    }

    /// `WWW-Authenticate` challenge value
    pub fn challenge(&self) -> String {
        format!("Bearer realm=\"{}\"", self.realm)
    }
}
