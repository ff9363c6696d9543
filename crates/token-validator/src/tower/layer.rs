//! Tower Layer for bearer authentication

use std::sync::Arc;

use tower::Layer;

use crate::claims::DecodedClaims;
use crate::validator::TokenValidator;

use super::BearerAuthConfig;
use super::service::BearerAuthService;

/// Tower Layer that puts bearer token validation in front of a service
///
/// # Example
///
/// ```rust,ignore
/// use tower::ServiceBuilder;
/// use token_validator::tower::BearerAuthLayer;
///
/// let layer = BearerAuthLayer::new(validator)
///     .realm("billing")
///     .require_scope("billing:read")
///     .policy(|claims| claims.get("partner_guid").is_some());
///
/// let service = ServiceBuilder::new().layer(layer).service(my_inner_service);
/// ```
#[derive(Debug, Clone)]
pub struct BearerAuthLayer {
    validator: TokenValidator,
    config: BearerAuthConfig,
}

impl BearerAuthLayer {
    /// Layer with the default configuration
    pub fn new(validator: TokenValidator) -> Self {
        Self::with_config(validator, BearerAuthConfig::default())
    }

    /// Layer with a custom configuration
    pub fn with_config(validator: TokenValidator, config: BearerAuthConfig) -> Self {
        Self { validator, config }
    }

    /// Current configuration
    pub fn config(&self) -> &BearerAuthConfig {
        &self.config
    }

    /// Set the `WWW-Authenticate` realm
    #[must_use]
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.config = self.config.realm(realm);
        self
    }

    /// Add an accepted scope
    #[must_use]
    pub fn require_scope(mut self, scope: impl Into<String>) -> Self {
        self.config = self.config.require_scope(scope);
        self
    }

    /// Set the post-validation policy
    #[must_use]
    pub fn policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&DecodedClaims) -> bool + Send + Sync + 'static,
    {
        self.config = self.config.policy(policy);
        self
    }
}

impl<S> Layer<S> for BearerAuthLayer {
    type Service = BearerAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuthService::new(inner, self.validator.clone(), Arc::new(self.config.clone()))
    }
}
