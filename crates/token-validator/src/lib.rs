//! # Token Validator
//!
//! Bearer JWT validation against an OAuth identity provider (IdP), plus a cache
//! for the IdP's signing keys and for this service's own client-credentials token.
//!
//! ## Architecture
//!
//! - [`config`] - Allow-listed IdP and client settings, swappable at runtime
//! - [`claims`] - Unverified decoding of compact tokens
//! - [`cache`] - [`CredentialCache`] over a pluggable [`CacheStore`]
//! - [`http`](self::http) - The [`IdpHttpClient`] seam and its reqwest implementation
//! - [`validator`] - [`TokenValidator`], the ordered check pipeline
//! - [`tower`](self::tower) - Bearer auth middleware (feature `middleware`)
//! - [`logging`] - Optional subscriber setup for hosts without one
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use token_validator::{CredentialCache, TokenValidator, ValidatorConfig};
//!
//! # tokio_test::block_on(async {
//! let mut config = ValidatorConfig::new();
//! config.configure([
//!     ("issuer_url", "https://idp.example.com"),
//!     ("audience", "https://api.example.com"),
//!     ("client_id", "billing"),
//!     ("client_secret", "s3cret"),
//!     ("requested_scope", "idp:api"),
//! ]);
//!
//! let cache = Arc::new(CredentialCache::builder(config).app_name("billing").build()?);
//! let validator = TokenValidator::new(Arc::clone(&cache));
//!
//! // Inbound: check a caller's token
//! let verdict = validator.authenticate("eyJ0eXAi...", &["billing:read"]).await;
//! if verdict.valid {
//!     println!("caller: {:?}", verdict.claims.as_ref().and_then(|c| c.sub()));
//! }
//!
//! // Outbound: authenticate to a peer service
//! let headers = cache.bearer_auth_header().await;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```
//!
//! ## Feature Flags
//!
//! - `middleware` (default) - Tower `Layer`/`Service` for bearer authentication
//! - `tower` - Alias for `middleware`

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod cache;
pub mod claims;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod validator;

#[cfg(feature = "middleware")]
#[cfg_attr(docsrs, doc(cfg(feature = "middleware")))]
pub mod tower;

#[cfg(test)]
pub(crate) mod testing;

#[doc(inline)]
pub use cache::{
    CacheStore, CachedAccessToken, CredentialCache, CredentialCacheBuilder, DiscoveryDocument,
    KeySetSource, MemoryStore, TOKEN_RENEWAL_BUFFER, namespace_for,
};
#[doc(inline)]
pub use claims::DecodedClaims;
#[doc(inline)]
pub use config::{ALLOWED_CONFIG_KEYS, ConfigHandle, DeploymentMode, ValidatorConfig};
#[doc(inline)]
pub use error::{LoggingError, TokenError, TokenResult, TransportError};
#[doc(inline)]
pub use self::http::{HttpReply, IdpHttpClient, ReqwestIdpClient};
#[doc(inline)]
pub use logging::{LoggingConfig, logger};
#[doc(inline)]
pub use validator::{ACCEPTED_ALGORITHMS, TokenValidator, Verdict};

#[cfg(feature = "middleware")]
#[doc(inline)]
pub use self::tower::{BearerAuthConfig, BearerAuthLayer, BearerAuthService, TokenInfo};
