//! Error types for token validation and IdP transport

use thiserror::Error;

/// Why a presented access token was rejected
///
/// Every variant is an expected validation outcome, not a programming error.
/// [`TokenValidator::is_valid_access_token`](crate::TokenValidator::is_valid_access_token)
/// folds all of them into `false` after logging.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The compact serialization could not be split or decoded
    #[error("Invalid JWT format: {0}")]
    Format(String),

    /// `iss` is missing, not an acceptable URL, or not the configured issuer
    #[error("Invalid issuer: {0}")]
    InvalidIssuer(String),

    /// Signature (or signing algorithm) did not verify
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// No usable key for the token's `kid` in the issuer's key set
    #[error("Invalid signature key: {0}")]
    InvalidSignatureKey(String),

    /// `aud` does not contain the configured audience
    #[error("Invalid audience: {0}")]
    InvalidAudience(String),

    /// Outside the `[iat, exp]` window
    #[error("Access token is expired: {0}")]
    Expired(String),

    /// A required claim is absent
    #[error("Missing access token field: {0}")]
    MissingField(String),

    /// Scope claim missing or none of the expected scopes granted
    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    /// Token was already presented (no replay store exists yet)
    #[error("Replayed token: {0}")]
    Replayed(String),
}

impl TokenError {
    /// Stable label for structured logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Format(_) => "jwt_format",
            Self::InvalidIssuer(_) => "invalid_issuer",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::InvalidSignatureKey(_) => "invalid_signature_key",
            Self::InvalidAudience(_) => "invalid_audience",
            Self::Expired(_) => "expired",
            Self::MissingField(_) => "missing_field",
            Self::InvalidScope(_) => "invalid_scope",
            Self::Replayed(_) => "replayed",
        }
    }
}

/// Result alias for validation steps
pub type TokenResult<T> = Result<T, TokenError>;

/// Failure talking to the identity provider
///
/// The credential cache swallows these and degrades to "no data"; they only
/// surface to callers that use an [`IdpHttpClient`](crate::http::IdpHttpClient)
/// directly.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request did not complete within the client timeout
    #[error("request to {url} timed out")]
    Timeout {
        /// Target URL
        url: String,
    },

    /// Connection could not be established (refused, DNS, TLS)
    #[error("could not connect to {url}: {message}")]
    Connect {
        /// Target URL
        url: String,
        /// Underlying error text
        message: String,
    },

    /// Any other request failure
    #[error("request to {url} failed: {message}")]
    Request {
        /// Target URL
        url: String,
        /// Underlying error text
        message: String,
    },

    /// The response body could not be read
    #[error("failed to read response body from {url}: {message}")]
    Body {
        /// Target URL
        url: String,
        /// Underlying error text
        message: String,
    },
}

impl TransportError {
    pub(crate) fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        let url = url.to_string();
        if err.is_timeout() {
            Self::Timeout { url }
        } else if err.is_connect() {
            Self::Connect {
                url,
                message: err.to_string(),
            }
        } else {
            Self::Request {
                url,
                message: err.to_string(),
            }
        }
    }
}

/// Logging initialisation failure
#[derive(Debug, Clone, Error)]
pub enum LoggingError {
    /// A global subscriber is already installed
    #[error("Tracing subscriber error: {0}")]
    AlreadyInitialized(String),

    /// The level directive could not be parsed
    #[error("Invalid log level directive: {0}")]
    InvalidDirective(String),
}
