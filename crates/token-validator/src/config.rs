//! Validator configuration
//!
//! [`ValidatorConfig`] is the process-lifetime record every validation and
//! cache refresh reads. It can only be changed through [`ValidatorConfig::configure`],
//! which applies a fixed allow-list of keys and silently drops everything else,
//! so arbitrary external option maps can be passed in safely.
//!
//! [`ConfigHandle`] is the shared holder. Readers take an immutable snapshot with
//! [`ConfigHandle::config`]; updates publish a whole new record atomically.

use std::sync::Arc;

use arc_swap::ArcSwap;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Keys accepted by [`ValidatorConfig::configure`]
pub const ALLOWED_CONFIG_KEYS: [&str; 5] = [
    "audience",
    "client_id",
    "client_secret",
    "issuer_url",
    "requested_scope",
];

/// Deployment mode of the host service
///
/// Plain-HTTP issuers are tolerated outside production only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    /// HTTPS issuers only
    #[default]
    Production,
    /// HTTP issuers are accepted (local IdPs, test fixtures)
    Development,
}

impl DeploymentMode {
    /// Whether `http://` issuer URLs are acceptable
    pub fn allows_plain_http(self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Identity provider and client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Expected `iss` claim, also the base URL of the IdP
    #[serde(default)]
    pub issuer_url: String,
    /// Audience this service must find in `aud`
    #[serde(default)]
    pub audience: String,
    /// Client id for the client-credentials grant
    #[serde(default)]
    pub client_id: String,
    /// Client secret (zeroized on drop, never logged)
    #[serde(
        default = "empty_secret",
        serialize_with = "serialize_secret",
        deserialize_with = "deserialize_secret"
    )]
    pub client_secret: SecretString,
    /// Scope requested for outbound tokens
    #[serde(default)]
    pub requested_scope: String,
    /// Host deployment mode
    #[serde(default)]
    pub deployment_mode: DeploymentMode,
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new())
}

// Custom serialization for SecretString
fn serialize_secret<S>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

// Custom deserialization for SecretString
fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Ok(SecretString::new(s))
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            issuer_url: String::new(),
            audience: String::new(),
            client_id: String::new(),
            client_secret: empty_secret(),
            requested_scope: String::new(),
            deployment_mode: DeploymentMode::default(),
        }
    }
}

impl ValidatorConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply allow-listed options, ignoring unknown keys
    ///
    /// ```rust
    /// use token_validator::ValidatorConfig;
    ///
    /// let mut config = ValidatorConfig::new();
    /// config.configure([
    ///     ("issuer_url", "https://idp.example.com"),
    ///     ("audience", "https://api.example.com"),
    ///     ("admin", "true"), // dropped
    /// ]);
    /// assert_eq!(config.issuer_url, "https://idp.example.com");
    /// ```
    pub fn configure<I, K, V>(&mut self, options: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in options {
            let key = key.as_ref();
            match key {
                "issuer_url" => self.issuer_url = value.into(),
                "audience" => self.audience = value.into(),
                "client_id" => self.client_id = value.into(),
                "client_secret" => self.client_secret = SecretString::new(value.into()),
                "requested_scope" => self.requested_scope = value.into(),
                _ => debug!(key = key, "Ignoring configuration key outside the allow-list"),
            }
        }
    }

    /// Build a configuration from `{prefix}ISSUER_URL`, `{prefix}AUDIENCE`, ...
    ///
    /// Environment values go through [`configure`](Self::configure), so only
    /// allow-listed keys are picked up.
    pub fn from_env(prefix: &str) -> Self {
        Self::from_vars(prefix, std::env::vars())
    }

    fn from_vars(prefix: &str, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut config = Self::new();
        config.configure(vars.into_iter().filter_map(|(name, value)| {
            name.strip_prefix(prefix)
                .map(|key| (key.to_ascii_lowercase(), value))
        }));
        config
    }

    /// Set the deployment mode
    #[must_use]
    pub fn with_deployment_mode(mut self, mode: DeploymentMode) -> Self {
        self.deployment_mode = mode;
        self
    }

    /// `{issuer_url}/oauth/{action}`
    pub(crate) fn oauth_path(&self, action: &str) -> String {
        format!("{}/oauth/{}", self.issuer_url.trim_end_matches('/'), action)
    }
}

/// Shared, atomically swappable configuration
///
/// Cloning the handle shares the same underlying record.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<ArcSwap<ValidatorConfig>>,
}

impl ConfigHandle {
    /// Wrap an initial configuration
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// Current read-only snapshot
    pub fn config(&self) -> Arc<ValidatorConfig> {
        self.inner.load_full()
    }

    /// Apply allow-listed options and publish the result
    pub fn configure<I, K, V>(&self, options: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let options: Vec<(String, String)> = options
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.into()))
            .collect();

        self.inner.rcu(|current| {
            let mut next = ValidatorConfig::clone(current);
            next.configure(options.iter().map(|(k, v)| (k.as_str(), v.clone())));
            next
        });
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

impl From<ValidatorConfig> for ConfigHandle {
    fn from(config: ValidatorConfig) -> Self {
        Self::new(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_applies_allow_listed_keys() {
        let mut config = ValidatorConfig::new();
        config.configure([
            ("issuer_url", "https://idp.example.com"),
            ("audience", "https://api.example.com"),
            ("client_id", "svc"),
            ("client_secret", "s3cret"),
            ("requested_scope", "idp:api"),
        ]);

        assert_eq!(config.issuer_url, "https://idp.example.com");
        assert_eq!(config.audience, "https://api.example.com");
        assert_eq!(config.client_id, "svc");
        assert_eq!(config.client_secret.expose_secret(), "s3cret");
        assert_eq!(config.requested_scope, "idp:api");
    }

    #[test]
    fn test_configure_drops_unknown_keys() {
        let mut config = ValidatorConfig::new();
        config.configure([("deployment_mode", "development"), ("evil", "x")]);

        assert_eq!(config.deployment_mode, DeploymentMode::Production);
        assert!(config.issuer_url.is_empty());
    }

    #[test]
    fn test_secret_not_in_debug_output() {
        let mut config = ValidatorConfig::new();
        config.configure([("client_secret", "hunter2")]);
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn test_from_vars_uses_prefix_and_allow_list() {
        let vars = vec![
            ("TV_ISSUER_URL".to_string(), "https://idp.example.com".to_string()),
            ("TV_AUDIENCE".to_string(), "aud".to_string()),
            ("TV_SOMETHING".to_string(), "ignored".to_string()),
            ("OTHER_CLIENT_ID".to_string(), "not-ours".to_string()),
        ];
        let config = ValidatorConfig::from_vars("TV_", vars);

        assert_eq!(config.issuer_url, "https://idp.example.com");
        assert_eq!(config.audience, "aud");
        assert!(config.client_id.is_empty());
    }

    #[test]
    fn test_deserialize_with_secret() {
        let config: ValidatorConfig = serde_json::from_value(serde_json::json!({
            "issuer_url": "https://idp.example.com",
            "client_secret": "abc",
            "deployment_mode": "development"
        }))
        .unwrap();

        assert_eq!(config.client_secret.expose_secret(), "abc");
        assert_eq!(config.deployment_mode, DeploymentMode::Development);
        assert!(config.audience.is_empty());
    }

    #[test]
    fn test_oauth_path_trims_trailing_slash() {
        let mut config = ValidatorConfig::new();
        config.configure([("issuer_url", "https://idp.example.com/")]);
        assert_eq!(
            config.oauth_path("discovery/keys"),
            "https://idp.example.com/oauth/discovery/keys"
        );
    }

    #[test]
    fn test_handle_snapshots_are_immutable() {
        let handle = ConfigHandle::new(ValidatorConfig::new());
        let before = handle.config();

        handle.configure([("audience", "https://api.example.com")]);

        assert!(before.audience.is_empty());
        assert_eq!(handle.config().audience, "https://api.example.com");
    }

    #[test]
    fn test_handle_clones_share_state() {
        let handle = ConfigHandle::default();
        let other = handle.clone();
        other.configure([("client_id", "svc")]);
        assert_eq!(handle.config().client_id, "svc");
    }
}
