//! Unverified JWT decoding
//!
//! [`DecodedClaims`] is what you get from splitting a compact token and
//! base64url-decoding its header and payload. Nothing here checks the
//! signature; the engine uses it to run its structural checks before (and
//! after) cryptographic verification, and callers may read it for business
//! data regardless of the validation outcome.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Map, Value};

use crate::error::{TokenError, TokenResult};

/// Claims dropped by [`DecodedClaims::token_info`]
pub const PROTOCOL_CLAIMS: [&str; 7] = ["iss", "kid", "aud", "iat", "exp", "jti", "scopes"];

/// Header and payload of a compact JWT, decoded without verification
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClaims {
    header: Map<String, Value>,
    claims: Map<String, Value>,
}

impl DecodedClaims {
    /// Split and decode a compact token
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Format`] unless the token has exactly three
    /// base64url segments whose first two are JSON objects.
    pub fn decode(raw: &str) -> TokenResult<Self> {
        let segments: Vec<&str> = raw.split('.').collect();
        let [header, payload, signature] = segments.as_slice() else {
            return Err(TokenError::Format(format!(
                "expected 3 segments, found {}",
                segments.len()
            )));
        };

        let header = decode_object(header, "header")?;
        let claims = decode_object(payload, "payload")?;
        URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|e| TokenError::Format(format!("invalid signature encoding: {e}")))?;

        Ok(Self { header, claims })
    }

    /// Raw claim value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// Whether the payload carries `name` (even as `null`)
    pub fn contains(&self, name: &str) -> bool {
        self.claims.contains_key(name)
    }

    /// Header value (`alg`, `kid`, `typ`, ...)
    pub fn header(&self, name: &str) -> Option<&Value> {
        self.header.get(name)
    }

    /// Issuer
    pub fn iss(&self) -> Option<&str> {
        self.claims.get("iss").and_then(Value::as_str)
    }

    /// Subject
    pub fn sub(&self) -> Option<&str> {
        self.claims.get("sub").and_then(Value::as_str)
    }

    /// Key id, from the payload or else the header
    pub fn kid(&self) -> Option<&str> {
        self.claims
            .get("kid")
            .and_then(Value::as_str)
            .or_else(|| self.header.get("kid").and_then(Value::as_str))
    }

    /// Signing algorithm named in the header
    pub fn alg(&self) -> Option<&str> {
        self.header.get("alg").and_then(Value::as_str)
    }

    /// Audiences; a single string is treated as a one-element list
    pub fn audiences(&self) -> Vec<&str> {
        string_list(self.claims.get("aud"))
    }

    /// Issued-at, unix seconds; NumericDate may be fractional
    pub fn iat(&self) -> Option<f64> {
        self.claims.get("iat").and_then(Value::as_f64)
    }

    /// Expiry, unix seconds
    pub fn exp(&self) -> Option<f64> {
        self.claims.get("exp").and_then(Value::as_f64)
    }

    /// Granted scopes, from `scopes` or else the legacy `scope`
    ///
    /// `None` means neither claim is present; an empty list is a valid grant
    /// of nothing. Both claims may be arrays or space-delimited strings.
    pub fn scopes(&self) -> Option<Vec<&str>> {
        self.claims
            .get("scopes")
            .or_else(|| self.claims.get("scope"))
            .map(|value| match value {
                Value::String(s) => s.split_whitespace().collect(),
                other => string_list(Some(other)),
            })
    }

    /// Full payload
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// Consume into the payload map
    pub fn into_map(self) -> Map<String, Value> {
        self.claims
    }

    /// Payload without protocol claims, for downstream business use
    pub fn token_info(&self) -> Map<String, Value> {
        self.claims
            .iter()
            .filter(|(name, _)| !PROTOCOL_CLAIMS.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

fn decode_object(segment: &str, part: &str) -> TokenResult<Map<String, Value>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenError::Format(format!("invalid {part} encoding: {e}")))?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(TokenError::Format(format!("{part} is not a JSON object"))),
        Err(e) => Err(TokenError::Format(format!("invalid {part} JSON: {e}"))),
    }
}

fn string_list(value: Option<&Value>) -> Vec<&str> {
    match value {
        Some(Value::String(s)) => vec![s.as_str()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}
