//! Bearer token validation.
//!
//! # Verification order
//!
//! Each step either passes or ends validation with its own rejection; later
//! steps never run after a failure.
//!
//! 1. Token structure (three segments, decodable header) → `MalformedToken`
//! 2. `kid` resolves through the [`KeyProvider`] → `UnknownKey`
//!    (`KeysUnavailable` if the key set cannot be fetched)
//! 3. `alg` is RS256 and the signature verifies → `BadSignature`
//! 4. `iss` matches the configured issuer (trailing slash ignored) → `BadIssuer`
//! 5. The configured audience is one of the `aud` values → `BadAudience`
//! 6. `exp` plus the clock-skew allowance has not passed → `Expired`

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, TokenData, Validation, errors::ErrorKind};
use serde::Deserialize;
use tracing::debug;

use super::jwks::{KeyError, KeyProvider};

/// The only signature algorithm accepted.
pub const ACCEPTED_ALGORITHM: Algorithm = Algorithm::RS256;

/// Why a request was not authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthRejection {
    /// No bearer token in the `Authorization` header.
    #[error("missing bearer token")]
    MissingToken,
    /// The header or token could not be parsed.
    #[error("malformed token")]
    MalformedToken,
    /// The token's key id is absent or not in the provider's key set.
    #[error("unknown signing key")]
    UnknownKey,
    /// Wrong algorithm or the signature does not verify.
    #[error("bad signature")]
    BadSignature,
    /// `iss` is not the configured provider.
    #[error("issuer mismatch")]
    BadIssuer,
    /// The configured audience is not in `aud`.
    #[error("audience mismatch")]
    BadAudience,
    /// `exp` is missing or in the past beyond the allowed skew.
    #[error("token expired")]
    Expired,
    /// The provider's key set could not be fetched.
    #[error("signing keys unavailable")]
    KeysUnavailable,
}

impl AuthRejection {
    /// Stable machine-readable code used in response bodies and logs.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::MalformedToken => "malformed_token",
            Self::UnknownKey => "unknown_key",
            Self::BadSignature => "bad_signature",
            Self::BadIssuer => "bad_issuer",
            Self::BadAudience => "bad_audience",
            Self::Expired => "expired",
            Self::KeysUnavailable => "keys_unavailable",
        }
    }
}

/// Verified token payload, attached to the request for downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedClaims {
    /// `sub` claim, the caller's external identity.
    pub subject: String,
    /// `iss` claim.
    pub issuer: String,
    /// `aud` claim, normalized to a list.
    pub audience: Vec<String>,
    /// `exp` claim (Unix seconds).
    pub expires_at: u64,
}

/// Claims as they appear in the token. Only `iss`, `aud` and `exp` are checked.
#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    aud: serde_json::Value,
    #[serde(default)]
    exp: Option<u64>,
}

/// Verifies bearer tokens issued by one identity provider.
pub struct TokenValidator {
    keys: Arc<KeyProvider>,
    issuer: String,
    audience: String,
    clock_skew: Duration,
}

impl TokenValidator {
    /// Create a validator with the default 5-second clock skew.
    #[must_use]
    pub fn new(keys: Arc<KeyProvider>, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            audience: audience.into(),
            clock_skew: Duration::from_secs(5),
        }
    }

    /// Override the clock skew tolerance.
    #[must_use]
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Validate a raw bearer token.
    ///
    /// # Errors
    ///
    /// Returns the first [`AuthRejection`] encountered, in the order listed in
    /// the module documentation.
    pub async fn validate(&self, token: &str) -> Result<ValidatedClaims, AuthRejection> {
        if token.split('.').count() != 3 {
            return Err(AuthRejection::MalformedToken);
        }
        let header = jsonwebtoken::decode_header(token).map_err(|e| {
            debug!(error = %e, "Undecodable token header");
            AuthRejection::MalformedToken
        })?;

        let kid = header.kid.as_deref().ok_or(AuthRejection::UnknownKey)?;
        let key = self.keys.get_key(kid).await.map_err(|e| match e {
            KeyError::NotFound(_) => AuthRejection::UnknownKey,
            KeyError::Fetch(_) => AuthRejection::KeysUnavailable,
        })?;

        if header.alg != ACCEPTED_ALGORITHM {
            debug!(alg = ?header.alg, "Rejected token algorithm");
            return Err(AuthRejection::BadSignature);
        }

        let token_data: TokenData<RawClaims> =
            jsonwebtoken::decode(token, &key, &signature_only_validation()).map_err(|e| {
                debug!(error = %e, "Token signature check failed");
                match e.kind() {
                    ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                        AuthRejection::MalformedToken
                    }
                    _ => AuthRejection::BadSignature,
                }
            })?;
        let claims = token_data.claims;

        let issuer = claims.iss.unwrap_or_default();
        if !issuer_matches(&issuer, &self.issuer) {
            return Err(AuthRejection::BadIssuer);
        }

        let audience = audience_values(&claims.aud);
        if !audience.iter().any(|a| a == &self.audience) {
            return Err(AuthRejection::BadAudience);
        }

        let expires_at = claims.exp.ok_or(AuthRejection::Expired)?;
        if is_expired(expires_at, now_secs(), self.clock_skew) {
            return Err(AuthRejection::Expired);
        }

        Ok(ValidatedClaims {
            subject: claims.sub.unwrap_or_default(),
            issuer,
            audience,
            expires_at,
        })
    }
}

/// Signature-only [`Validation`]: claim checks run afterwards in a fixed order.
fn signature_only_validation() -> Validation {
    let mut validation = Validation::new(ACCEPTED_ALGORITHM);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation
}

fn issuer_matches(actual: &str, expected: &str) -> bool {
    !actual.is_empty() && actual.trim_end_matches('/') == expected.trim_end_matches('/')
}

/// `aud` may be a single string or an array of strings.
fn audience_values(aud: &serde_json::Value) -> Vec<String> {
    match aud {
        serde_json::Value::String(s) => vec![s.clone()],
        serde_json::Value::Array(arr) => arr
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn is_expired(exp: u64, now: u64, skew: Duration) -> bool {
    now > exp.saturating_add(skew.as_secs())
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
