//! Bearer-token authentication.
//!
//! ```text
//! Request arrives
//!   -> AuthGate extracts the bearer token            (none: 401 missing_token)
//!   -> TokenValidator checks structure, key, signature, iss, aud, exp
//!        -> KeyProvider resolves `kid` from the cached JWKS
//!   -> Continue with ValidatedClaims in extensions, or 401 with the reason
//! ```

pub mod gate;
pub mod jwks;
pub mod validator;

use std::sync::Arc;

use tracing::info;

use crate::config::AuthConfig;
use crate::Result;

pub use gate::{AuthGate, Authenticator, GateDecision, auth_gate};
pub use jwks::{HttpJwksSource, JwksSource, KeyError, KeyProvider, StaticJwksSource};
pub use validator::{AuthRejection, TokenValidator, ValidatedClaims};

/// Build the validator described by `config`.
///
/// Keys come from `auth.jwks_file` when set, otherwise from the provider's
/// JWKS endpoint over HTTPS.
///
/// # Errors
///
/// Returns an error if the pinned JWKS file cannot be loaded or the HTTP
/// client cannot be constructed.
pub fn build_validator(config: &AuthConfig) -> Result<TokenValidator> {
    let source: Arc<dyn JwksSource> = match &config.jwks_file {
        Some(path) => Arc::new(StaticJwksSource::from_file(path)?),
        None => Arc::new(HttpJwksSource::new(config.jwks_fetch_timeout())?),
    };

    let keys = KeyProvider::new(config.resolved_jwks_uri(), source)
        .with_ttl(config.jwks_cache_ttl())
        .with_min_refresh_interval(config.jwks_min_refresh());

    info!(
        issuer = %config.issuer_url(),
        audience = %config.audience,
        jwks_uri = %keys.jwks_uri(),
        "Token validation configured"
    );

    Ok(
        TokenValidator::new(Arc::new(keys), config.issuer_url(), config.audience.clone())
            .with_clock_skew(config.clock_skew()),
    )
}
