//! Profile Service Library
//!
//! An authenticated user-profile resource served over HTTP.
//!
//! # Features
//!
//! - **Bearer validation**: RS256 tokens from an OIDC provider, verified against a
//!   cached JWKS with issuer, audience and clock-skew checks
//! - **Short-circuit auth gate**: rejected requests never reach a handler
//! - **Profile resource**: create / read / partial update / delete keyed by the
//!   provider-issued identity, unique per identity
//! - **Bounded store calls**: every document-store operation runs under its own deadline
//! - **Pluggable storage**: MongoDB (feature `mongodb`) or in-memory

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod profiles;
pub mod server;
pub mod store;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber
                .with(fmt::layer().json())
                .try_init()
                .map_err(|e| Error::Internal(e.to_string()))?;
        }
        _ => {
            subscriber
                .with(fmt::layer())
                .try_init()
                .map_err(|e| Error::Internal(e.to_string()))?;
        }
    }

    Ok(())
}
