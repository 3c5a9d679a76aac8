//! Error types for the profile service

use std::io;

use thiserror::Error;

use crate::store::StoreError;

/// Result type alias for startup and wiring code
pub type Result<T> = std::result::Result<T, Error>;

/// Service-level errors.
///
/// Request-path failures are typed closer to where they happen
/// ([`crate::auth::AuthRejection`], [`StoreError`]); this enum covers process
/// bootstrap, where every variant is fatal.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Document store could not be reached or initialized
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
