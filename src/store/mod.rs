//! Profile persistence.
//!
//! The [`ProfileBackend`] trait abstracts over document stores. Two
//! implementations exist: [`MemoryBackend`] (a `DashMap`) and, with the
//! `mongodb` feature, [`mongo::MongoBackend`].
//!
//! [`ProfileStore`] sits in front of a backend and owns the rules every
//! backend shares:
//!
//! - identities must be non-empty and patches must change something
//! - every operation runs under `operation_timeout`; expiry yields
//!   [`StoreError::Timeout`] for that operation only
//! - `create` reads first and reports a duplicate as [`StoreError::Conflict`];
//!   the backend insert is itself atomic on the identity, so a concurrent
//!   duplicate that slips past the read is still a conflict
//! - `update` returns the document as read back after the write

pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongo;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::{StoreBackendKind, StoreConfig};
use crate::profiles::{NewProfile, Profile, ProfileUpdate};

pub use memory::MemoryBackend;

/// Classified store outcomes.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Caller input rejected before touching the store.
    #[error("{0}")]
    Validation(String),
    /// A profile with this identity already exists.
    #[error("{0}")]
    Conflict(String),
    /// No profile with this identity.
    #[error("{0}")]
    NotFound(String),
    /// The operation did not finish within its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation name.
        operation: &'static str,
        /// Deadline that expired.
        after: Duration,
    },
    /// Any other driver or connectivity failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage primitives a document store must provide.
///
/// Implementations must be `Send + Sync` because one handle is shared across
/// all request tasks.
#[async_trait::async_trait]
pub trait ProfileBackend: Send + Sync + 'static {
    /// Insert a profile, assigning its id. Must fail with
    /// [`StoreError::Conflict`] if the identity already exists, atomically
    /// with the insert.
    async fn insert(&self, profile: NewProfile) -> StoreResult<Profile>;

    /// Look up a profile by identity.
    async fn find(&self, user_id: &str) -> StoreResult<Option<Profile>>;

    /// Apply `update` to the matching profile. Returns `false` if none matched.
    async fn update(&self, user_id: &str, update: &ProfileUpdate) -> StoreResult<bool>;

    /// Remove the matching profile. Returns `false` if none matched.
    async fn delete(&self, user_id: &str) -> StoreResult<bool>;

    /// Round-trip to the store to confirm it is reachable.
    async fn ping(&self) -> StoreResult<()>;

    /// Release connections. Called once after the server stops.
    async fn shutdown(&self);

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// The profile collection, with validation and per-operation deadlines.
#[derive(Clone)]
pub struct ProfileStore {
    backend: Arc<dyn ProfileBackend>,
    operation_timeout: Duration,
}

impl ProfileStore {
    /// Wrap `backend`, bounding each operation by `operation_timeout`.
    #[must_use]
    pub fn new(backend: Arc<dyn ProfileBackend>, operation_timeout: Duration) -> Self {
        Self {
            backend,
            operation_timeout,
        }
    }

    /// Backend name for logs.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Create a profile.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty identity, `Conflict` if the identity is
    /// taken, `Timeout` or `Backend` on store failure.
    pub async fn create(&self, profile: NewProfile) -> StoreResult<Profile> {
        require_identity(&profile.user_id)?;

        self.with_deadline("create", async {
            if self.backend.find(&profile.user_id).await?.is_some() {
                return Err(conflict());
            }
            self.backend.insert(profile).await
        })
        .await
    }

    /// Fetch a profile by identity.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty identity, `NotFound`, `Timeout` or `Backend`.
    pub async fn get_by_identity(&self, user_id: &str) -> StoreResult<Profile> {
        require_identity(user_id)?;

        self.with_deadline("get", async {
            self.backend.find(user_id).await?.ok_or_else(not_found)
        })
        .await
    }

    /// Apply a partial update and return the stored result.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty identity or an empty patch, `NotFound`,
    /// `Timeout` or `Backend`.
    pub async fn update(&self, user_id: &str, update: &ProfileUpdate) -> StoreResult<Profile> {
        require_identity(user_id)?;
        if update.is_empty() {
            return Err(StoreError::Validation("no fields to update".to_string()));
        }

        self.with_deadline("update", async {
            if !self.backend.update(user_id, update).await? {
                return Err(not_found());
            }
            self.backend.find(user_id).await?.ok_or_else(not_found)
        })
        .await
    }

    /// Delete a profile.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty identity, `NotFound`, `Timeout` or `Backend`.
    pub async fn delete(&self, user_id: &str) -> StoreResult<()> {
        require_identity(user_id)?;

        self.with_deadline("delete", async {
            if self.backend.delete(user_id).await? {
                Ok(())
            } else {
                Err(not_found())
            }
        })
        .await
    }

    /// Confirm the store is reachable within `timeout`.
    ///
    /// # Errors
    ///
    /// `Timeout` or `Backend`.
    pub async fn ping(&self, timeout: Duration) -> StoreResult<()> {
        tokio::time::timeout(timeout, self.backend.ping())
            .await
            .map_err(|_| StoreError::Timeout {
                operation: "ping",
                after: timeout,
            })?
    }

    /// Release backend resources.
    pub async fn shutdown(&self) {
        self.backend.shutdown().await;
    }

    async fn with_deadline<T, F>(&self, operation: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                debug!(operation, timeout = ?self.operation_timeout, "Store operation timed out");
                Err(StoreError::Timeout {
                    operation,
                    after: self.operation_timeout,
                })
            }
        }
    }
}

fn require_identity(user_id: &str) -> StoreResult<()> {
    if user_id.trim().is_empty() {
        return Err(StoreError::Validation("userId is required".to_string()));
    }
    Ok(())
}

fn conflict() -> StoreError {
    StoreError::Conflict("profile with this userId already exists".to_string())
}

fn not_found() -> StoreError {
    StoreError::NotFound("profile not found".to_string())
}

/// Open the backend selected by `config` and confirm it responds.
///
/// # Errors
///
/// Returns an error if the backend is unavailable in this build, the
/// connection cannot be established, or the startup ping fails.
pub async fn connect(config: &StoreConfig) -> crate::Result<ProfileStore> {
    let backend: Arc<dyn ProfileBackend> = match config.backend {
        StoreBackendKind::Memory => Arc::new(MemoryBackend::new()),
        #[cfg(feature = "mongodb")]
        StoreBackendKind::Mongodb => Arc::new(mongo::MongoBackend::connect(config).await?),
        #[cfg(not(feature = "mongodb"))]
        StoreBackendKind::Mongodb => {
            return Err(crate::Error::Config(
                "store.backend is mongodb but this build lacks the `mongodb` feature".to_string(),
            ));
        }
    };

    let store = ProfileStore::new(backend, config.operation_timeout());
    store.ping(config.connect_timeout()).await?;

    info!(
        backend = store.backend_name(),
        database = %config.database,
        collection = %config.collection,
        "Profile store ready"
    );
    Ok(store)
}
