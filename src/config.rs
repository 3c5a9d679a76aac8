//! Configuration management
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults (`#[serde(default)]` on every section)
//! 2. Optional YAML file
//! 3. Conventional variables: `AUTH0_DOMAIN`, `AUTH0_AUDIENCE`, `MONGODB_URI`,
//!    `MONGODB_DATABASE`, `PORT`
//! 4. Prefixed variables: `PROFILE_SERVICE_<SECTION>__<KEY>`
//!
//! [`Config::load`] validates the result; a missing provider domain, audience
//! or store URI is reported as [`Error::Config`] and the process must not start.

use std::{path::Path, path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default database name when `MONGODB_DATABASE` is unset.
pub const DEFAULT_DATABASE: &str = "questweaverpro";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Identity provider / token validation configuration
    pub auth: AuthConfig,
    /// Document store configuration
    pub store: StoreConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Global cap on in-flight requests. `None` serves every accepted
    /// connection immediately.
    pub max_concurrent_requests: Option<usize>,
    /// How long to wait for in-flight requests after a shutdown signal
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_concurrent_requests: None,
            shutdown_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Graceful shutdown budget
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Provider tenant domain, e.g. `example.eu.auth0.com` (required)
    pub domain: String,
    /// Audience that must appear in the token's `aud` claim (required)
    pub audience: String,
    /// Override for the JWKS location. Defaults to
    /// `https://{domain}/.well-known/jwks.json`.
    pub jwks_uri: Option<String>,
    /// Load a pinned JWKS document from disk instead of fetching it
    pub jwks_file: Option<PathBuf>,
    /// How long a fetched key set stays fresh
    pub jwks_cache_ttl_secs: u64,
    /// Minimum age of the cached key set before an unknown `kid` may force a refetch
    pub jwks_min_refresh_secs: u64,
    /// Timeout for a single JWKS fetch
    pub jwks_fetch_timeout_secs: u64,
    /// Allowed clock skew when checking `exp`
    pub clock_skew_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            audience: String::new(),
            jwks_uri: None,
            jwks_file: None,
            jwks_cache_ttl_secs: 3600,
            jwks_min_refresh_secs: 30,
            jwks_fetch_timeout_secs: 10,
            clock_skew_secs: 5,
        }
    }
}

impl AuthConfig {
    /// Issuer URL expected in the `iss` claim: `https://{domain}/`.
    #[must_use]
    pub fn issuer_url(&self) -> String {
        let domain = self
            .domain
            .trim()
            .trim_start_matches("https://")
            .trim_end_matches('/');
        format!("https://{domain}/")
    }

    /// JWKS endpoint, honoring the `jwks_uri` override.
    #[must_use]
    pub fn resolved_jwks_uri(&self) -> String {
        self.jwks_uri.clone().unwrap_or_else(|| {
            let issuer = self.issuer_url();
            format!("{}/.well-known/jwks.json", issuer.trim_end_matches('/'))
        })
    }

    /// Key set time-to-live
    #[must_use]
    pub fn jwks_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_cache_ttl_secs)
    }

    /// Forced-refresh floor for unknown key ids
    #[must_use]
    pub fn jwks_min_refresh(&self) -> Duration {
        Duration::from_secs(self.jwks_min_refresh_secs)
    }

    /// Timeout for one JWKS request
    #[must_use]
    pub fn jwks_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.jwks_fetch_timeout_secs)
    }

    /// Clock skew tolerance
    #[must_use]
    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_secs)
    }
}

/// Which profile store implementation to run against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    /// MongoDB (`store.uri` required)
    #[default]
    Mongodb,
    /// Process-local map; data is lost on restart
    Memory,
}

impl std::fmt::Display for StoreBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mongodb => write!(f, "mongodb"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend selection
    pub backend: StoreBackendKind,
    /// Connection string (required for the MongoDB backend)
    pub uri: String,
    /// Database name
    pub database: String,
    /// Collection holding profile documents
    pub collection: String,
    /// Deadline applied to every store operation
    pub operation_timeout_secs: u64,
    /// Deadline for the startup connectivity check
    pub connect_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackendKind::Mongodb,
            uri: String::new(),
            database: DEFAULT_DATABASE.to_string(),
            collection: "profiles".to_string(),
            operation_timeout_secs: 5,
            connect_timeout_secs: 2,
        }
    }
}

impl StoreConfig {
    /// Per-operation deadline
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Startup ping deadline
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Connection string with any `user:password@` userinfo masked.
    #[must_use]
    pub fn redacted_uri(&self) -> String {
        let Some((scheme, rest)) = self.uri.split_once("://") else {
            return self.uri.clone();
        };
        let authority_end = rest.find('/').unwrap_or(rest.len());
        match rest[..authority_end].rfind('@') {
            Some(at) => format!("{scheme}://***@{}", &rest[at + 1..]),
            None => self.uri.clone(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment, then validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or required settings are missing.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment
            .merge(conventional_env())
            .merge(Env::prefixed("PROFILE_SERVICE_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check the settings without which the service must not start.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming every missing or invalid setting.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();

        if self.auth.domain.trim().is_empty() {
            missing.push("auth.domain (AUTH0_DOMAIN)");
        }
        if self.auth.audience.trim().is_empty() {
            missing.push("auth.audience (AUTH0_AUDIENCE)");
        }
        if self.store.backend == StoreBackendKind::Mongodb && self.store.uri.trim().is_empty() {
            missing.push("store.uri (MONGODB_URI)");
        }

        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        if self.store.operation_timeout_secs == 0 {
            return Err(Error::Config(
                "store.operation_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.server.max_concurrent_requests == Some(0) {
            return Err(Error::Config(
                "server.max_concurrent_requests must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Unprefixed variables used by the existing deployment scripts.
fn conventional_env() -> Env {
    Env::raw()
        .only(&[
            "AUTH0_DOMAIN",
            "AUTH0_AUDIENCE",
            "MONGODB_URI",
            "MONGODB_DATABASE",
            "PORT",
        ])
        .map(|key| {
            if key == "AUTH0_DOMAIN" {
                "auth.domain".into()
            } else if key == "AUTH0_AUDIENCE" {
                "auth.audience".into()
            } else if key == "MONGODB_URI" {
                "store.uri".into()
            } else if key == "MONGODB_DATABASE" {
                "store.database".into()
            } else if key == "PORT" {
                "server.port".into()
            } else {
                key.as_str().into()
            }
        })
}
