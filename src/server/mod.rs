//! HTTP server: wiring, listener and graceful shutdown

mod router;

pub use router::{AppState, create_router};

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::auth::{AuthGate, build_validator};
use crate::config::Config;
use crate::store::{self, ProfileStore};
use crate::{Error, Result};

/// Profile service server
pub struct Server {
    config: Config,
    state: AppState,
}

impl Server {
    /// Build the validator and open the profile store.
    ///
    /// # Errors
    ///
    /// Fails if the JWKS source cannot be set up or the store is unreachable.
    pub async fn new(config: Config) -> Result<Self> {
        let validator = build_validator(&config.auth)?;
        let store = store::connect(&config.store).await?;
        Ok(Self::with_parts(config, store, AuthGate::new(Arc::new(validator))))
    }

    /// Assemble a server from already constructed parts.
    #[must_use]
    pub fn with_parts(config: Config, store: ProfileStore, gate: AuthGate) -> Self {
        let state = AppState {
            store,
            gate,
            max_concurrent_requests: config.server.max_concurrent_requests,
        };
        Self { config, state }
    }

    /// Run until Ctrl-C or SIGTERM, then drain and close the store.
    ///
    /// # Errors
    ///
    /// Fails if the address is invalid, the port cannot be bound, or the
    /// server loop errors.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    ///
    /// # Errors
    ///
    /// Fails if the server loop errors.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let store = self.state.store.clone();
        let app = create_router(self.state);

        info!(
            version = env!("CARGO_PKG_VERSION"),
            addr = %listener.local_addr()?,
            store = store.backend_name(),
            max_concurrent_requests = ?self.config.server.max_concurrent_requests,
            "Profile service listening"
        );

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown_tx))
            .into_future();
        tokio::pin!(server);

        let drain_timeout = self.config.server.shutdown_timeout();
        let drain_deadline = async {
            // A closed channel means the signal task is gone; nothing to wait for.
            if shutdown_rx.wait_for(|stopping| *stopping).await.is_err() {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(drain_timeout).await;
        };

        tokio::select! {
            result = &mut server => {
                result.map_err(|e| Error::Internal(e.to_string()))?;
            }
            () = drain_deadline => {
                warn!(timeout = ?drain_timeout, "In-flight requests did not drain in time");
            }
        }

        info!("Closing profile store...");
        store.shutdown().await;
        info!("Shutdown complete");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    // The receiver lives until `serve` returns, so this only fails after the drain ended.
    shutdown_tx.send(true).ok();
}
