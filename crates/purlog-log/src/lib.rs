//! The log HTTP server.
//!
//! Exposes the write path (`POST /add`) and the read path (`GET
//! /checkpoint`, `GET /tile/...`) over a tiled Merkle store. Appends are
//! validated as pURL entries of the configured type, handed to the store's
//! appender, and answered with the covering checkpoint plus a self-verified
//! inclusion proof.

mod error;
mod handlers;


use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use purlog_note::Ed25519Verifier;
use purlog_tiles::{Appender, TileStorage};

pub use error::LogError;

/// Shared state for all handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    pub appender: Appender,
    pub storage: TileStorage,
    pub purl_type: Arc<str>,
    pub origin: Arc<str>,
    pub verifier: Arc<Ed25519Verifier>,
}

/// Configuration for creating a [`LogServer`].
pub struct LogServerConfig {
    /// Handle for submitting entries.
    pub appender: Appender,
    /// The store whose directory backs the read path.
    pub storage: TileStorage,
    /// The pURL type every entry must carry.
    pub purl_type: String,
    /// The log's own verifier, used to self-check published checkpoints.
    pub verifier: Ed25519Verifier,
}

/// The log HTTP server.
pub struct LogServer {
    router: Router,
}

impl LogServer {
    /// Create a server over the given appender and store.
    pub fn new(config: LogServerConfig) -> Self {
        let origin = config.verifier.name().to_string();
        let state = AppState {
            appender: config.appender,
            storage: config.storage,
            purl_type: config.purl_type.into(),
            origin: origin.into(),
            verifier: Arc::new(config.verifier),
        };
        let router = Router::new()
            .route("/add", post(handlers::add_entry))
            .route("/checkpoint", get(handlers::get_checkpoint))
            .route("/tile/{*path}", get(handlers::get_tile))
            .with_state(state);
        Self { router }
    }

    /// Return the inner [`Router`] (useful for testing with `tower::ServiceExt`).
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve on the given TCP address.
    pub async fn serve(self, addr: &str) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "log server listening");
        axum::serve(listener, self.router).await
    }

    /// Serve with graceful shutdown triggered by the given future.
    ///
    /// When `shutdown` completes, the server stops accepting new
    /// connections and waits for in-flight adds to finish.
    pub async fn serve_with_shutdown(
        self,
        addr: &str,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "log server listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
