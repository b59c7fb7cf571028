//! HTTP server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::auth::Authorizer;
use crate::config::Config;
use crate::warehouse::{self, WarehouseStore};
use crate::{Error, Result};

#[derive(Clone)]
struct HealthState {
    authorizer: Arc<Authorizer>,
}

/// Build the full application router.
///
/// Every warehouse route is guarded by its own permission; `/health` is public.
pub fn create_router(
    store: Arc<WarehouseStore>,
    authorizer: Arc<Authorizer>,
    request_timeout: Duration,
) -> Router {
    let health = Router::new()
        .route("/health", get(health_handler))
        .with_state(HealthState {
            authorizer: Arc::clone(&authorizer),
        });

    warehouse::routes(&authorizer)
        .with_state(store)
        .merge(health)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}

async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let keys = state.authorizer.verifier().keys().current().map(|snapshot| {
        json!({
            "keys": snapshot.len(),
            "age_secs": snapshot.age().as_secs(),
            "generation": snapshot.generation(),
        })
    });

    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "jwks": keys,
    }))
}

/// Warehouse server
pub struct Server {
    config: Config,
    authorizer: Arc<Authorizer>,
    store: Arc<WarehouseStore>,
}

impl Server {
    /// Create a server with an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the auth configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        let authorizer = Arc::new(Authorizer::from_config(&config.auth)?);
        Ok(Self {
            config,
            authorizer,
            store: Arc::new(WarehouseStore::new()),
        })
    }

    /// Run until a shutdown signal arrives.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        // Warm the key cache; a failure here is retried on the first request.
        match self.authorizer.verifier().keys().refresh(None).await {
            Ok(snapshot) => info!(keys = snapshot.len(), "Signing keys loaded"),
            Err(e) => warn!(error = %e, "Initial JWKS fetch failed, will retry on demand"),
        }

        let app = create_router(
            Arc::clone(&self.store),
            Arc::clone(&self.authorizer),
            self.config.server.request_timeout,
        );

        let listener = TcpListener::bind(addr).await?;
        info!(
            address = %addr,
            issuer = %self.config.auth.issuer,
            audience = %self.config.auth.audience,
            "Warehouse server listening"
        );

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::broadcast::channel(1);
        let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown_tx));
        let mut server = tokio::spawn(async move { serve.await });

        tokio::select! {
            result = &mut server => return flatten(result),
            _ = shutdown_rx.recv() => {}
        }

        match tokio::time::timeout(self.config.server.shutdown_timeout, server).await {
            Ok(result) => flatten(result),
            Err(_) => {
                warn!(
                    timeout = ?self.config.server.shutdown_timeout,
                    "Graceful shutdown timed out, dropping open connections"
                );
                Ok(())
            }
        }
    }
}

fn flatten(
    result: std::result::Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    result
        .map_err(|e| Error::Internal(e.to_string()))?
        .map_err(Error::from)
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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
    let _ = shutdown_tx.send(());
}
