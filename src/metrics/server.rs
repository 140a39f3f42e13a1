//! HTTP exporter for a scanning session.
//!
//! Serves the Prometheus registry on `/metrics`, the session state on
//! `/health` and the latest snapshot as JSON on `/status`.

use crate::metrics::{MetricsRegistry, MetricsSnapshot};
use crate::session::SessionState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

/// Errors that can occur during metrics server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    /// The server stopped with an error.
    #[error("server error: {0}")]
    Server(String),
}

/// Configuration for the metrics server.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    /// Address to bind the server to. Loopback unless set explicitly.
    pub bind_addr: SocketAddr,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self::with_port(9100)
    }
}

impl MetricsServerConfig {
    /// Loopback config on `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], port).into(),
        }
    }
}

/// Registry plus the last snapshot pushed by the session owner.
pub struct MetricsState {
    registry: MetricsRegistry,
    latest: std::sync::Mutex<MetricsSnapshot>,
}

impl MetricsState {
    /// Records `snapshot` and updates the registry from it.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.registry.update(snapshot);
        *crate::sync::lock(&self.latest) = snapshot.clone();
    }

    /// The last snapshot pushed.
    pub fn latest(&self) -> MetricsSnapshot {
        crate::sync::lock(&self.latest).clone()
    }
}

type SharedState = Arc<RwLock<MetricsState>>;

/// HTTP server exposing `/metrics`, `/health` and `/status`.
pub struct MetricsServer {
    config: MetricsServerConfig,
    state: SharedState,
}

impl MetricsServer {
    /// Server exporting `registry`.
    pub fn new(config: MetricsServerConfig, registry: MetricsRegistry) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(MetricsState {
                registry,
                latest: std::sync::Mutex::new(MetricsSnapshot::default()),
            })),
        }
    }

    /// Shared state for pushing snapshots while the server runs.
    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    /// Serves until `shutdown` is cancelled or the listener fails.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        let app = router(self.state);
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "metrics server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;
        tracing::debug!("metrics server stopped");
        Ok(())
    }
}

fn router(state: SharedState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn metrics_handler(State(state): State<SharedState>) -> Response {
    let state = state.read().await;

    match state.registry.encode() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {e}"),
        )
            .into_response(),
    }
}

/// 200 with the state name once a session has reported, 503 before that or
/// after it closed.
async fn health_handler(State(state): State<SharedState>) -> Response {
    match state.read().await.latest().state {
        None | Some(SessionState::Closed) => {
            (StatusCode::SERVICE_UNAVAILABLE, "closed").into_response()
        }
        Some(session) => (StatusCode::OK, session.to_string()).into_response(),
    }
}

async fn status_handler(State(state): State<SharedState>) -> Response {
    Json(state.read().await.latest()).into_response()
}
