//! HTTP server for the Prometheus metrics endpoint.

use crate::state::MetricsSource;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Content type of the Prometheus text exposition format.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Errors that can occur during metrics server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    #[error("server error: {0}")]
    Server(String),
}

/// Configuration for the metrics server.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    /// Address to bind the server to.
    pub bind_addr: SocketAddr,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self::with_port(3010)
    }
}

impl MetricsServerConfig {
    /// Creates a config listening on all interfaces at `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], port).into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// HTTP server exposing `GET /metrics` behind the readiness gate.
pub struct MetricsServer<S: MetricsSource> {
    config: MetricsServerConfig,
    state: Arc<RwLock<S>>,
}

impl<S: MetricsSource> MetricsServer<S> {
    /// Creates a new metrics server over shared state.
    pub fn new(config: MetricsServerConfig, state: Arc<RwLock<S>>) -> Self {
        Self { config, state }
    }

    /// Builds the router without binding a socket.
    pub fn router(&self) -> Router {
        router(Arc::clone(&self.state))
    }

    /// Starts the HTTP server.
    ///
    /// This method runs the server until it is shut down.
    pub async fn run(self) -> Result<(), ServerError> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!(
            addr = %self.config.bind_addr,
            "Metrics server listening"
        );

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;

        Ok(())
    }
}

/// Router with the single metrics route.
pub fn router<S: MetricsSource>(state: Arc<RwLock<S>>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler::<S>))
        .with_state(state)
}

/// Handler for the /metrics endpoint.
///
/// Readiness and gauges are read under the same guard.
async fn metrics_handler<S: MetricsSource>(State(state): State<Arc<RwLock<S>>>) -> Response {
    let state = state.read().await;

    if !state.is_ready() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    match state.encode() {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
            output,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}
