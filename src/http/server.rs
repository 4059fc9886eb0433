//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the exposition and health handlers
//! - Wire up middleware (tracing, request timeout)
//! - Bind server to listener and stop on shutdown

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::lifecycle::Monitor;

/// Liveness endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
}

/// HTTP server exposing the collected metrics.
pub struct MetricsServer {
    router: Router,
}

impl MetricsServer {
    /// `request_timeout` bounds a whole exposition request, refresh included.
    pub fn new(monitor: Arc<Monitor>, metrics_path: &str, request_timeout: Duration) -> Self {
        let router = Self::build_router(AppState { monitor }, metrics_path, request_timeout);
        Self { router }
    }

    #[allow(deprecated)]
    fn build_router(state: AppState, metrics_path: &str, request_timeout: Duration) -> Router {
        Router::new()
            .route(metrics_path, get(metrics_handler))
            .route(HEALTH_PATH, get(health_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(TraceLayer::new_for_http())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` completes.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Metrics server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Metrics server stopped");
        Ok(())
    }
}

/// Refresh every upstream, then render the registry.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.monitor.gather().await {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to render metrics").into_response()
        }
    }
}

async fn health_handler() -> &'static str {
    "ok"
}
