//! Lockstep API /v1: REST endpoints
pub mod handlers;
pub mod metrics;
pub mod middleware;

use axum::{
    routing::{get, post},
    Router,
};
use lockstep_core::DEFAULT_TIMEOUT_MS;
use metrics::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<Metrics>,
    /// Upper bound on any per-stage timeout a request may ask for
    pub timeout_ceiling: Duration,
}

impl AppState {
    pub fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            metrics: Arc::new(Metrics::new()?),
            timeout_ceiling: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        })
    }

    pub fn with_timeout_ceiling(mut self, ceiling: Duration) -> Self {
        self.timeout_ceiling = ceiling;
        self
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/v1/runs", post(handlers::create_run))
        .route("/v1/catalogs", get(handlers::list_catalogs))
        .route("/v1/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(axum::middleware::from_fn(middleware::log_requests))
        .layer(middleware::cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(
    addr: &str,
    timeout_ceiling: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_app(AppState::new()?.with_timeout_ceiling(timeout_ceiling));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Lockstep API listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
