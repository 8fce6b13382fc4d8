use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;

use crate::handlers;
use crate::metrics::Registry;
use crate::middleware::HttpStats;

/// Shared state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Registry the scrape endpoints read from.
    pub registry: Registry,

    /// Upper bound of the random delay injected by `GET /app`.
    pub demo_max_delay: Duration,
}

/// Instrumented demo application. Every route goes through `stats`.
pub fn create_app_router(state: Arc<AppState>, stats: &HttpStats) -> Router {
    Router::new()
        .route("/app", get(handlers::demo::hello))
        .route("/error", get(handlers::demo::fail))
        .with_state(state)
        .layer(stats.layer())
}

/// Scrape endpoints, served separately so scrapes are not counted.
pub fn create_metrics_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/metrics", get(handlers::metrics::snapshot_lines))
        .route("/metrics.json", get(handlers::metrics::snapshot_json))
        .with_state(state)
}
