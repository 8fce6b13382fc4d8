use axum::{extract::State, http::header, response::IntoResponse, Json};
use std::sync::Arc;

use crate::metrics::Snapshot;
use crate::server::AppState;

// ─── GET /metrics ────────────────────────────────────────────────
/// Current registry contents in line protocol, verbatim and uncached.

pub async fn snapshot_lines(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.registry.snapshot_lines(),
    )
}

// ─── GET /metrics.json ───────────────────────────────────────────
/// The same snapshot as JSON.

pub async fn snapshot_json(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(state.registry.snapshot())
}
