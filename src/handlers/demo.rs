use axum::extract::State;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::server::AppState;

use super::AppError;

// ─── GET /app ────────────────────────────────────────────────────
/// Sleeps for a random delay, then answers with a fixed greeting.

pub async fn hello(State(state): State<Arc<AppState>>) -> &'static str {
    let max_ms = state.demo_max_delay.as_millis() as u64;
    if max_ms > 0 {
        let delay = rand::thread_rng().gen_range(0..=max_ms);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    "Hello Stats"
}

// ─── GET /error ──────────────────────────────────────────────────
/// Always fails, so error statuses show up in the metrics.

pub async fn fail() -> Result<&'static str, AppError> {
    Err(AppError::Unavailable("Demo error".into()))
}
