use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

use httpstats::config::AppConfig;
use httpstats::metrics::Registry;
use httpstats::middleware::HttpStats;
use httpstats::server::{self, AppState};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    // ── 1. Config ────────────────────────────────────────────────
    let cfg = match std::env::var("HTTPSTATS_CONFIG") {
        Ok(path) => AppConfig::load_from_file(&path).unwrap_or_else(|e| {
            tracing::error!(%path, error = %e, "config load failed");
            std::process::exit(1);
        }),
        Err(_) => AppConfig::default(),
    }
    .with_host_tag();

    // ── 2. Build shared state ────────────────────────────────────
    let registry = Registry::new();
    let stats = HttpStats::new(registry.clone(), cfg.tags.clone(), &cfg.stats)
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "invalid stats config");
            std::process::exit(1);
        });

    let state = Arc::new(AppState {
        registry,
        demo_max_delay: Duration::from_millis(cfg.demo_max_delay_ms),
    });

    // ── 3. Build routers ─────────────────────────────────────────
    let app = server::create_app_router(state.clone(), &stats);
    let metrics = server::create_metrics_router(state);

    // ── 4. Bind & serve ──────────────────────────────────────────
    let app_listener = tokio::net::TcpListener::bind(&cfg.listen)
        .await
        .expect("failed to bind application listener");
    let metrics_listener = tokio::net::TcpListener::bind(&cfg.metrics_listen)
        .await
        .expect("failed to bind metrics listener");

    tracing::info!(listen = %cfg.listen, "application server started");
    tracing::info!(listen = %cfg.metrics_listen, "metrics server started (GET /metrics)");

    let served = tokio::try_join!(
        axum::serve(app_listener, app).into_future(),
        axum::serve(metrics_listener, metrics).into_future(),
    );
    if let Err(e) = served {
        tracing::error!(error = %e, "server exited with error");
    }
}
