//! Recall server binary.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recall::{api, config, AppState, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recall=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::init();
    tracing::info!(
        "Starting Recall server on {}:{}",
        config.server.host,
        config.server.port
    );

    // Initialize application state (migrations are fatal here; a missing
    // vector index is not - the service starts degraded)
    let state = AppState::new(config).await?;
    tracing::info!("Application state initialized");

    // Initialize startup time for uptime tracking
    api::status::init_startup_time();

    // Rebuild the vector index in the background if it is behind the
    // relational store
    let sync = state.sync.clone();
    tokio::spawn(async move {
        match sync.ensure_backfilled().await {
            Ok(report) if report.skipped => {}
            Ok(report) => {
                tracing::info!(synced_rows = report.synced_rows, "Startup backfill check done")
            }
            Err(e) => tracing::warn!(error = %e, "Startup backfill failed"),
        }
    });

    // Build router
    let app = Router::new()
        .merge(api::routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .expect("Invalid address");

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
