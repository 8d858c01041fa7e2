use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cube_api::AppState;
use cube_store::{DbState, FsBlobStore, MemoryTtlCache};

pub mod api;
pub mod config;
pub mod middleware;

pub use config::Config;

use middleware::{RateLimitConfig, RateLimitLayer};

/// Assemble the application router with all middleware applied.
pub fn create_app(
    state: AppState,
    config: &Config,
    rate_limit: RateLimitConfig,
) -> anyhow::Result<Router> {
    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    // Layers run top to bottom for a request: trace, panic recovery, timeout,
    // CORS, then rate limiting before anything reaches a handler.
    Ok(api::create_router(state)
        .layer(axum::middleware::from_fn(
            middleware::rate_limit::rate_limit_middleware,
        ))
        .layer(axum::Extension(RateLimitLayer::new(rate_limit)))
        .layer(cors)
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::create_panic_handler())
        .layer(TraceLayer::new_for_http()))
}

/// Load configuration, open storage, and serve until shutdown.
pub async fn run_server() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let db = DbState::init_with_path(Path::new(&config.db_path)).await?;
    std::fs::create_dir_all(&config.blob_root)?;

    let state = AppState::new(
        db,
        Arc::new(MemoryTtlCache::new()),
        Arc::new(FsBlobStore::new(config.blob_root.clone())),
        Duration::from_secs(config.download_ttl_secs),
    );

    let app = create_app(state, &config, RateLimitConfig::from_env())?;

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    info!("Server listening on http://{}", addr);
    info!("CORS origin: {}", config.cors_origin);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!("Failed to listen for SIGTERM: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server");
}
