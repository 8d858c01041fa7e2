use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

use cube_api::AppState;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": unix_now(),
        "version": env!("CARGO_PKG_VERSION"),
        "service": "cube-server"
    }))
}

/// Readiness probe that also pings the database
pub async fn status_check(State(state): State<AppState>) -> Json<Value> {
    let database = match state.db.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            warn!("Database ping failed: {}", e);
            "unreachable"
        }
    };

    Json(json!({
        "status": if database == "ok" { "healthy" } else { "degraded" },
        "timestamp": unix_now(),
        "version": env!("CARGO_PKG_VERSION"),
        "service": "cube-server",
        "database": database
    }))
}
