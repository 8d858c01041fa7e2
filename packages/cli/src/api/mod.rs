use axum::{routing::get, Router};

use cube_api::AppState;

pub mod health;

/// All routes, versioned API nests plus the health endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/status", get(health::status_check))
        .nest("/api/v1/users", cube_api::create_users_router())
        .nest("/api/v1/products", cube_api::create_products_router())
        .nest("/api/v1/modules", cube_api::create_modules_router())
        .nest("/api/v1/materials", cube_api::create_materials_router())
        .nest("/api/v1/selections", cube_api::create_selections_router())
        .nest("/api/v1/downloads", cube_api::create_downloads_router())
        .with_state(state)
}
