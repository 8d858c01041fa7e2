// ABOUTME: HTTP API layer for the Magic Cube store providing REST endpoints and routing
// ABOUTME: Integration layer over the cube-store domain package

use axum::{
    routing::{delete, get, patch, post},
    Router,
};

pub mod auth;
pub mod downloads_handlers;
pub mod error;
pub mod modules_handlers;
pub mod products_handlers;
pub mod response;
pub mod selections_handlers;
pub mod state;
pub mod users_handlers;

#[cfg(test)]
pub(crate) mod testing;

pub use state::AppState;

/// Creates the users API router
pub fn create_users_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(users_handlers::register))
        .route("/login", post(users_handlers::login))
        .route("/logout", post(users_handlers::logout))
        .route("/me", get(users_handlers::me))
}

/// Creates the products API router
pub fn create_products_router() -> Router<AppState> {
    Router::new()
        .route("/", get(products_handlers::list_products))
        .route("/", post(products_handlers::create_product))
        .route("/{id}", get(products_handlers::get_product))
        .route("/{id}", patch(products_handlers::update_product))
        .route("/{id}", delete(products_handlers::delete_product))
        .route("/{id}/modules", post(products_handlers::create_module))
        .route("/{id}/selections", post(selections_handlers::start))
}

/// Creates the modules API router
pub fn create_modules_router() -> Router<AppState> {
    Router::new()
        .route("/{id}", patch(modules_handlers::update_module))
        .route("/{id}", delete(modules_handlers::delete_module))
        .route("/{id}/materials", post(modules_handlers::add_material))
}

/// Creates the materials API router
pub fn create_materials_router() -> Router<AppState> {
    Router::new().route("/{id}", delete(modules_handlers::delete_material))
}

/// Creates the selections API router
pub fn create_selections_router() -> Router<AppState> {
    Router::new()
        .route("/", get(selections_handlers::list))
        .route("/{id}", get(selections_handlers::get))
        .route("/{id}", patch(selections_handlers::set_choice))
        .route(
            "/{id}/modules/{module_id}",
            delete(selections_handlers::remove_choice),
        )
        .route("/{id}/complete", post(selections_handlers::complete))
        .route("/{id}/download", post(downloads_handlers::issue))
}

/// Creates the downloads API router. Static segments win over the token
/// capture, so `/history` and `/stats` never collide with redemption.
pub fn create_downloads_router() -> Router<AppState> {
    Router::new()
        .route("/history", get(downloads_handlers::history))
        .route("/stats", get(downloads_handlers::stats))
        .route("/{token}", get(downloads_handlers::redeem))
}
