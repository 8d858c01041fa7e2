// ABOUTME: Shared test harness wiring the full router over in-memory state
// ABOUTME: Request builders and seed helpers used across handler tests

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use cube_store::{DbState, FsBlobStore, MemoryTtlCache, Role};

use crate::state::AppState;

/// Keeps the in-memory state (and the blob tempdir) alive for a test.
pub(crate) struct TestEnv {
    pub state: AppState,
    blobs: TempDir,
}

impl TestEnv {
    pub fn path(&self) -> &Path {
        self.blobs.path()
    }
}

/// Full application router over a fresh in-memory database.
pub(crate) async fn test_app() -> (Router, TestEnv) {
    let pool = cube_store::test_utils::test_pool().await;
    let db = DbState::new(pool);
    let blobs = TempDir::new().unwrap();
    let state = AppState::new(
        db,
        Arc::new(MemoryTtlCache::new()),
        Arc::new(FsBlobStore::new(blobs.path())),
        Duration::from_secs(1800),
    );

    let app = Router::new()
        .nest("/api/v1/users", crate::create_users_router())
        .nest("/api/v1/products", crate::create_products_router())
        .nest("/api/v1/modules", crate::create_modules_router())
        .nest("/api/v1/materials", crate::create_materials_router())
        .nest("/api/v1/selections", crate::create_selections_router())
        .nest("/api/v1/downloads", crate::create_downloads_router())
        .with_state(state.clone());

    (app, TestEnv { state, blobs })
}

fn request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub(crate) fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    request("GET", uri, token, None)
}

pub(crate) fn delete(uri: &str, token: Option<&str>) -> Request<Body> {
    request("DELETE", uri, token, None)
}

pub(crate) fn post_json(uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    request("POST", uri, token, Some(body))
}

pub(crate) fn patch_json(uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    request("PATCH", uri, token, Some(body))
}

pub(crate) async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub(crate) async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Register a user through the API; returns (user id, session token).
pub(crate) async fn register_user(app: &Router, username: &str) -> (String, String) {
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/users/register",
            None,
            serde_json::json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": "hunter2hunter2"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    (
        body["data"]["user"]["id"].as_str().unwrap().to_string(),
        body["data"]["session"]["token"]
            .as_str()
            .unwrap()
            .to_string(),
    )
}

/// Register a user and elevate them to admin. Roles are read per request, so
/// the original session token immediately carries admin rights.
pub(crate) async fn register_admin(app: &Router, env: &TestEnv, username: &str) -> String {
    let (user_id, token) = register_user(app, username).await;
    env.state
        .db
        .users
        .set_role(&user_id, Role::Admin)
        .await
        .unwrap();
    token
}

pub(crate) async fn create_active_product(app: &Router, token: &str, spu: &str) -> String {
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/products",
            Some(token),
            serde_json::json!({
                "name": "Magic Cube Box",
                "spuCode": spu,
                "status": "active"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    body["data"]["id"].as_str().unwrap().to_string()
}

pub(crate) async fn create_module(
    app: &Router,
    token: &str,
    product_id: &str,
    name: &str,
    category: &str,
) -> String {
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/products/{product_id}/modules"),
            Some(token),
            serde_json::json!({ "name": name, "category": category }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    body["data"]["id"].as_str().unwrap().to_string()
}

async fn add_material(
    app: &Router,
    token: &str,
    module_id: &str,
    filename: &str,
    file_path: &str,
) -> String {
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/modules/{module_id}/materials"),
            Some(token),
            serde_json::json!({
                "filename": filename,
                "filePath": file_path,
                "fileSize": 64,
                "width": 512,
                "height": 512
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    body["data"]["id"].as_str().unwrap().to_string()
}

/// An active product with a Cover and a Sticker module, one material each.
pub(crate) struct SeededProduct {
    pub product_id: String,
    pub module_ids: Vec<String>,
    pub material_ids: Vec<String>,
    blob_paths: Vec<String>,
}

impl SeededProduct {
    /// Put bytes at the paths the seeded materials point to.
    pub fn write_blobs(&self, root: &Path) {
        for rel in &self.blob_paths {
            let path = root.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, b"png bytes").unwrap();
        }
    }
}

pub(crate) async fn seeded_product(app: &Router, token: &str, spu: &str) -> SeededProduct {
    let product_id = create_active_product(app, token, spu).await;
    let cover = create_module(app, token, &product_id, "Cover", "cover").await;
    let sticker = create_module(app, token, &product_id, "Sticker", "sticker").await;
    let front = add_material(app, token, &cover, "front.png", "cover/front.png").await;
    let shiny = add_material(app, token, &sticker, "shiny.png", "sticker/shiny.png").await;

    SeededProduct {
        product_id,
        module_ids: vec![cover, sticker],
        material_ids: vec![front, shiny],
        blob_paths: vec!["cover/front.png".to_string(), "sticker/shiny.png".to_string()],
    }
}

pub(crate) async fn start_selection(app: &Router, token: &str, product_id: &str) -> String {
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/products/{product_id}/selections"),
            Some(token),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    body["data"]["id"].as_str().unwrap().to_string()
}

pub(crate) async fn choose(
    app: &Router,
    token: &str,
    selection_id: &str,
    module_id: &str,
    material_id: &str,
) {
    let response = app
        .clone()
        .oneshot(patch_json(
            &format!("/api/v1/selections/{selection_id}"),
            Some(token),
            serde_json::json!({ "moduleId": module_id, "materialId": material_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Choose every seeded module's material and complete the selection.
pub(crate) async fn complete_selection(
    app: &Router,
    token: &str,
    selection_id: &str,
    seeded: &SeededProduct,
) {
    for (module_id, material_id) in seeded.module_ids.iter().zip(&seeded.material_ids) {
        choose(app, token, selection_id, module_id, material_id).await;
    }
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/selections/{selection_id}/complete"),
            Some(token),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Issue a download token for a completed selection; returns the relative URL.
pub(crate) async fn issue_download(app: &Router, token: &str, selection_id: &str) -> String {
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/selections/{selection_id}/download"),
            Some(token),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    body["data"]["downloadUrl"].as_str().unwrap().to_string()
}
