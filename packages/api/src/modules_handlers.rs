// ABOUTME: HTTP request handlers for material modules and their materials
// ABOUTME: All mutations resolve the owning product and gate on owner-or-admin

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use cube_store::{Material, MaterialCreateInput, MaterialModule, ModuleUpdateInput, Product};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::products_handlers::ensure_catalog_access;
use crate::response::{created, ok, ApiResponse};
use crate::state::AppState;

async fn owning_product(state: &AppState, module_id: &str) -> ApiResult<(MaterialModule, Product)> {
    let module = state.db.catalog.get_module(module_id).await?;
    let product = state.db.catalog.get_product(&module.product_id).await?;
    Ok((module, product))
}

pub async fn update_module(
    State(state): State<AppState>,
    Path(module_id): Path<String>,
    user: AuthUser,
    Json(input): Json<ModuleUpdateInput>,
) -> ApiResult<Json<ApiResponse<MaterialModule>>> {
    let (_, product) = owning_product(&state, &module_id).await?;
    ensure_catalog_access(&product, &user)?;

    let module = state.db.catalog.update_module(&module_id, input).await?;
    Ok(ok(module))
}

pub async fn delete_module(
    State(state): State<AppState>,
    Path(module_id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<ApiResponse<()>>> {
    let (_, product) = owning_product(&state, &module_id).await?;
    ensure_catalog_access(&product, &user)?;

    state.db.catalog.delete_module(&module_id).await?;
    Ok(ok(()))
}

#[derive(Debug, Deserialize)]
pub struct AddMaterialRequest {
    pub filename: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "fileSize")]
    pub file_size: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    #[serde(rename = "sortOrder")]
    pub sort_order: Option<i64>,
}

pub async fn add_material(
    State(state): State<AppState>,
    Path(module_id): Path<String>,
    user: AuthUser,
    Json(request): Json<AddMaterialRequest>,
) -> ApiResult<(axum::http::StatusCode, Json<ApiResponse<Material>>)> {
    let (_, product) = owning_product(&state, &module_id).await?;
    ensure_catalog_access(&product, &user)?;

    if request.filename.trim().is_empty() {
        return Err(ApiError::validation("material filename is required"));
    }
    if request.file_path.trim().is_empty() {
        return Err(ApiError::validation("material file path is required"));
    }
    if request.file_size < 0 {
        return Err(ApiError::validation("material file size cannot be negative"));
    }

    let material = state
        .db
        .catalog
        .add_material(
            &module_id,
            MaterialCreateInput {
                filename: request.filename.trim().to_string(),
                file_path: request.file_path.trim().to_string(),
                file_size: request.file_size,
                width: request.width,
                height: request.height,
                sort_order: request.sort_order,
            },
        )
        .await?;

    Ok(created(material))
}

pub async fn delete_material(
    State(state): State<AppState>,
    Path(material_id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<ApiResponse<()>>> {
    let material = state.db.catalog.get_material(&material_id).await?;
    let (_, product) = owning_product(&state, &material.module_id).await?;
    ensure_catalog_access(&product, &user)?;

    state.db.catalog.delete_material(&material_id).await?;
    Ok(ok(()))
}
