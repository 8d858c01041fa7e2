// ABOUTME: HTTP request handlers for the product catalog
// ABOUTME: Public browsing plus owner-or-admin catalog management

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use cube_store::pagination::DEFAULT_PAGE_SIZE;
use cube_store::{
    MaterialModule, ModuleCreateInput, Paginated, PaginationParams, Product, ProductCreateInput,
    ProductStatus, ProductUpdateInput,
};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::response::{created, ok, ApiResponse};
use crate::state::AppState;

/// Owner-or-admin gate shared by the catalog mutation endpoints
pub(crate) fn ensure_catalog_access(product: &Product, user: &AuthUser) -> Result<(), ApiError> {
    if user.is_admin() || product.created_by == user.id {
        Ok(())
    } else {
        Err(cube_store::StorageError::Forbidden.into())
    }
}

#[derive(Debug, Deserialize)]
pub struct ProductListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub modules: Vec<MaterialModule>,
}

/// List active products, optionally filtered by name or SPU code
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> ApiResult<Json<ApiResponse<Paginated<Product>>>> {
    let pagination = PaginationParams {
        page: query.page.unwrap_or(1),
        limit: query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
    };
    let (limit, offset) = pagination.validate();

    let (products, total) = state
        .db
        .catalog
        .list_products_paginated(true, query.search.as_deref(), limit, offset)
        .await?;

    Ok(ok(Paginated::new(products, &pagination, total)))
}

/// Product detail with its active modules and their materials.
///
/// Draft products are only visible to their owner or an admin; a successful
/// view bumps the product's view counter.
pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    viewer: Option<AuthUser>,
) -> ApiResult<Json<ApiResponse<ProductDetail>>> {
    let mut product = state.db.catalog.get_product(&product_id).await?;

    if product.status == ProductStatus::Draft {
        let allowed = viewer
            .as_ref()
            .map(|u| u.is_admin() || product.created_by == u.id)
            .unwrap_or(false);
        if !allowed {
            return Err(cube_store::StorageError::NotFound("product").into());
        }
    }

    state.db.catalog.increment_view_count(&product_id).await?;
    product.view_count += 1;

    let modules = state.db.catalog.list_modules(&product_id, true).await?;

    Ok(ok(ProductDetail { product, modules }))
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(rename = "spuCode")]
    pub spu_code: String,
    pub description: Option<String>,
    pub style: Option<String>,
    pub demographic: Option<String>,
    pub status: Option<ProductStatus>,
}

pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateProductRequest>,
) -> ApiResult<(axum::http::StatusCode, Json<ApiResponse<Product>>)> {
    let name = request.name.trim();
    if name.is_empty() || name.len() > 120 {
        return Err(ApiError::validation(
            "product name must be between 1 and 120 characters",
        ));
    }
    let spu_code = request.spu_code.trim();
    if spu_code.is_empty() || spu_code.len() > 64 {
        return Err(ApiError::validation(
            "SPU code must be between 1 and 64 characters",
        ));
    }

    info!("Creating product '{}' ({})", name, spu_code);

    let product = state
        .db
        .catalog
        .create_product(
            ProductCreateInput {
                name: name.to_string(),
                spu_code: spu_code.to_string(),
                description: request.description,
                style: request.style,
                demographic: request.demographic,
                status: request.status,
            },
            &user.id,
        )
        .await?;

    Ok(created(product))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    user: AuthUser,
    Json(input): Json<ProductUpdateInput>,
) -> ApiResult<Json<ApiResponse<Product>>> {
    let product = state.db.catalog.get_product(&product_id).await?;
    ensure_catalog_access(&product, &user)?;

    let product = state.db.catalog.update_product(&product_id, input).await?;
    Ok(ok(product))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<ApiResponse<()>>> {
    let product = state.db.catalog.get_product(&product_id).await?;
    ensure_catalog_access(&product, &user)?;

    info!("Deleting product {}", product_id);
    state.db.catalog.delete_product(&product_id).await?;
    Ok(ok(()))
}

#[derive(Debug, Deserialize)]
pub struct CreateModuleRequest {
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    #[serde(rename = "sortOrder")]
    pub sort_order: Option<i64>,
}

pub async fn create_module(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    user: AuthUser,
    Json(request): Json<CreateModuleRequest>,
) -> ApiResult<(axum::http::StatusCode, Json<ApiResponse<MaterialModule>>)> {
    let product = state.db.catalog.get_product(&product_id).await?;
    ensure_catalog_access(&product, &user)?;

    if request.name.trim().is_empty() {
        return Err(ApiError::validation("module name is required"));
    }
    if request.category.trim().is_empty() {
        return Err(ApiError::validation("module category is required"));
    }

    let module = state
        .db
        .catalog
        .create_module(
            &product_id,
            ModuleCreateInput {
                name: request.name.trim().to_string(),
                category: request.category.trim().to_string(),
                description: request.description,
                sort_order: request.sort_order,
                status: None,
            },
        )
        .await?;

    Ok(created(module))
}
