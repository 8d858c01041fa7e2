// ABOUTME: HTTP request handlers for the selection lifecycle
// ABOUTME: Draft creation, choice editing, and the completion transition

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use cube_store::{ChoiceInput, Paginated, PaginationParams, Selection};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::response::{ok, ApiResponse};
use crate::state::AppState;

/// Open the caller's draft selection for a product, creating one if needed.
/// Responds 201 when a draft was created and 200 when an existing one was
/// returned.
pub async fn start(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    user: AuthUser,
) -> ApiResult<Response> {
    let (selection, created) = state
        .db
        .selections
        .find_or_create_draft(&user.id, &product_id)
        .await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, ok(selection)).into_response())
}

pub async fn list(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
    user: AuthUser,
) -> ApiResult<Json<ApiResponse<Paginated<Selection>>>> {
    let (limit, offset) = pagination.validate();
    let (selections, total) = state
        .db
        .selections
        .list_selections_paginated(&user.id, limit, offset)
        .await?;

    Ok(ok(Paginated::new(selections, &pagination, total)))
}

pub async fn get(
    State(state): State<AppState>,
    Path(selection_id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<ApiResponse<Selection>>> {
    let selection = state.db.selections.get_selection(&selection_id).await?;
    if selection.user_id != user.id && !user.is_admin() {
        return Err(cube_store::StorageError::Forbidden.into());
    }
    Ok(ok(selection))
}

pub async fn set_choice(
    State(state): State<AppState>,
    Path(selection_id): Path<String>,
    user: AuthUser,
    Json(choice): Json<ChoiceInput>,
) -> ApiResult<Json<ApiResponse<Selection>>> {
    if choice.module_id.trim().is_empty() || choice.material_id.trim().is_empty() {
        return Err(ApiError::validation(
            "moduleId and materialId are both required",
        ));
    }

    let selection = state
        .db
        .selections
        .set_choice(&selection_id, &user.id, &choice.module_id, &choice.material_id)
        .await?;

    Ok(ok(selection))
}

pub async fn remove_choice(
    State(state): State<AppState>,
    Path((selection_id, module_id)): Path<(String, String)>,
    user: AuthUser,
) -> ApiResult<Json<ApiResponse<Selection>>> {
    let selection = state
        .db
        .selections
        .remove_choice(&selection_id, &user.id, &module_id)
        .await?;

    Ok(ok(selection))
}

pub async fn complete(
    State(state): State<AppState>,
    Path(selection_id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<ApiResponse<Selection>>> {
    let selection = state
        .db
        .selections
        .complete(&selection_id, &user.id)
        .await?;

    Ok(ok(selection))
}
