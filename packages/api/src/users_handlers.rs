// ABOUTME: Account registration, login, and session endpoints

use axum::{extract::State, http::request::Parts, Json};
use serde::Serialize;
use tracing::info;

use cube_store::{LoginInput, RegisterInput, SessionToken, User};

use crate::auth::{bearer_token, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::response::{created, ok, ApiResponse};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AuthPayload {
    pub user: User,
    pub session: SessionToken,
}

fn validate_registration(input: &RegisterInput) -> Result<(), ApiError> {
    let username = input.username.trim();
    if username.len() < 3 || username.len() > 32 {
        return Err(ApiError::validation(
            "username must be between 3 and 32 characters",
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ApiError::validation(
            "username may only contain letters, digits, '-' and '_'",
        ));
    }
    if !input.email.contains('@') || input.email.len() > 255 {
        return Err(ApiError::validation("a valid email address is required"));
    }
    if input.password.len() < 8 {
        return Err(ApiError::validation(
            "password must be at least 8 characters",
        ));
    }
    Ok(())
}

/// Create an account and open a session
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> ApiResult<(axum::http::StatusCode, Json<ApiResponse<AuthPayload>>)> {
    validate_registration(&input)?;

    let user = state
        .db
        .users
        .register(input.username.trim(), input.email.trim(), &input.password)
        .await?;
    let session = state.db.users.create_session(&user.id).await?;

    info!("Registered user {}", user.username);
    Ok(created(AuthPayload { user, session }))
}

/// Exchange credentials for a session token
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> ApiResult<Json<ApiResponse<AuthPayload>>> {
    let user = state
        .db
        .users
        .verify_login(input.username.trim(), &input.password)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    let session = state.db.users.create_session(&user.id).await?;

    info!("User {} logged in", user.username);
    Ok(ok(AuthPayload { user, session }))
}

/// Current account details
pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<ApiResponse<User>>> {
    let user = state.db.users.get_user(&user.id).await?;
    Ok(ok(user))
}

/// Revoke the presented session token
pub async fn logout(
    State(state): State<AppState>,
    _user: AuthUser,
    parts: Parts,
) -> ApiResult<Json<ApiResponse<()>>> {
    if let Some(token) = bearer_token(&parts) {
        state.db.users.revoke_session(&token).await?;
    }
    Ok(ok(()))
}
