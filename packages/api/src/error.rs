// ABOUTME: API error type mapping domain errors onto HTTP responses
// ABOUTME: Every error response carries a machine-readable code and a request id

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use cube_store::StorageError;

/// What a handler can fail with; `IntoResponse` renders the envelope
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),

    /// Wrap storage errors from the store library
    #[error("Storage error")]
    Storage(#[from] StorageError),
}

/// Error envelope shared by every failure path, panics included
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: ErrorDetail,
    #[serde(rename = "requestId")]
    request_id: String,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl ApiError {
    /// HTTP status plus the machine-readable code for the envelope
    fn to_status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::RateLimitExceeded { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED")
            }
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Storage(storage_error) => match storage_error {
                StorageError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                StorageError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                StorageError::InvalidState(_) => (StatusCode::CONFLICT, "INVALID_STATE"),
                StorageError::IncompleteSelection { .. } => {
                    (StatusCode::BAD_REQUEST, "INCOMPLETE_SELECTION")
                }
                StorageError::Expired => (StatusCode::GONE, "LINK_EXPIRED"),
                StorageError::Unavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE")
                }
                StorageError::Duplicate(_) => (StatusCode::CONFLICT, "DUPLICATE"),
                StorageError::Io(_)
                | StorageError::Database(_)
                | StorageError::Migration(_)
                | StorageError::Sqlx(_)
                | StorageError::Json(_)
                | StorageError::Archive(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            },
        }
    }

    /// Message safe to hand a client; internals stay generic
    fn to_user_message(&self) -> String {
        match self {
            ApiError::Validation(msg) => format!("Validation failed: {msg}"),
            ApiError::Unauthorized => "Authentication required".to_string(),
            ApiError::RateLimitExceeded { .. } => {
                "Too many requests. Please try again later".to_string()
            }
            ApiError::Internal(_) => "An internal server error occurred".to_string(),
            ApiError::Storage(storage_error) => match storage_error {
                StorageError::NotFound(_)
                | StorageError::Forbidden
                | StorageError::InvalidState(_)
                | StorageError::IncompleteSelection { .. }
                | StorageError::Expired
                | StorageError::Duplicate(_) => storage_error.to_string(),
                StorageError::Unavailable(_) => {
                    "A backing service is temporarily unavailable".to_string()
                }
                _ => "Data storage error".to_string(),
            },
        }
    }

    /// Structured payload attached to some errors
    fn to_details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::Storage(StorageError::IncompleteSelection { missing }) => {
                Some(json!({ "missingModules": missing }))
            }
            _ => None,
        }
    }

    fn is_internal(&self) -> bool {
        matches!(
            self,
            ApiError::Internal(_)
                | ApiError::Storage(
                    StorageError::Io(_)
                        | StorageError::Database(_)
                        | StorageError::Migration(_)
                        | StorageError::Sqlx(_)
                        | StorageError::Json(_)
                        | StorageError::Archive(_)
                        | StorageError::Unavailable(_)
                )
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();
        let (status_code, error_code) = self.to_status_and_code();

        // Internal failures are logged in full; the client sees only the code
        if self.is_internal() {
            match &self {
                ApiError::Internal(err) => {
                    error!(
                        request_id = %request_id,
                        error = %err,
                        "Internal server error occurred"
                    );
                }
                ApiError::Storage(storage_err) => {
                    error!(
                        request_id = %request_id,
                        storage_error = %storage_err,
                        "Storage system error"
                    );
                }
                _ => {}
            }
        } else {
            tracing::info!(
                request_id = %request_id,
                error_code = %error_code,
                error = %self,
                "API error response"
            );
        }

        let retry_after = match &self {
            ApiError::RateLimitExceeded { retry_after } => Some(*retry_after),
            _ => None,
        };

        let error_response = ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: error_code.to_string(),
                message: self.to_user_message(),
                retry_after,
                details: self.to_details(),
            },
            request_id,
        };

        let mut response = Json(error_response).into_response();
        *response.status_mut() = status_code;

        if let Some(seconds) = retry_after {
            if let Ok(value) = seconds.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        response
    }
}

/// Shorthand for handler signatures
pub type ApiResult<T> = Result<T, ApiError>;

/// Constructors used at call sites
impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }

    pub fn rate_limited(retry_after: u64) -> Self {
        Self::RateLimitExceeded { retry_after }
    }
}
