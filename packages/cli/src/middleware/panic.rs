use std::any::Any;

use axum::response::{IntoResponse, Response};
use tower_http::catch_panic::CatchPanicLayer;
use tracing::error;

use cube_api::error::ApiError;

/// Layer that converts handler panics into the standard error envelope.
pub fn create_panic_handler() -> CatchPanicLayer<fn(Box<dyn Any + Send + 'static>) -> Response> {
    CatchPanicLayer::custom(handle_panic)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| err.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("opaque panic payload");

    error!(panic = %detail, "request handler panicked");

    // The envelope carries its own request id; the panic text stays in the log.
    ApiError::internal(anyhow::anyhow!("panicked while handling the request")).into_response()
}
