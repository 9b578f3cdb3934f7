//! Error-to-response mapping for the REST surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use courier_core::GatewayError;

/// Uniform error body: `{ "success": false, "error": <message> }`.
pub fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "error": message }))).into_response()
}

/// Map a gateway error onto the REST surface.
///
/// Validation failures are the caller's fault (400), operations that
/// require a session that is not there are a conflict with current state
/// (409), everything else is internal (500).
pub fn gateway_error(error: &GatewayError) -> Response {
    let status = match error {
        GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
        GatewayError::NotConnected => StatusCode::CONFLICT,
        GatewayError::Store(_) | GatewayError::Wire(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, &error.to_string())
}
