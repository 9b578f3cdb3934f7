//! REST handlers for the gateway surface.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use courier_core::{TenantId, SessionStatus};
use courier_runtime::ConnectOutcome;

use crate::error::{error_response, gateway_error};
use crate::state::AppState;

fn parse_tenant(raw: &str) -> Result<TenantId, Response> {
    TenantId::new(raw)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e.to_string()))
}

/// Query parameters of `GET /qr-code`.
#[derive(Deserialize)]
pub struct QrQuery {
    /// Tenant requesting a session.
    pub id: Option<String>,
}

/// `GET /qr-code?id=<tenant>`
///
/// Ensures a session attempt exists for the tenant and returns the QR
/// challenge to scan. Waits briefly for the wire to produce one; if the
/// challenge is not ready within the window the response still succeeds
/// and reports the in-flight status so the client can retry.
pub async fn qr_code(State(state): State<AppState>, Query(query): Query<QrQuery>) -> Response {
    let tenant = match parse_tenant(query.id.as_deref().unwrap_or_default()) {
        Ok(tenant) => tenant,
        Err(response) => return response,
    };

    match state.manager.ensure_connection(&tenant).await {
        Ok(ConnectOutcome::AlreadyConnected) => {
            let info = state.manager.connection_info(&tenant);
            Json(json!({
                "success": true,
                "tenant_id": tenant,
                "status": SessionStatus::Connected,
                "phone_number": info.phone_number,
            }))
            .into_response()
        }
        Ok(_) => match state.manager.wait_for_qr(&tenant).await {
            Some(qr_code) => Json(json!({
                "success": true,
                "tenant_id": tenant,
                "status": SessionStatus::QrPending,
                "qr_code": qr_code,
            }))
            .into_response(),
            None => {
                let info = state.manager.connection_info(&tenant);
                let mut body = json!({
                    "success": true,
                    "tenant_id": tenant,
                    "status": info.status,
                    "message": "qr code not generated yet, retry shortly",
                });
                if let Some(phone) = info.phone_number {
                    body["phone_number"] = json!(phone);
                }
                Json(body).into_response()
            }
        },
        Err(e) => gateway_error(&e),
    }
}

/// Body of `POST /send-message`.
#[derive(Deserialize)]
pub struct SendMessageRequest {
    /// Sending tenant.
    #[serde(default)]
    pub tenant_id: String,
    /// Recipient phone number, any human formatting accepted.
    #[serde(default)]
    pub phone: String,
    /// Text to send.
    #[serde(default)]
    pub message: String,
}

/// `POST /send-message`
pub async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendMessageRequest>,
) -> Response {
    let tenant = match parse_tenant(&request.tenant_id) {
        Ok(tenant) => tenant,
        Err(response) => return response,
    };
    let digits = request.phone.chars().filter(char::is_ascii_digit).count();
    if !(10..=15).contains(&digits) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "phone must contain 10 to 15 digits",
        );
    }
    if request.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "message must not be empty");
    }

    match state
        .manager
        .send_message(&tenant, &request.phone, &request.message)
        .await
    {
        Ok(chat) => Json(json!({ "success": true, "chat": chat })).into_response(),
        Err(e) => gateway_error(&e),
    }
}

/// `GET /status/{tenant_id}`
///
/// Unknown tenants read as `disconnected`; status queries never 404.
pub async fn status(State(state): State<AppState>, Path(tenant_id): Path<String>) -> Response {
    let tenant = match parse_tenant(&tenant_id) {
        Ok(tenant) => tenant,
        Err(response) => return response,
    };
    let info = state.manager.connection_info(&tenant);
    let mut body = json!({
        "success": true,
        "tenant_id": tenant,
        "status": info.status,
        "connected": info.status.is_connected(),
    });
    if let Some(phone) = info.phone_number {
        body["phone_number"] = json!(phone);
    }
    Json(body).into_response()
}

/// `POST /disconnect/{tenant_id}`
pub async fn disconnect(State(state): State<AppState>, Path(tenant_id): Path<String>) -> Response {
    let tenant = match parse_tenant(&tenant_id) {
        Ok(tenant) => tenant,
        Err(response) => return response,
    };
    info!(tenant = %tenant, "disconnect requested");
    match state.manager.disconnect(&tenant).await {
        Ok(()) => Json(json!({
            "success": true,
            "tenant_id": tenant,
            "status": SessionStatus::Disconnected,
        }))
        .into_response(),
        Err(e) => gateway_error(&e),
    }
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Response {
    let connected = state.manager.registry().connected_tenants();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_connections": connected.len(),
    }))
    .into_response()
}
