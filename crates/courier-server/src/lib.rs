//! # courier-server
//!
//! HTTP and WebSocket surface for the Courier gateway.
//!
//! Routes:
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /qr-code?id=` | Start/join a session attempt, return the QR challenge |
//! | `POST /send-message` | Send a text through a connected session |
//! | `GET /status/{tenant_id}` | Connection status snapshot |
//! | `POST /disconnect/{tenant_id}` | Tear down the session and purge credentials |
//! | `GET /health` | Liveness plus active connection count |
//! | `GET /ws` | Subscriber protocol (`join_tenant` / `leave`) |

#![deny(unsafe_code)]

pub mod error;
pub mod handlers;
pub mod state;
pub mod ws;

pub use state::AppState;

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Assemble the gateway router.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/qr-code", get(handlers::qr_code))
        .route("/send-message", post(handlers::send_message))
        .route("/status/{tenant_id}", get(handlers::status))
        .route("/disconnect/{tenant_id}", post(handlers::disconnect))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until interrupted.
pub async fn serve(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "courier gateway listening");
    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
