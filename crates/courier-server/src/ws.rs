//! WebSocket endpoint: tenant subscription and event frame delivery.
//!
//! Protocol: the client sends `{"action": "join_tenant", "tenant_id": …}`
//! to enter a tenant's subscriber group and `{"action": "leave",
//! "tenant_id": …}` to leave one (omitting `tenant_id` leaves them all).
//! A connection may be subscribed to several tenants at once; every
//! joined tenant's frames arrive over the same socket. Event frames
//! flow server-to-client only.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use courier_core::TenantId;
use courier_runtime::SUBSCRIBER_BUFFER;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientCommand {
    JoinTenant {
        tenant_id: String,
    },
    Leave {
        #[serde(default)]
        tenant_id: Option<String>,
    },
}

/// `GET /ws` — upgrade to the subscriber protocol.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| client_loop(state, socket))
}

/// One connection's subscriber identity and tenant memberships.
struct Client {
    id: Uuid,
    tx: mpsc::Sender<Arc<String>>,
    memberships: HashSet<TenantId>,
}

async fn client_loop(state: AppState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    // The local sender keeps the channel open while no group holds a
    // clone, so `rx.recv()` below never resolves to `None`.
    let (tx, mut rx) = mpsc::channel(SUBSCRIBER_BUFFER);
    let mut client = Client {
        id: Uuid::now_v7(),
        tx,
        memberships: HashSet::new(),
    };

    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(frame) => {
                    if sink.send(Message::Text(frame.as_str().into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_command(&state, &mut sink, &mut client, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "websocket read failed");
                    break;
                }
            },
        }
    }

    state.manager.fanout().unsubscribe_all(client.id);
}

async fn handle_command(
    state: &AppState,
    sink: &mut (impl SinkExt<Message> + Unpin),
    client: &mut Client,
    text: &str,
) {
    let command = match serde_json::from_str::<ClientCommand>(text) {
        Ok(command) => command,
        Err(e) => {
            warn!(error = %e, "unparseable websocket command");
            send_frame(sink, "error", json!({ "error": "unrecognized command" })).await;
            return;
        }
    };
    match command {
        ClientCommand::JoinTenant { tenant_id } => {
            let tenant = match TenantId::new(&tenant_id) {
                Ok(tenant) => tenant,
                Err(e) => {
                    send_frame(sink, "error", json!({ "error": e.to_string() })).await;
                    return;
                }
            };
            // Re-joining a tenant must not register a second sender.
            if client.memberships.insert(tenant.clone()) {
                state
                    .manager
                    .fanout()
                    .subscribe_sender(client.id, &tenant, client.tx.clone());
            }
            send_frame(sink, "subscribed", json!({ "tenant_id": tenant })).await;
        }
        ClientCommand::Leave {
            tenant_id: Some(tenant_id),
        } => {
            let Ok(tenant) = TenantId::new(&tenant_id) else {
                send_frame(sink, "error", json!({ "error": "invalid tenant id" })).await;
                return;
            };
            if client.memberships.remove(&tenant) {
                state.manager.fanout().unsubscribe(&tenant, client.id);
                send_frame(sink, "unsubscribed", json!({ "tenant_id": tenant })).await;
            }
        }
        ClientCommand::Leave { tenant_id: None } => {
            if !client.memberships.is_empty() {
                client.memberships.clear();
                state.manager.fanout().unsubscribe_all(client.id);
                send_frame(sink, "unsubscribed", json!({})).await;
            }
        }
    }
}

async fn send_frame(
    sink: &mut (impl SinkExt<Message> + Unpin),
    event: &str,
    data: serde_json::Value,
) {
    let frame = json!({ "event": event, "data": data }).to_string();
    let _ = sink.send(Message::Text(frame.into())).await;
}
