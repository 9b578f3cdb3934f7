//! Message relay: outbound sends and inbound webhook-then-broadcast.

use std::sync::Arc;

use tracing::{debug, info, warn};

use courier_core::events::{ChatRecord, CustomerRef, Direction, MessageType};
use courier_core::{GatewayError, GatewayEvent, MediaFields, TenantId};
use courier_wire::address::{is_user_jid, normalize_phone, phone_from_jid, to_jid};
use courier_wire::InboundMessage;

use crate::lifecycle::LifecycleManager;

impl LifecycleManager {
    /// Send a text message through the tenant's session.
    ///
    /// The recipient phone is normalized with the configured country code
    /// before being rendered as a user JID. Requires a `connected`
    /// session; the returned record carries the wire-assigned message id.
    pub async fn send_message(
        self: &Arc<Self>,
        tenant: &TenantId,
        phone: &str,
        message: &str,
    ) -> Result<ChatRecord, GatewayError> {
        let session = self
            .registry()
            .connected_session(tenant)
            .ok_or(GatewayError::NotConnected)?;
        let country_code = &self.gateway_settings().default_country_code;
        let normalized = normalize_phone(phone, country_code);
        let jid = to_jid(phone, country_code);

        let message_id = session.send_text(&jid, message).await?;
        info!(tenant = %tenant, phone = %normalized, message_id = %message_id, "message sent");

        let chat = ChatRecord::now(
            tenant.clone(),
            Some(message_id),
            message.to_string(),
            Direction::Out,
            MessageType::Text,
            MediaFields::default(),
        );
        let event = GatewayEvent::MessageSent {
            tenant_id: tenant.clone(),
            chat: chat.clone(),
            customer: CustomerRef {
                id: None,
                name: None,
                phone: normalized,
            },
        };
        self.fanout().publish(&event);
        self.notify_backend("message_sent", event.payload());
        Ok(chat)
    }

    /// Relay a batch of inbound messages.
    ///
    /// Own, broadcast, and non-user-chat messages are dropped. Senders
    /// without a push name get a phone-derived fallback. For each relayed
    /// message the backend webhook is delivered first — its response may
    /// resolve the sender to a customer id, which enriches the event
    /// broadcast to subscribers. Read receipts are best-effort and sent
    /// once per batch.
    pub(crate) async fn relay_inbound(self: &Arc<Self>, tenant: &TenantId, batch: Vec<InboundMessage>) {
        let mut relayed_ids = Vec::new();
        for message in batch {
            if message.from_me || message.broadcast || !is_user_jid(&message.chat_jid) {
                debug!(tenant = %tenant, chat = %message.chat_jid, "skipping non-relayable message");
                continue;
            }
            let Some(phone) = phone_from_jid(&message.chat_jid) else {
                continue;
            };

            // Inbound records keep the time the message was sent.
            let chat = ChatRecord::at(
                tenant.clone(),
                Some(message.id.clone()),
                message.content.body(),
                Direction::In,
                message.content.message_type(),
                message.content.media(),
                message.timestamp,
            );
            let name = message
                .push_name
                .clone()
                .unwrap_or_else(|| format!("WA {phone}"));
            let mut customer = CustomerRef {
                id: None,
                name: Some(name),
                phone,
            };

            // Backend first: its response may identify the sender.
            let event = GatewayEvent::MessageReceived {
                tenant_id: tenant.clone(),
                chat: chat.clone(),
                customer: customer.clone(),
            };
            let response = self.notifier().notify("message_received", event.payload()).await;
            if let Some(id) = response
                .as_ref()
                .and_then(|body| body.get("customer_id"))
                .filter(|id| !id.is_null())
            {
                customer.id = Some(id.clone());
            }

            let enriched = GatewayEvent::MessageReceived {
                tenant_id: tenant.clone(),
                chat,
                customer,
            };
            self.fanout().publish(&enriched);
            relayed_ids.push(message.id);
        }

        if relayed_ids.is_empty() {
            return;
        }
        if let Some(session) = self.registry().connected_session(tenant) {
            if let Err(e) = session.ack(&relayed_ids).await {
                warn!(tenant = %tenant, error = %e, "read receipt failed");
            }
        }
    }
}
