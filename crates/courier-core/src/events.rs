//! Gateway event vocabulary.
//!
//! One [`GatewayEvent`] is published per state transition or relayed
//! message. Every event is delivered two ways:
//!
//! - **WebSocket subscribers** of the tenant's group, framed as
//!   `{ "event": <name>, "data": <payload> }`.
//! - **Backend webhook**, framed as `{ "event": <name>, ...payload }`.
//!
//! Payload field names mirror the backend's existing contract: top-level
//! fields are snake_case, the chat/customer objects inside message events
//! are camelCase.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ids::TenantId;
use crate::status::SessionStatus;

/// Media classification of a relayed message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Plain or extended text.
    Text,
    /// Image, relayed as caption plus optional thumbnail.
    Image,
    /// Video, relayed as caption plus optional thumbnail.
    Video,
    /// Audio or voice note (placeholder content).
    Audio,
    /// Document attachment (caption or placeholder).
    Document,
    /// Shared location (coordinates in media fields).
    Location,
}

/// Message direction relative to the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Inbound from the messaging network.
    In,
    /// Outbound, sent through the gateway.
    Out,
}

/// Optional media companions of a chat message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFields {
    /// Inline image thumbnail as a data URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    /// Inline video thumbnail as a data URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_base64: Option<String>,
    /// Location latitude, stringified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_lat: Option<String>,
    /// Location longitude, stringified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_long: Option<String>,
}

impl MediaFields {
    /// True when no media companion is present.
    pub fn is_empty(&self) -> bool {
        self.image_base64.is_none()
            && self.video_base64.is_none()
            && self.location_lat.is_none()
            && self.location_long.is_none()
    }
}

/// Chat record embedded in message events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    /// Synthetic record id (epoch milliseconds at publish time).
    pub id: i64,
    /// Protocol-assigned message id, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Text content or media placeholder.
    pub body: String,
    /// Inbound or outbound.
    pub direction: Direction,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// RFC 3339 creation timestamp.
    pub created: String,
    /// Media classification.
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Media companions, flattened into the record.
    #[serde(flatten)]
    pub media: MediaFields,
}

impl ChatRecord {
    /// Build a record stamped with the current time.
    pub fn now(
        tenant_id: TenantId,
        message_id: Option<String>,
        body: String,
        direction: Direction,
        message_type: MessageType,
        media: MediaFields,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: now.timestamp_millis(),
            message_id,
            body,
            direction,
            tenant_id,
            created: now.to_rfc3339(),
            message_type,
            media,
        }
    }

    /// Build a record whose `created` comes from a wire timestamp
    /// (epoch seconds). Used for inbound messages, which carry the time
    /// they were sent rather than the time the gateway relayed them.
    pub fn at(
        tenant_id: TenantId,
        message_id: Option<String>,
        body: String,
        direction: Direction,
        message_type: MessageType,
        media: MediaFields,
        epoch_seconds: i64,
    ) -> Self {
        let created = chrono::DateTime::from_timestamp(epoch_seconds, 0)
            .unwrap_or_else(Utc::now)
            .to_rfc3339();
        Self {
            id: Utc::now().timestamp_millis(),
            message_id,
            body,
            direction,
            tenant_id,
            created,
            message_type,
            media,
        }
    }
}

/// Customer reference embedded in message events.
///
/// `id` is only present when the backend webhook response resolved the
/// sender to a known customer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomerRef {
    /// Backend-resolved customer identifier, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Push name or a phone-derived fallback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Sender/recipient phone number (digits only).
    pub phone: String,
}

/// Events fanned out to subscribers and forwarded to the backend.
#[derive(Clone, Debug, PartialEq)]
pub enum GatewayEvent {
    /// A QR challenge is ready to be scanned.
    QrCodeGenerated {
        /// Owning tenant.
        tenant_id: TenantId,
        /// Rendered challenge payload (data URL).
        qr_code: String,
    },
    /// The session's connection status changed.
    ConnectionStatus {
        /// Owning tenant.
        tenant_id: TenantId,
        /// New status.
        status: SessionStatus,
        /// Protocol-assigned phone number, present when connected.
        phone_number: Option<String>,
    },
    /// Session creation failed.
    ConnectionError {
        /// Owning tenant.
        tenant_id: TenantId,
        /// Failure description.
        error: String,
    },
    /// An inbound message was relayed to the backend.
    MessageReceived {
        /// Owning tenant.
        tenant_id: TenantId,
        /// The relayed chat record.
        chat: ChatRecord,
        /// Sender, possibly enriched with a backend customer id.
        customer: CustomerRef,
    },
    /// An outbound message was sent through the gateway.
    MessageSent {
        /// Owning tenant.
        tenant_id: TenantId,
        /// The sent chat record.
        chat: ChatRecord,
        /// Recipient reference (normalized phone).
        customer: CustomerRef,
    },
}

impl GatewayEvent {
    /// Wire name of the event, shared by WebSocket frames and webhooks.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::QrCodeGenerated { .. } => "qr_code_generated",
            Self::ConnectionStatus { .. } => "connection_status",
            Self::ConnectionError { .. } => "connection_error",
            Self::MessageReceived { .. } => "message_received",
            Self::MessageSent { .. } => "message_sent",
        }
    }

    /// Tenant whose subscriber group receives this event.
    pub fn tenant_id(&self) -> &TenantId {
        match self {
            Self::QrCodeGenerated { tenant_id, .. }
            | Self::ConnectionStatus { tenant_id, .. }
            | Self::ConnectionError { tenant_id, .. }
            | Self::MessageReceived { tenant_id, .. }
            | Self::MessageSent { tenant_id, .. } => tenant_id,
        }
    }

    /// JSON payload (without the event name envelope).
    pub fn payload(&self) -> Value {
        match self {
            Self::QrCodeGenerated { tenant_id, qr_code } => json!({
                "tenant_id": tenant_id,
                "qr_code": qr_code,
                "status": "qr_generated",
            }),
            Self::ConnectionStatus {
                tenant_id,
                status,
                phone_number,
            } => {
                let mut payload = json!({
                    "tenant_id": tenant_id,
                    "status": status,
                    "connected": status.is_connected(),
                });
                if let Some(phone) = phone_number {
                    payload["phone_number"] = json!(phone);
                }
                payload
            }
            Self::ConnectionError { tenant_id, error } => json!({
                "tenant_id": tenant_id,
                "error": error,
            }),
            Self::MessageReceived {
                tenant_id,
                chat,
                customer,
            } => json!({
                "success": true,
                "chat": chat,
                "customer": customer,
                "company": { "id": tenant_id },
            }),
            Self::MessageSent {
                tenant_id: _,
                chat,
                customer,
            } => json!({
                "success": true,
                "chat": chat,
                "customer": customer,
            }),
        }
    }

    /// WebSocket frame: `{ "event": <name>, "data": <payload> }`.
    pub fn to_frame(&self) -> Value {
        json!({ "event": self.event_name(), "data": self.payload() })
    }
}
