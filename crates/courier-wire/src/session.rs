//! Connector/session traits and the wire event stream.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use tokio::sync::mpsc;

use courier_core::events::{MediaFields, MessageType};
use courier_core::{TenantId, WireError};
use courier_store::Credentials;

/// Close status code the wire uses to signal a remote logout.
pub const CLOSE_STATUS_LOGGED_OUT: u16 = 401;

/// Close-message marker for an exhausted QR challenge sequence.
///
/// The protocol client regenerates a QR challenge a fixed number of times;
/// when the sequence ends unscanned it closes with this message.
pub const QR_ATTEMPTS_ENDED_MARKER: &str = "QR refs attempts ended";

/// Error detail attached to a connection-close event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseFrame {
    /// Protocol status code, when the close carried one.
    pub status_code: Option<u16>,
    /// Human-readable close reason.
    pub message: String,
}

/// Events emitted by one live protocol session.
///
/// Delivered in wire order over the session's mpsc stream; the stream ends
/// after `Closed`.
#[derive(Clone, Debug)]
pub enum WireEvent {
    /// A new QR challenge; supersedes any earlier challenge.
    Qr {
        /// Raw challenge token to render for scanning.
        challenge: String,
    },
    /// The session authenticated and is fully open.
    Open {
        /// Protocol-assigned identity (`<digits>:<device>@<domain>`).
        identity: String,
    },
    /// The connection closed. `None` means a clean local close.
    Closed {
        /// Close detail used for disconnect classification.
        error: Option<CloseFrame>,
    },
    /// A batch of inbound messages.
    Messages(Vec<InboundMessage>),
    /// The protocol rotated its credential material; persist it.
    CredentialsUpdate(Credentials),
}

/// One inbound message as surfaced by the protocol client.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    /// Protocol-assigned message id.
    pub id: String,
    /// JID of the chat the message arrived in.
    pub chat_jid: String,
    /// Authored by this gateway's own session.
    pub from_me: bool,
    /// Broadcast-channel message (status updates etc.).
    pub broadcast: bool,
    /// Sender's display name, when the wire carried one.
    pub push_name: Option<String>,
    /// Message timestamp (epoch seconds).
    pub timestamp: i64,
    /// Classified content.
    pub content: MessageContent,
}

/// Classified content of an inbound message.
#[derive(Clone, Debug)]
pub enum MessageContent {
    /// Plain or extended text.
    Text(String),
    /// Image with optional caption and JPEG thumbnail bytes.
    Image {
        /// Caption, if present.
        caption: Option<String>,
        /// Inline JPEG thumbnail.
        thumbnail: Option<Vec<u8>>,
    },
    /// Video with optional caption and JPEG thumbnail bytes.
    Video {
        /// Caption, if present.
        caption: Option<String>,
        /// Inline JPEG thumbnail.
        thumbnail: Option<Vec<u8>>,
    },
    /// Audio or voice note.
    Audio,
    /// Document with optional caption.
    Document {
        /// Caption, if present.
        caption: Option<String>,
    },
    /// Shared location.
    Location {
        /// Degrees latitude.
        latitude: f64,
        /// Degrees longitude.
        longitude: f64,
    },
    /// Anything the gateway does not classify.
    Unsupported,
}

impl MessageContent {
    /// Text body or media placeholder for relay.
    pub fn body(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Image { caption, .. } => caption.clone().unwrap_or_else(|| "Image".to_string()),
            Self::Video { caption, .. } => caption.clone().unwrap_or_else(|| "Video".to_string()),
            Self::Audio => "Audio".to_string(),
            Self::Document { caption } => {
                caption.clone().unwrap_or_else(|| "Document".to_string())
            }
            Self::Location { .. } => "Location".to_string(),
            Self::Unsupported => "Unsupported message type".to_string(),
        }
    }

    /// Media classification for relay.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Text(_) | Self::Unsupported => MessageType::Text,
            Self::Image { .. } => MessageType::Image,
            Self::Video { .. } => MessageType::Video,
            Self::Audio => MessageType::Audio,
            Self::Document { .. } => MessageType::Document,
            Self::Location { .. } => MessageType::Location,
        }
    }

    /// Media companions (thumbnails as JPEG data URLs, coordinates).
    pub fn media(&self) -> MediaFields {
        fn data_url(bytes: &[u8]) -> String {
            format!(
                "data:image/jpeg;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(bytes)
            )
        }
        match self {
            Self::Image {
                thumbnail: Some(bytes),
                ..
            } => MediaFields {
                image_base64: Some(data_url(bytes)),
                ..MediaFields::default()
            },
            Self::Video {
                thumbnail: Some(bytes),
                ..
            } => MediaFields {
                video_base64: Some(data_url(bytes)),
                ..MediaFields::default()
            },
            Self::Location {
                latitude,
                longitude,
            } => MediaFields {
                location_lat: Some(latitude.to_string()),
                location_long: Some(longitude.to_string()),
                ..MediaFields::default()
            },
            _ => MediaFields::default(),
        }
    }
}

/// A freshly opened session: the handle plus its event stream.
pub struct WireConnection {
    /// Shared session handle for sends/acks/logout.
    pub session: Arc<dyn WireSession>,
    /// Ordered event stream; ends after `Closed`.
    pub events: mpsc::Receiver<WireEvent>,
}

/// Opens protocol sessions.
#[async_trait]
pub trait WireConnector: Send + Sync {
    /// Open a session for `tenant` using the persisted credential blob.
    ///
    /// An empty blob starts an unauthenticated session that will emit QR
    /// challenges; a populated blob resumes the existing authentication.
    async fn connect(
        &self,
        tenant: &TenantId,
        credentials: Credentials,
    ) -> Result<WireConnection, WireError>;
}

/// One live, authenticated (or authenticating) protocol session.
#[async_trait]
pub trait WireSession: Send + Sync {
    /// Send a text message to a user JID. Returns the wire message id.
    async fn send_text(&self, jid: &str, text: &str) -> Result<String, WireError>;

    /// Acknowledge receipt (read receipt) of the given message ids.
    async fn ack(&self, message_ids: &[String]) -> Result<(), WireError>;

    /// Terminate the session and invalidate its credentials remotely.
    async fn logout(&self) -> Result<(), WireError>;
}
