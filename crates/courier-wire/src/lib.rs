//! # courier-wire
//!
//! The messaging-protocol boundary for the Courier gateway.
//!
//! The underlying protocol client (wire format, encryption, message
//! encoding) is an external capability. This crate pins down the seam the
//! rest of the gateway programs against:
//!
//! - **Traits**: [`session::WireConnector`] opens a session;
//!   [`session::WireSession`] sends, acknowledges, and logs out.
//! - **Events**: [`session::WireEvent`] — QR challenge, open, close,
//!   inbound message batches, credential updates — delivered over an mpsc
//!   stream per session.
//! - **Addressing**: phone-number normalization and the `@s.whatsapp.net`
//!   user-JID format in [`address`].
//! - **QR payloads**: the pure challenge-to-data-URL encoding in [`qr`].
//! - **Test double**: a scriptable [`testutil::MockConnector`] used by the
//!   runtime and server tests.

#![deny(unsafe_code)]

pub mod address;
pub mod qr;
pub mod session;
pub mod testutil;

pub use session::{
    CloseFrame, InboundMessage, MessageContent, WireConnection, WireConnector, WireEvent,
    WireSession, CLOSE_STATUS_LOGGED_OUT, QR_ATTEMPTS_ENDED_MARKER,
};
