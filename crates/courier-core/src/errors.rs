//! Error hierarchy for the Courier gateway.
//!
//! Three families:
//!
//! - [`StoreError`]: credential persistence failures.
//! - [`WireError`]: failures at the messaging-protocol boundary.
//! - [`GatewayError`]: the user-visible taxonomy the API surface maps to
//!   structured responses.
//!
//! Backend webhook delivery failure is intentionally not represented here:
//! notification is fire-and-forget, always logged and swallowed at the
//! call site, never surfaced to callers.

use thiserror::Error;

/// Credential store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No credentials persisted for the tenant.
    #[error("no credentials stored for tenant")]
    NotFound,

    /// Persisted blob exists but cannot be parsed.
    #[error("credential blob is corrupt: {0}")]
    Corrupt(String),

    /// Underlying filesystem failure.
    #[error("credential store I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by the messaging-protocol client.
#[derive(Debug, Error)]
pub enum WireError {
    /// The protocol handshake could not be started.
    #[error("failed to open protocol session: {0}")]
    ConnectFailed(String),

    /// A send was attempted on a session that is no longer usable.
    #[error("protocol session is closed")]
    SessionClosed,

    /// The wire rejected an outbound operation.
    #[error("protocol operation failed: {0}")]
    Request(String),
}

/// User-visible gateway error taxonomy.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing or malformed request fields; no state change.
    #[error("{0}")]
    Validation(String),

    /// The operation requires an active session that does not exist.
    #[error("messaging session not connected for this tenant")]
    NotConnected,

    /// Credential persistence failed; surfaced, not retried automatically.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Protocol-level failure surfaced to the caller (session creation).
    #[error(transparent)]
    Wire(#[from] WireError),
}

impl GatewayError {
    /// Whether this error is the caller's fault (4xx-equivalent).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotConnected)
    }
}
