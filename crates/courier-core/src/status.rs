//! Session status taxonomy for the per-tenant connection state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection status of one tenant's messaging session.
///
/// Absence of a registry record is equivalent to [`Disconnected`].
/// `NeedsReauth` and `Failed` are terminal until an explicit new request:
/// the lifecycle manager never auto-reconnects out of them.
///
/// [`Disconnected`]: SessionStatus::Disconnected
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No live session and no attempt in progress.
    Disconnected,
    /// A session is being opened (credentials loaded, handshake running).
    Connecting,
    /// A QR challenge is waiting to be scanned.
    QrPending,
    /// Authenticated and able to send/receive.
    Connected,
    /// Terminal: a fresh QR scan is required (expired challenge or remote logout).
    NeedsReauth,
    /// Terminal: session creation failed; operator action or a new request required.
    Failed,
}

impl SessionStatus {
    /// True only for [`SessionStatus::Connected`].
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether this status implies a live session handle in the registry.
    ///
    /// Invariant from the data model: handle present ⇔ status is one of
    /// connecting, `qr_pending`, connected.
    pub fn holds_handle(self) -> bool {
        matches!(self, Self::Connecting | Self::QrPending | Self::Connected)
    }

    /// Whether a scheduled reconnect may act on a tenant in this status.
    ///
    /// Only `Disconnected` is eligible: an intervening explicit disconnect,
    /// new connection attempt, or terminal classification wins over a
    /// previously scheduled retry.
    pub fn reconnect_eligible(self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Wire representation (snake_case), shared by API and events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::QrPending => "qr_pending",
            Self::Connected => "connected",
            Self::NeedsReauth => "needs_reauth",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
