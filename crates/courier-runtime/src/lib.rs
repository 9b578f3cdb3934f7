//! # courier-runtime
//!
//! The gateway's engine room: everything between the protocol boundary
//! and the HTTP surface.
//!
//! - **Registry** ([`registry`]): per-tenant connection records with a
//!   generation counter guarding against superseded session loops.
//! - **Fanout** ([`fanout`]): per-tenant WebSocket subscriber groups with
//!   serialize-once delivery and slow-client eviction.
//! - **Notifier** ([`notifier`]): best-effort backend webhook delivery.
//! - **Lifecycle** ([`lifecycle`]): session creation and dedup, the wire
//!   event loop, close classification, scheduled reconnects, and the
//!   startup reconnect sweep.
//! - **Relay** ([`relay`]): outbound sends and inbound
//!   webhook-then-broadcast message relay.

#![deny(unsafe_code)]

pub mod fanout;
pub mod lifecycle;
pub mod notifier;
pub mod registry;
pub mod relay;

pub use fanout::{EventFanout, SUBSCRIBER_BUFFER};
pub use lifecycle::{ConnectOutcome, LifecycleManager, SweepOutcome};
pub use notifier::{BackendNotifier, HttpBackendNotifier};
pub use registry::{ConnectGate, ConnectionInfo, SessionRegistry};
