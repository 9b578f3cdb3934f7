//! # courier-core
//!
//! Foundation types for the Courier messaging gateway.
//!
//! This crate provides the shared vocabulary that all other Courier crates
//! depend on:
//!
//! - **Branded IDs**: [`ids::TenantId`] as a validated newtype
//! - **Status taxonomy**: [`status::SessionStatus`] for the per-tenant
//!   connection state machine
//! - **Errors**: [`errors::GatewayError`] hierarchy via `thiserror`, plus
//!   the [`errors::StoreError`] / [`errors::WireError`] leaf families
//! - **Events**: [`events::GatewayEvent`] — the vocabulary broadcast to
//!   WebSocket subscribers and forwarded to the backend webhook
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other courier crates.

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod status;

pub use errors::{GatewayError, StoreError, WireError};
pub use events::{GatewayEvent, MediaFields};
pub use ids::TenantId;
pub use status::SessionStatus;
