//! Event fan-out to per-tenant subscriber groups.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use courier_core::{GatewayEvent, TenantId};

/// Per-subscriber outbound buffer.
pub const SUBSCRIBER_BUFFER: usize = 64;

/// Maximum lifetime message drops before a slow subscriber is evicted.
const MAX_TOTAL_DROPS: u64 = 100;

struct Subscriber {
    id: Uuid,
    tx: mpsc::Sender<Arc<String>>,
    drops: u64,
}

/// Fans gateway events out to the WebSocket subscribers of each tenant.
///
/// Events are serialized once per publish and shared across recipients as
/// `Arc<String>`. Delivery is non-blocking: a subscriber whose buffer is
/// full loses the event, and one that keeps falling behind is evicted.
pub struct EventFanout {
    groups: DashMap<TenantId, Vec<Subscriber>>,
}

impl EventFanout {
    /// Create a fanout with no subscribers.
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
        }
    }

    /// Join a tenant's subscriber group with a dedicated channel.
    ///
    /// Returns the subscriber id (used to leave) and the frame stream.
    pub fn subscribe(&self, tenant: &TenantId) -> (Uuid, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = Uuid::now_v7();
        self.subscribe_sender(id, tenant, tx);
        (id, rx)
    }

    /// Join a tenant's subscriber group with a caller-supplied sender.
    ///
    /// One subscriber id may join several tenant groups over a shared
    /// channel; the WebSocket surface uses this so a single connection
    /// receives every tenant it joined.
    pub fn subscribe_sender(&self, id: Uuid, tenant: &TenantId, tx: mpsc::Sender<Arc<String>>) {
        self.groups
            .entry(tenant.clone())
            .or_default()
            .push(Subscriber { id, tx, drops: 0 });
        debug!(tenant = %tenant, subscriber = %id, "subscriber joined");
    }

    /// Leave a tenant's subscriber group. Unknown ids are ignored.
    pub fn unsubscribe(&self, tenant: &TenantId, id: Uuid) {
        if let Some(mut group) = self.groups.get_mut(tenant) {
            group.retain(|s| s.id != id);
        }
        // Drop the group record once the last subscriber leaves.
        let _ = self
            .groups
            .remove_if(tenant, |_, group| group.is_empty());
        debug!(tenant = %tenant, subscriber = %id, "subscriber left");
    }

    /// Remove the subscriber from every tenant group it joined.
    pub fn unsubscribe_all(&self, id: Uuid) {
        self.groups.retain(|_, group| {
            group.retain(|s| s.id != id);
            !group.is_empty()
        });
        debug!(subscriber = %id, "subscriber left all groups");
    }

    /// Serialize the event once and deliver it to the tenant's group.
    pub fn publish(&self, event: &GatewayEvent) {
        let frame = match serde_json::to_string(&event.to_frame()) {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(event = event.event_name(), error = %e, "failed to serialize event frame");
                return;
            }
        };
        let tenant = event.tenant_id();
        let Some(mut group) = self.groups.get_mut(tenant) else {
            return;
        };
        let mut recipients = 0u32;
        group.retain_mut(|subscriber| {
            if subscriber.tx.try_send(Arc::clone(&frame)).is_ok() {
                recipients += 1;
                return true;
            }
            subscriber.drops += 1;
            if subscriber.drops >= MAX_TOTAL_DROPS {
                warn!(
                    tenant = %tenant,
                    subscriber = %subscriber.id,
                    drops = subscriber.drops,
                    "evicting slow subscriber"
                );
                false
            } else {
                warn!(
                    tenant = %tenant,
                    subscriber = %subscriber.id,
                    total_drops = subscriber.drops,
                    "subscriber buffer full, event dropped"
                );
                true
            }
        });
        debug!(
            event = event.event_name(),
            tenant = %tenant,
            recipients,
            "event published"
        );
    }

    /// Subscribers currently in the tenant's group.
    pub fn subscriber_count(&self, tenant: &TenantId) -> usize {
        self.groups.get(tenant).map_or(0, |g| g.len())
    }
}

impl Default for EventFanout {
    fn default() -> Self {
        Self::new()
    }
}
