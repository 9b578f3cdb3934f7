//! Session lifecycle: creation, event loop, close classification,
//! scheduled reconnects, and the startup reconnect sweep.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use courier_core::{GatewayError, GatewayEvent, SessionStatus, TenantId};
use courier_settings::GatewaySettings;
use courier_store::CredentialStore;
use courier_wire::qr::qr_payload;
use courier_wire::{
    address, CloseFrame, WireConnector, WireEvent, CLOSE_STATUS_LOGGED_OUT,
    QR_ATTEMPTS_ENDED_MARKER,
};
use tokio::sync::mpsc;

use crate::fanout::EventFanout;
use crate::notifier::BackendNotifier;
use crate::registry::{ConnectGate, ConnectionInfo, SessionRegistry};

/// Result of an [`LifecycleManager::ensure_connection`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new attempt was started; its event loop is now running.
    Started,
    /// The tenant already holds an authenticated session; nothing done.
    AlreadyConnected,
    /// Another attempt is mid-handshake or awaiting a QR scan; deduplicated.
    AlreadyInFlight,
}

/// Per-tenant outcome of the startup reconnect sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweepOutcome {
    /// A reconnect attempt was started.
    Started,
    /// Tenant already live or terminal; left alone.
    Skipped,
    /// Slot listed but blob missing or corrupt; marked `needs_reauth`.
    ReauthRequired,
    /// The reconnect attempt failed; status is `failed`.
    Failed,
}

/// Owns every tenant session from creation to close.
///
/// One manager per process. Each opened session gets a spawned event loop
/// that translates wire events into registry transitions, fanout events,
/// and backend notifications; the registry's generation counter keeps a
/// superseded loop from touching state it no longer owns.
pub struct LifecycleManager {
    registry: Arc<SessionRegistry>,
    fanout: Arc<EventFanout>,
    notifier: Arc<dyn BackendNotifier>,
    store: CredentialStore,
    connector: Arc<dyn WireConnector>,
    settings: GatewaySettings,
}

impl LifecycleManager {
    /// Wire up a manager from its collaborators.
    pub fn new(
        registry: Arc<SessionRegistry>,
        fanout: Arc<EventFanout>,
        notifier: Arc<dyn BackendNotifier>,
        store: CredentialStore,
        connector: Arc<dyn WireConnector>,
        settings: GatewaySettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            fanout,
            notifier,
            store,
            connector,
            settings,
        })
    }

    /// The connection registry (status queries, health).
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The subscriber fanout (WebSocket surface).
    pub fn fanout(&self) -> &Arc<EventFanout> {
        &self.fanout
    }

    /// Accessors used by the relay half of the manager.
    pub(crate) fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub(crate) fn notifier(&self) -> &Arc<dyn BackendNotifier> {
        &self.notifier
    }

    pub(crate) fn gateway_settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Ensure a session exists or is being created for the tenant.
    ///
    /// Concurrent calls for one tenant collapse onto the single live
    /// attempt. On a fresh attempt the credential blob is loaded (or an
    /// empty slot initialized for first-time tenants) and the protocol
    /// handshake started; all further progress is driven by the spawned
    /// event loop.
    pub async fn ensure_connection(
        self: &Arc<Self>,
        tenant: &TenantId,
    ) -> Result<ConnectOutcome, GatewayError> {
        let generation = match self.registry.begin_connect(tenant) {
            ConnectGate::AlreadyConnected => return Ok(ConnectOutcome::AlreadyConnected),
            ConnectGate::InFlight => return Ok(ConnectOutcome::AlreadyInFlight),
            ConnectGate::Proceed { generation } => generation,
        };
        info!(tenant = %tenant, generation, "starting session attempt");
        self.publish_status(tenant, SessionStatus::Connecting, None);

        let credentials = match self.store.load_or_init(tenant) {
            Ok(credentials) => credentials,
            Err(e) => {
                let _ = self
                    .registry
                    .mark_closed(tenant, generation, SessionStatus::Failed);
                self.publish_connect_error(tenant, &e.to_string());
                return Err(e.into());
            }
        };

        match self.connector.connect(tenant, credentials).await {
            Ok(connection) => {
                if self
                    .registry
                    .finish_connect(tenant, generation, connection.session)
                {
                    let manager = Arc::clone(self);
                    let _ = tokio::spawn(manager.run_session(
                        tenant.clone(),
                        generation,
                        connection.events,
                    ));
                } else {
                    debug!(tenant = %tenant, generation, "attempt superseded during handshake");
                }
                Ok(ConnectOutcome::Started)
            }
            Err(e) => {
                error!(tenant = %tenant, error = %e, "session creation failed");
                let _ = self
                    .registry
                    .mark_closed(tenant, generation, SessionStatus::Failed);
                self.publish_connect_error(tenant, &e.to_string());
                Err(e.into())
            }
        }
    }

    /// Current QR payload, waiting briefly for one to materialize.
    ///
    /// Returns immediately when a challenge is already pending; otherwise
    /// waits up to the configured QR timeout for the wire to produce one.
    pub async fn wait_for_qr(self: &Arc<Self>, tenant: &TenantId) -> Option<String> {
        if let Some(qr) = self.registry.pending_qr(tenant) {
            return Some(qr);
        }
        let signal = self.registry.qr_signal(tenant)?;
        let notified = signal.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        // A challenge that landed between the check and arming the waiter
        // would otherwise be missed until the timeout.
        if let Some(qr) = self.registry.pending_qr(tenant) {
            return Some(qr);
        }
        let timeout = Duration::from_millis(self.settings.qr_wait_timeout_ms);
        let _ = tokio::time::timeout(timeout, notified).await;
        self.registry.pending_qr(tenant)
    }

    /// Tear down the tenant's session and purge its credentials.
    ///
    /// Idempotent. Supersedes any live attempt and any scheduled
    /// reconnect; logout on the wire is best-effort. A repeated
    /// disconnect, or one for a tenant with no record, changes nothing
    /// and publishes nothing.
    pub async fn disconnect(self: &Arc<Self>, tenant: &TenantId) -> Result<(), GatewayError> {
        let (prior, session) = self
            .registry
            .force_close(tenant, SessionStatus::Disconnected);
        if let Some(session) = session {
            if let Err(e) = session.logout().await {
                warn!(tenant = %tenant, error = %e, "wire logout failed during disconnect");
            }
        }
        self.store.delete(tenant)?;
        if prior != SessionStatus::Disconnected {
            info!(tenant = %tenant, "session disconnected");
            self.publish_status(tenant, SessionStatus::Disconnected, None);
        }
        Ok(())
    }

    /// Reconnect every tenant with persisted credentials.
    ///
    /// Run once at startup. The credential listing is a directory scan
    /// that can report stale slots, so each entry is re-validated against
    /// the blob content; a listed tenant whose blob is missing or corrupt
    /// is marked `needs_reauth` instead of being attempted. Per-tenant
    /// failures are isolated; attempts are spaced by the configured delay
    /// to avoid a thundering herd against the remote service.
    pub async fn auto_reconnect_all(self: &Arc<Self>) -> Vec<(TenantId, SweepOutcome)> {
        let tenants = match self.store.list_known_tenants() {
            Ok(tenants) => tenants,
            Err(e) => {
                error!(error = %e, "credential listing failed, skipping reconnect sweep");
                return Vec::new();
            }
        };
        info!(count = tenants.len(), "startup reconnect sweep");
        let mut outcomes = Vec::with_capacity(tenants.len());
        for tenant in tenants {
            let outcome = if !self.registry.status(&tenant).reconnect_eligible() {
                debug!(tenant = %tenant, "sweep skipping tenant with live or terminal state");
                SweepOutcome::Skipped
            } else if !self.store.has_credentials(&tenant) {
                warn!(tenant = %tenant, "credential slot listed but blob missing or corrupt");
                let _ = self.registry.set_reauth_required(&tenant);
                SweepOutcome::ReauthRequired
            } else if let Err(e) = self.ensure_connection(&tenant).await {
                warn!(tenant = %tenant, error = %e, "sweep reconnect failed");
                SweepOutcome::Failed
            } else {
                SweepOutcome::Started
            };
            let attempted = matches!(outcome, SweepOutcome::Started | SweepOutcome::Failed);
            outcomes.push((tenant, outcome));
            // Throttle authentication attempts against the remote service.
            if attempted {
                tokio::time::sleep(Duration::from_millis(self.settings.sweep_tenant_delay_ms))
                    .await;
            }
        }
        outcomes
    }

    /// Status plus phone number for the tenant.
    pub fn connection_info(&self, tenant: &TenantId) -> ConnectionInfo {
        self.registry.info(tenant)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Event loop
    // ─────────────────────────────────────────────────────────────────────

    async fn run_session(
        self: Arc<Self>,
        tenant: TenantId,
        generation: u64,
        mut events: mpsc::Receiver<WireEvent>,
    ) {
        while let Some(event) = events.recv().await {
            if !self.registry.is_current(&tenant, generation) {
                debug!(tenant = %tenant, generation, "event loop superseded, stopping");
                return;
            }
            match event {
                WireEvent::Qr { challenge } => self.handle_qr(&tenant, generation, &challenge),
                WireEvent::Open { identity } => self.handle_open(&tenant, generation, &identity),
                WireEvent::CredentialsUpdate(credentials) => {
                    if let Err(e) = self.store.save(&tenant, &credentials) {
                        error!(tenant = %tenant, error = %e, "failed to persist rotated credentials");
                    }
                }
                WireEvent::Messages(batch) => self.relay_inbound(&tenant, batch).await,
                WireEvent::Closed { error } => {
                    self.handle_close(&tenant, generation, error);
                    return;
                }
            }
        }
        // Stream ended without a close frame: treat as a clean local close.
        if self.registry.status(&tenant).holds_handle()
            && self
                .registry
                .mark_closed(&tenant, generation, SessionStatus::Disconnected)
        {
            debug!(tenant = %tenant, "event stream ended, session closed");
            self.publish_status(&tenant, SessionStatus::Disconnected, None);
        }
    }

    fn handle_qr(self: &Arc<Self>, tenant: &TenantId, generation: u64, challenge: &str) {
        let payload = qr_payload(challenge);
        if !self.registry.mark_qr(tenant, generation, payload.clone()) {
            return;
        }
        info!(tenant = %tenant, "qr challenge ready");
        let event = GatewayEvent::QrCodeGenerated {
            tenant_id: tenant.clone(),
            qr_code: payload,
        };
        self.fanout.publish(&event);
        self.notify_backend("connection_update", event.payload());
    }

    fn handle_open(self: &Arc<Self>, tenant: &TenantId, generation: u64, identity: &str) {
        let phone_number = address::phone_from_identity(identity);
        if !self
            .registry
            .mark_connected(tenant, generation, phone_number.clone())
        {
            return;
        }
        info!(tenant = %tenant, phone = phone_number.as_deref().unwrap_or("unknown"), "session open");
        self.publish_status(tenant, SessionStatus::Connected, phone_number);
    }

    /// Classify a close frame and transition the record accordingly.
    ///
    /// - exhausted QR challenge sequence: `needs_reauth`, credentials kept
    /// - remote logout (status 401): `needs_reauth`, credentials purged
    /// - anything else: `disconnected` plus a scheduled reconnect
    fn handle_close(
        self: &Arc<Self>,
        tenant: &TenantId,
        generation: u64,
        error: Option<CloseFrame>,
    ) {
        let (status, purge, reconnect) = match &error {
            Some(frame) if frame.message.contains(QR_ATTEMPTS_ENDED_MARKER) => {
                (SessionStatus::NeedsReauth, false, false)
            }
            Some(frame) if frame.status_code == Some(CLOSE_STATUS_LOGGED_OUT) => {
                (SessionStatus::NeedsReauth, true, false)
            }
            _ => (SessionStatus::Disconnected, false, true),
        };
        if !self.registry.mark_closed(tenant, generation, status) {
            return;
        }
        info!(
            tenant = %tenant,
            status = %status,
            reason = error.as_ref().map_or("clean close", |f| f.message.as_str()),
            "session closed"
        );
        if purge {
            if let Err(e) = self.store.delete(tenant) {
                warn!(tenant = %tenant, error = %e, "failed to purge credentials after remote logout");
            }
        }
        self.publish_status(tenant, status, None);
        if reconnect {
            self.schedule_reconnect(tenant.clone(), generation);
        }
    }

    /// Retry a transient disconnect after the configured delay.
    ///
    /// The retry only fires if the record is still owned by the closing
    /// generation and still `disconnected`: an explicit disconnect or a
    /// newer attempt in the meantime wins.
    fn schedule_reconnect(self: &Arc<Self>, tenant: TenantId, generation: u64) {
        let delay = Duration::from_millis(self.settings.reconnect_delay_ms);
        let manager = Arc::clone(self);
        let _ = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !manager.registry.is_current(&tenant, generation)
                || !manager.registry.status(&tenant).reconnect_eligible()
            {
                debug!(tenant = %tenant, "scheduled reconnect superseded");
                return;
            }
            info!(tenant = %tenant, "reconnecting after transient close");
            if let Err(e) = manager.ensure_connection(&tenant).await {
                warn!(tenant = %tenant, error = %e, "scheduled reconnect failed");
            }
        });
    }

    // ─────────────────────────────────────────────────────────────────────
    // Publication
    // ─────────────────────────────────────────────────────────────────────

    pub(crate) fn publish_status(
        self: &Arc<Self>,
        tenant: &TenantId,
        status: SessionStatus,
        phone_number: Option<String>,
    ) {
        let event = GatewayEvent::ConnectionStatus {
            tenant_id: tenant.clone(),
            status,
            phone_number,
        };
        self.fanout.publish(&event);
        self.notify_backend("connection_update", event.payload());
    }

    fn publish_connect_error(self: &Arc<Self>, tenant: &TenantId, error: &str) {
        let event = GatewayEvent::ConnectionError {
            tenant_id: tenant.clone(),
            error: error.to_string(),
        };
        self.fanout.publish(&event);
        self.notify_backend("connection_update", event.payload());
    }

    /// Fire-and-forget backend delivery; the caller never waits.
    pub(crate) fn notify_backend(self: &Arc<Self>, event: &'static str, payload: Value) {
        let notifier = Arc::clone(&self.notifier);
        let _ = tokio::spawn(async move {
            let _ = notifier.notify(event, payload).await;
        });
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::testkit::{harness, tenant, wait_status, wait_until};
    use super::*;
    use courier_store::Credentials;
    use courier_wire::testutil::MockConnector;

    #[tokio::test(start_paused = true)]
    async fn qr_flow_publishes_and_satisfies_waiters() {
        let h = harness();
        let t = tenant("42");
        let (_sub, mut rx) = h.fanout.subscribe(&t);

        let outcome = h.manager.ensure_connection(&t).await.unwrap();
        assert_eq!(outcome, ConnectOutcome::Started);

        let handle = h.connector.last_handle(&t).unwrap();
        handle
            .emit(courier_wire::WireEvent::Qr {
                challenge: "2@challenge".into(),
            })
            .await;

        let qr = h.manager.wait_for_qr(&t).await.expect("qr should appear");
        assert!(qr.starts_with("data:text/plain;base64,"));
        assert_eq!(h.registry.status(&t), SessionStatus::QrPending);

        // The attempt announces itself before the challenge arrives.
        let frame = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["event"], "connection_status");
        assert_eq!(parsed["data"]["status"], "connecting");

        let frame = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["event"], "qr_code_generated");
        assert_eq!(parsed["data"]["status"], "qr_generated");

        wait_until(|| !h.notifier.calls_named("connection_update").is_empty()).await;
        let call = &h.notifier.calls_named("connection_update")[0];
        assert_eq!(call["tenant_id"], "42");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_qr_times_out_when_wire_stays_silent() {
        let h = harness();
        let t = tenant("42");
        let _ = h.manager.ensure_connection(&t).await.unwrap();
        assert!(h.manager.wait_for_qr(&t).await.is_none());
    }

    #[tokio::test]
    async fn wait_for_qr_for_unknown_tenant_is_none() {
        let h = harness();
        assert!(h.manager.wait_for_qr(&tenant("ghost")).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_collapse_onto_one_attempt() {
        let h = harness();
        let t = tenant("42");
        assert_eq!(
            h.manager.ensure_connection(&t).await.unwrap(),
            ConnectOutcome::Started
        );
        assert_eq!(
            h.manager.ensure_connection(&t).await.unwrap(),
            ConnectOutcome::AlreadyInFlight
        );
        assert_eq!(h.connector.connect_count(&t), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn open_event_marks_connected_with_phone() {
        let h = harness();
        let t = tenant("42");
        let _ = h.manager.ensure_connection(&t).await.unwrap();
        let handle = h.connector.last_handle(&t).unwrap();
        handle
            .emit(courier_wire::WireEvent::Open {
                identity: "6281234567890:7@s.whatsapp.net".into(),
            })
            .await;

        wait_status(&h.registry, &t, SessionStatus::Connected).await;
        let info = h.manager.connection_info(&t);
        assert_eq!(info.phone_number.as_deref(), Some("6281234567890"));
        assert_eq!(
            h.manager.ensure_connection(&t).await.unwrap(),
            ConnectOutcome::AlreadyConnected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rotated_credentials_are_persisted() {
        let h = harness();
        let t = tenant("42");
        let _ = h.manager.ensure_connection(&t).await.unwrap();
        let handle = h.connector.last_handle(&t).unwrap();
        let rotated = Credentials(json!({"noise_key": "fresh"}));
        handle
            .emit(courier_wire::WireEvent::CredentialsUpdate(rotated.clone()))
            .await;

        wait_until(|| h.store.load(&t).is_ok_and(|c| c == rotated)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn transient_close_reconnects_after_delay() {
        let h = harness();
        let t = tenant("42");
        let _ = h.manager.ensure_connection(&t).await.unwrap();
        let handle = h.connector.last_handle(&t).unwrap();
        handle
            .emit(courier_wire::WireEvent::Open {
                identity: "628111:1@s.whatsapp.net".into(),
            })
            .await;
        wait_status(&h.registry, &t, SessionStatus::Connected).await;

        handle
            .emit(courier_wire::WireEvent::Closed {
                error: Some(courier_wire::CloseFrame {
                    status_code: Some(500),
                    message: "stream errored".into(),
                }),
            })
            .await;

        // Reconnect fires after the configured delay.
        wait_until(|| h.connector.connect_count(&t) == 2).await;
        assert_eq!(h.registry.status(&t), SessionStatus::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_disconnect_vetoes_scheduled_reconnect() {
        let h = harness();
        let t = tenant("42");
        let _ = h.manager.ensure_connection(&t).await.unwrap();
        let handle = h.connector.last_handle(&t).unwrap();
        handle
            .emit(courier_wire::WireEvent::Closed {
                error: Some(courier_wire::CloseFrame {
                    status_code: Some(500),
                    message: "stream errored".into(),
                }),
            })
            .await;
        wait_status(&h.registry, &t, SessionStatus::Disconnected).await;

        // Disconnect bumps the generation, so the pending retry is stale.
        h.manager.disconnect(&t).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(h.connector.connect_count(&t), 1);
        assert_eq!(h.registry.status(&t), SessionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_qr_sequence_needs_reauth_without_purge() {
        let h = harness();
        let t = tenant("42");
        let _ = h.manager.ensure_connection(&t).await.unwrap();
        let handle = h.connector.last_handle(&t).unwrap();
        handle
            .emit(courier_wire::WireEvent::Closed {
                error: Some(courier_wire::CloseFrame {
                    status_code: None,
                    message: "QR refs attempts ended, closing".into(),
                }),
            })
            .await;

        wait_status(&h.registry, &t, SessionStatus::NeedsReauth).await;
        // Slot initialized by load_or_init survives.
        assert!(h.store.has_credentials(&t));
        // No reconnect is ever scheduled out of needs_reauth.
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(h.connector.connect_count(&t), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_logout_purges_credentials() {
        let h = harness();
        let t = tenant("42");
        let _ = h.manager.ensure_connection(&t).await.unwrap();
        let handle = h.connector.last_handle(&t).unwrap();
        handle
            .emit(courier_wire::WireEvent::Closed {
                error: Some(courier_wire::CloseFrame {
                    status_code: Some(401),
                    message: "logged out from phone".into(),
                }),
            })
            .await;

        wait_status(&h.registry, &t, SessionStatus::NeedsReauth).await;
        assert!(!h.store.has_credentials(&t));
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(h.connector.connect_count(&t), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_failure_marks_failed_and_publishes_error() {
        let h = harness();
        let t = tenant("down");
        let (_sub, mut rx) = h.fanout.subscribe(&t);
        h.connector.fail_connects(&t, "no route to service");

        let err = h.manager.ensure_connection(&t).await.expect_err("fails");
        assert!(!err.is_client_error());
        assert_eq!(h.registry.status(&t), SessionStatus::Failed);

        let frame = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["event"], "connection_status");
        assert_eq!(parsed["data"]["status"], "connecting");

        let frame = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["event"], "connection_error");
        assert!(parsed["data"]["error"]
            .as_str()
            .unwrap()
            .contains("no route"));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_logs_out_purges_and_is_idempotent() {
        let h = harness();
        let t = tenant("42");
        let _ = h.manager.ensure_connection(&t).await.unwrap();
        let handle = h.connector.last_handle(&t).unwrap();
        handle
            .emit(courier_wire::WireEvent::Open {
                identity: "628111:1@s.whatsapp.net".into(),
            })
            .await;
        wait_status(&h.registry, &t, SessionStatus::Connected).await;

        h.manager.disconnect(&t).await.unwrap();
        assert!(handle.session.logged_out());
        assert!(!h.store.has_credentials(&t));
        assert_eq!(h.registry.status(&t), SessionStatus::Disconnected);

        // Second disconnect, and disconnect of an unknown tenant, succeed.
        h.manager.disconnect(&t).await.unwrap();
        h.manager.disconnect(&tenant("ghost")).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_disconnect_publishes_no_duplicate_events() {
        let h = harness();
        let t = tenant("42");
        let ghost = tenant("ghost");
        let _ = h.manager.ensure_connection(&t).await.unwrap();
        let handle = h.connector.last_handle(&t).unwrap();
        handle
            .emit(courier_wire::WireEvent::Open {
                identity: "628111:1@s.whatsapp.net".into(),
            })
            .await;
        wait_status(&h.registry, &t, SessionStatus::Connected).await;

        let (_sub, mut rx) = h.fanout.subscribe(&t);
        let (_ghost_sub, mut ghost_rx) = h.fanout.subscribe(&ghost);

        h.manager.disconnect(&t).await.unwrap();
        let frame = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["data"]["status"], "disconnected");

        // Already disconnected, and never seen: no events at all.
        h.manager.disconnect(&t).await.unwrap();
        h.manager.disconnect(&ghost).await.unwrap();
        assert!(rx.try_recv().is_err());
        assert!(ghost_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn qr_wait_wakes_when_challenge_lands_mid_wait() {
        let h = harness();
        let t = tenant("42");
        let _ = h.manager.ensure_connection(&t).await.unwrap();
        let handle = h.connector.last_handle(&t).unwrap();

        let manager = Arc::clone(&h.manager);
        let waiter_tenant = t.clone();
        let waiter =
            tokio::spawn(async move { manager.wait_for_qr(&waiter_tenant).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle
            .emit(courier_wire::WireEvent::Qr {
                challenge: "2@late".into(),
            })
            .await;

        let qr = waiter.await.unwrap().expect("waiter should be woken");
        assert!(qr.starts_with("data:text/plain;base64,"));
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_event_loop_drops_stale_events() {
        let h = harness();
        let t = tenant("42");
        let _ = h.manager.ensure_connection(&t).await.unwrap();
        let stale = h.connector.last_handle(&t).unwrap();

        h.manager.disconnect(&t).await.unwrap();
        let _ = h.manager.ensure_connection(&t).await.unwrap();

        stale
            .emit(courier_wire::WireEvent::Open {
                identity: "628999:1@s.whatsapp.net".into(),
            })
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The stale open never lands; the fresh attempt is still connecting.
        assert_eq!(h.registry.status(&t), SessionStatus::Connecting);
        assert!(h.manager.connection_info(&t).phone_number.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_reconnects_persisted_tenants_only() {
        let h = harness();
        let stored = tenant("stored");
        let stale = tenant("stale");
        let live = tenant("live");

        h.store
            .save(&stored, &Credentials(json!({"registered": true})))
            .unwrap();
        // Listing false positive: slot directory without a blob.
        std::fs::create_dir_all(h.store.root().join("auth-stale")).unwrap();

        // Already-live tenant must not be touched by the sweep.
        let _ = h.manager.ensure_connection(&live).await.unwrap();
        let live_handle = h.connector.last_handle(&live).unwrap();
        live_handle
            .emit(courier_wire::WireEvent::Open {
                identity: "628222:1@s.whatsapp.net".into(),
            })
            .await;
        wait_status(&h.registry, &live, SessionStatus::Connected).await;

        let outcomes = h.manager.auto_reconnect_all().await;

        assert_eq!(h.connector.connect_count(&stored), 1);
        assert_eq!(h.connector.connect_count(&stale), 0);
        assert_eq!(h.connector.connect_count(&live), 1);
        // The listing false positive is surfaced as needs_reauth.
        assert_eq!(h.registry.status(&stale), SessionStatus::NeedsReauth);
        // The sweep resumed with the persisted blob, not a fresh slot.
        assert_eq!(
            h.connector.last_credentials(&stored).unwrap(),
            Credentials(json!({"registered": true}))
        );
        for (tenant, outcome) in outcomes {
            let expected = match tenant.as_str() {
                "stored" => SweepOutcome::Started,
                "stale" => SweepOutcome::ReauthRequired,
                "live" => SweepOutcome::Skipped,
                other => panic!("unexpected tenant {other}"),
            };
            assert_eq!(outcome, expected, "tenant {tenant}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_isolates_per_tenant_failures() {
        let h = harness();
        let bad = tenant("bad");
        let good = tenant("good");
        h.store.save(&bad, &Credentials::empty()).unwrap();
        h.store.save(&good, &Credentials::empty()).unwrap();
        h.connector.fail_connects(&bad, "refused");

        let outcomes = h.manager.auto_reconnect_all().await;

        assert_eq!(h.registry.status(&bad), SessionStatus::Failed);
        assert_eq!(h.connector.connect_count(&good), 1);
        assert!(outcomes
            .iter()
            .any(|(t, o)| t.as_str() == "bad" && *o == SweepOutcome::Failed));
        assert!(outcomes
            .iter()
            .any(|(t, o)| t.as_str() == "good" && *o == SweepOutcome::Started));
    }

    #[tokio::test(start_paused = true)]
    async fn stream_end_without_close_frame_reads_as_clean_close() {
        let h = harness();
        let t = tenant("42");
        let _ = h.manager.ensure_connection(&t).await.unwrap();
        // Dropping every sender ends the event stream without a close frame.
        h.connector.close_stream(&t);

        wait_status(&h.registry, &t, SessionStatus::Disconnected).await;
    }

    #[tokio::test(start_paused = true)]
    async fn first_time_tenant_gets_an_initialized_slot() {
        let h = harness();
        let t = tenant("fresh");
        assert!(!h.store.has_credentials(&t));
        let _ = h.manager.ensure_connection(&t).await.unwrap();
        assert!(h.store.has_credentials(&t));
        assert_eq!(
            h.connector.last_credentials(&t).unwrap(),
            Credentials::empty()
        );
    }

    #[tokio::test]
    async fn mock_connector_coerces_to_trait_object() {
        // Compile-time check that the connector seam stays object-safe.
        let connector: Arc<dyn WireConnector> = Arc::new(MockConnector::new());
        let _ = connector;
    }
}
