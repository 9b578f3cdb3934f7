//! In-memory per-tenant connection registry.
//!
//! The registry is the single source of truth for session state. Every
//! record carries a generation counter bumped on each new connection
//! attempt and each explicit disconnect; mutations from a session's event
//! loop carry the generation they were spawned with and are discarded once
//! a newer attempt has superseded them.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Notify;

use courier_core::{SessionStatus, TenantId};
use courier_wire::WireSession;

/// Decision returned by [`SessionRegistry::begin_connect`].
#[derive(Clone, Copy, Debug)]
pub enum ConnectGate {
    /// No live attempt; the caller owns the new generation.
    Proceed {
        /// Generation token for all subsequent guarded mutations.
        generation: u64,
    },
    /// The tenant already has an authenticated session.
    AlreadyConnected,
    /// An attempt (connecting or awaiting QR scan) is already running.
    InFlight,
}

/// Point-in-time view of one tenant's connection.
#[derive(Clone, Debug)]
pub struct ConnectionInfo {
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Protocol-assigned phone number, present once authenticated.
    pub phone_number: Option<String>,
}

struct Entry {
    status: SessionStatus,
    generation: u64,
    session: Option<Arc<dyn WireSession>>,
    identity: Option<String>,
    pending_qr: Option<String>,
    qr_signal: Arc<Notify>,
}

impl Entry {
    fn new() -> Self {
        Self {
            status: SessionStatus::Disconnected,
            generation: 0,
            session: None,
            identity: None,
            pending_qr: None,
            qr_signal: Arc::new(Notify::new()),
        }
    }

    /// Handle, identity, and QR are only meaningful while a session lives.
    fn clear_session_state(&mut self) {
        self.session = None;
        self.identity = None;
        self.pending_qr = None;
    }
}

/// Concurrent registry of tenant connection records.
///
/// Absence of a record is equivalent to `Disconnected`. Records are never
/// removed; a gateway serves a bounded tenant population and the terminal
/// statuses are part of the observable state.
pub struct SessionRegistry {
    entries: DashMap<TenantId, Entry>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Current status; `Disconnected` when the tenant has no record.
    pub fn status(&self, tenant: &TenantId) -> SessionStatus {
        self.entries
            .get(tenant)
            .map_or(SessionStatus::Disconnected, |e| e.status)
    }

    /// Gate a new connection attempt.
    ///
    /// On `Proceed` the record is moved to `Connecting` under a fresh
    /// generation and all prior session state is cleared.
    pub fn begin_connect(&self, tenant: &TenantId) -> ConnectGate {
        let mut entry = self.entries.entry(tenant.clone()).or_insert_with(Entry::new);
        match entry.status {
            SessionStatus::Connected => ConnectGate::AlreadyConnected,
            SessionStatus::Connecting | SessionStatus::QrPending => ConnectGate::InFlight,
            SessionStatus::Disconnected | SessionStatus::NeedsReauth | SessionStatus::Failed => {
                entry.generation += 1;
                entry.status = SessionStatus::Connecting;
                entry.clear_session_state();
                ConnectGate::Proceed {
                    generation: entry.generation,
                }
            }
        }
    }

    /// Attach the opened session handle to a `Connecting` record.
    ///
    /// Returns `false` when the attempt was superseded meanwhile; the
    /// caller must then drop the handle instead of running it.
    pub fn finish_connect(
        &self,
        tenant: &TenantId,
        generation: u64,
        session: Arc<dyn WireSession>,
    ) -> bool {
        let Some(mut entry) = self.entries.get_mut(tenant) else {
            return false;
        };
        if entry.generation != generation {
            return false;
        }
        entry.session = Some(session);
        true
    }

    /// Whether `generation` still owns the tenant's record.
    pub fn is_current(&self, tenant: &TenantId, generation: u64) -> bool {
        self.entries
            .get(tenant)
            .is_some_and(|e| e.generation == generation)
    }

    /// Record a fresh QR challenge and wake any request waiting for one.
    pub fn mark_qr(&self, tenant: &TenantId, generation: u64, qr_payload: String) -> bool {
        let Some(mut entry) = self.entries.get_mut(tenant) else {
            return false;
        };
        if entry.generation != generation {
            return false;
        }
        entry.status = SessionStatus::QrPending;
        entry.pending_qr = Some(qr_payload);
        entry.qr_signal.notify_waiters();
        true
    }

    /// Move a record to `Connected`, storing the authenticated identity.
    pub fn mark_connected(
        &self,
        tenant: &TenantId,
        generation: u64,
        phone_number: Option<String>,
    ) -> bool {
        let Some(mut entry) = self.entries.get_mut(tenant) else {
            return false;
        };
        if entry.generation != generation {
            return false;
        }
        entry.status = SessionStatus::Connected;
        entry.identity = phone_number;
        entry.pending_qr = None;
        true
    }

    /// Close out a record with a non-live status, dropping session state.
    pub fn mark_closed(&self, tenant: &TenantId, generation: u64, status: SessionStatus) -> bool {
        debug_assert!(!status.holds_handle());
        let Some(mut entry) = self.entries.get_mut(tenant) else {
            return false;
        };
        if entry.generation != generation {
            return false;
        }
        entry.status = status;
        entry.clear_session_state();
        true
    }

    /// Explicitly close a tenant's record, superseding any live attempt
    /// and any scheduled reconnect.
    ///
    /// Returns the status the record held before the close plus the taken
    /// session handle so the caller can log it out. An absent record reads
    /// as `Disconnected` and is left absent.
    pub fn force_close(
        &self,
        tenant: &TenantId,
        status: SessionStatus,
    ) -> (SessionStatus, Option<Arc<dyn WireSession>>) {
        debug_assert!(!status.holds_handle());
        let Some(mut entry) = self.entries.get_mut(tenant) else {
            return (SessionStatus::Disconnected, None);
        };
        let prior = entry.status;
        entry.generation += 1;
        entry.status = status;
        let session = entry.session.take();
        entry.clear_session_state();
        (prior, session)
    }

    /// Mark a tenant as requiring a fresh QR authentication.
    ///
    /// Used by the startup sweep for tenants whose credential slot turns
    /// out to be missing or corrupt. Creates the record if absent and
    /// supersedes any stale generation; refuses to touch a live session.
    pub fn set_reauth_required(&self, tenant: &TenantId) -> bool {
        let mut entry = self.entries.entry(tenant.clone()).or_insert_with(Entry::new);
        if entry.status.holds_handle() {
            return false;
        }
        entry.generation += 1;
        entry.status = SessionStatus::NeedsReauth;
        entry.clear_session_state();
        true
    }

    /// The QR payload currently waiting to be scanned, if any.
    pub fn pending_qr(&self, tenant: &TenantId) -> Option<String> {
        self.entries.get(tenant)?.pending_qr.clone()
    }

    /// Signal woken whenever the tenant's record gains a QR challenge.
    pub fn qr_signal(&self, tenant: &TenantId) -> Option<Arc<Notify>> {
        self.entries.get(tenant).map(|e| Arc::clone(&e.qr_signal))
    }

    /// Session handle, only while the tenant is `Connected`.
    pub fn connected_session(&self, tenant: &TenantId) -> Option<Arc<dyn WireSession>> {
        let entry = self.entries.get(tenant)?;
        if entry.status != SessionStatus::Connected {
            return None;
        }
        entry.session.clone()
    }

    /// Status plus identity in one consistent read.
    pub fn info(&self, tenant: &TenantId) -> ConnectionInfo {
        self.entries
            .get(tenant)
            .map_or_else(
                || ConnectionInfo {
                    status: SessionStatus::Disconnected,
                    phone_number: None,
                },
                |e| ConnectionInfo {
                    status: e.status,
                    phone_number: e.identity.clone(),
                },
            )
    }

    /// Tenants currently holding an authenticated session.
    pub fn connected_tenants(&self) -> Vec<TenantId> {
        self.entries
            .iter()
            .filter(|e| e.status == SessionStatus::Connected)
            .map(|e| e.key().clone())
            .collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use courier_core::WireError;

    use super::*;

    struct NoopSession;

    #[async_trait]
    impl WireSession for NoopSession {
        async fn send_text(&self, _jid: &str, _text: &str) -> Result<String, WireError> {
            Ok("id".into())
        }
        async fn ack(&self, _ids: &[String]) -> Result<(), WireError> {
            Ok(())
        }
        async fn logout(&self) -> Result<(), WireError> {
            Ok(())
        }
    }

    fn tenant(id: &str) -> TenantId {
        TenantId::new(id).unwrap()
    }

    fn proceed(registry: &SessionRegistry, t: &TenantId) -> u64 {
        match registry.begin_connect(t) {
            ConnectGate::Proceed { generation } => generation,
            other => panic!("expected Proceed, got {other:?}"),
        }
    }

    #[test]
    fn absent_tenant_reads_disconnected() {
        let registry = SessionRegistry::new();
        let t = tenant("ghost");
        assert_eq!(registry.status(&t), SessionStatus::Disconnected);
        assert!(registry.connected_session(&t).is_none());
        assert!(registry.pending_qr(&t).is_none());
    }

    #[test]
    fn begin_connect_gates_live_attempts() {
        let registry = SessionRegistry::new();
        let t = tenant("42");
        let generation = proceed(&registry, &t);
        assert_eq!(registry.status(&t), SessionStatus::Connecting);
        assert!(matches!(registry.begin_connect(&t), ConnectGate::InFlight));

        assert!(registry.mark_qr(&t, generation, "qr".into()));
        assert!(matches!(registry.begin_connect(&t), ConnectGate::InFlight));

        assert!(registry.mark_connected(&t, generation, Some("628111".into())));
        assert!(matches!(
            registry.begin_connect(&t),
            ConnectGate::AlreadyConnected
        ));
    }

    #[test]
    fn terminal_statuses_allow_fresh_attempt() {
        let registry = SessionRegistry::new();
        let t = tenant("42");
        let g1 = proceed(&registry, &t);
        assert!(registry.mark_closed(&t, g1, SessionStatus::NeedsReauth));
        let g2 = proceed(&registry, &t);
        assert!(g2 > g1);
        assert_eq!(registry.status(&t), SessionStatus::Connecting);
    }

    #[test]
    fn stale_generation_mutations_are_rejected() {
        let registry = SessionRegistry::new();
        let t = tenant("42");
        let g1 = proceed(&registry, &t);
        let _ = registry.force_close(&t, SessionStatus::Disconnected);
        let g2 = proceed(&registry, &t);

        assert!(!registry.mark_qr(&t, g1, "stale".into()));
        assert!(!registry.mark_connected(&t, g1, None));
        assert!(!registry.mark_closed(&t, g1, SessionStatus::Disconnected));
        assert!(!registry.is_current(&t, g1));
        assert!(registry.is_current(&t, g2));
        // The live attempt is untouched
        assert_eq!(registry.status(&t), SessionStatus::Connecting);
    }

    #[test]
    fn handle_present_only_while_connected() {
        let registry = SessionRegistry::new();
        let t = tenant("42");
        let g = proceed(&registry, &t);
        assert!(registry.finish_connect(&t, g, Arc::new(NoopSession)));
        // Connecting: handle stored but not exposed as connected
        assert!(registry.connected_session(&t).is_none());

        assert!(registry.mark_connected(&t, g, Some("628111".into())));
        assert!(registry.connected_session(&t).is_some());

        assert!(registry.mark_closed(&t, g, SessionStatus::Disconnected));
        assert!(registry.connected_session(&t).is_none());
        assert!(registry.info(&t).phone_number.is_none());
    }

    #[test]
    fn force_close_returns_prior_status_and_handle() {
        let registry = SessionRegistry::new();
        let t = tenant("42");
        let g = proceed(&registry, &t);
        assert!(registry.finish_connect(&t, g, Arc::new(NoopSession)));
        let (prior, taken) = registry.force_close(&t, SessionStatus::Disconnected);
        assert_eq!(prior, SessionStatus::Connecting);
        assert!(taken.is_some());
        assert!(!registry.is_current(&t, g));
        assert_eq!(registry.status(&t), SessionStatus::Disconnected);

        // Closing an already-closed record reports no transition.
        let (prior, taken) = registry.force_close(&t, SessionStatus::Disconnected);
        assert_eq!(prior, SessionStatus::Disconnected);
        assert!(taken.is_none());
    }

    #[test]
    fn force_close_of_absent_tenant_is_a_no_op() {
        let registry = SessionRegistry::new();
        let t = tenant("ghost");
        let (prior, taken) = registry.force_close(&t, SessionStatus::Disconnected);
        assert_eq!(prior, SessionStatus::Disconnected);
        assert!(taken.is_none());
        assert_eq!(registry.status(&t), SessionStatus::Disconnected);
    }

    #[test]
    fn connected_marking_clears_pending_qr() {
        let registry = SessionRegistry::new();
        let t = tenant("42");
        let g = proceed(&registry, &t);
        assert!(registry.mark_qr(&t, g, "qr-payload".into()));
        assert_eq!(registry.pending_qr(&t).as_deref(), Some("qr-payload"));
        assert!(registry.mark_connected(&t, g, None));
        assert!(registry.pending_qr(&t).is_none());
    }

    #[test]
    fn connected_tenants_lists_only_connected() {
        let registry = SessionRegistry::new();
        let a = tenant("a");
        let b = tenant("b");
        let ga = proceed(&registry, &a);
        let _gb = proceed(&registry, &b);
        assert!(registry.mark_connected(&a, ga, None));
        let connected = registry.connected_tenants();
        assert_eq!(connected.len(), 1);
        assert_eq!(connected[0].as_str(), "a");
    }

    #[tokio::test]
    async fn qr_signal_wakes_waiters_on_mark_qr() {
        let registry = Arc::new(SessionRegistry::new());
        let t = tenant("42");
        let g = proceed(&registry, &t);
        let signal = registry.qr_signal(&t).unwrap();

        let waiter = tokio::spawn(async move { signal.notified().await });
        tokio::task::yield_now().await;
        assert!(registry.mark_qr(&t, g, "qr".into()));
        waiter.await.unwrap();
    }
}
