//! Scriptable protocol doubles shared by runtime and server tests.
//!
//! [`MockConnector`] opens [`MockSession`]s and hands the test a
//! [`MockHandle`] for driving wire events into the session's stream. It
//! records connect counts per tenant so dedup invariants are assertable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use courier_core::{TenantId, WireError};
use courier_store::Credentials;

use crate::session::{WireConnection, WireConnector, WireEvent, WireSession};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Recording stand-in for a live protocol session.
#[derive(Default)]
pub struct MockSession {
    sent: Mutex<Vec<(String, String)>>,
    acked: Mutex<Vec<String>>,
    logged_out: AtomicBool,
    fail_sends: AtomicBool,
    next_id: AtomicU64,
}

impl MockSession {
    /// Messages sent through this session as `(jid, text)` pairs.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }

    /// Message ids acknowledged through this session.
    pub fn acked(&self) -> Vec<String> {
        self.acked.lock().clone()
    }

    /// Whether `logout` was called.
    pub fn logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }

    /// Make subsequent sends fail.
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl WireSession for MockSession {
    async fn send_text(&self, jid: &str, text: &str) -> Result<String, WireError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(WireError::Request("scripted send failure".into()));
        }
        self.sent.lock().push((jid.to_string(), text.to_string()));
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("mock-msg-{n}"))
    }

    async fn ack(&self, message_ids: &[String]) -> Result<(), WireError> {
        self.acked.lock().extend_from_slice(message_ids);
        Ok(())
    }

    async fn logout(&self) -> Result<(), WireError> {
        self.logged_out.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Test-side handle to one opened mock session.
#[derive(Clone)]
pub struct MockHandle {
    /// The session the lifecycle manager holds.
    pub session: Arc<MockSession>,
    tx: mpsc::Sender<WireEvent>,
}

impl MockHandle {
    /// Drive a wire event into the session's stream.
    pub async fn emit(&self, event: WireEvent) {
        let _ = self.tx.send(event).await;
    }
}

#[derive(Default)]
struct ConnectorState {
    fail_tenants: HashMap<String, String>,
    queued_events: HashMap<String, Vec<WireEvent>>,
    handles: HashMap<String, Vec<MockHandle>>,
    connect_counts: HashMap<String, usize>,
    captured_credentials: HashMap<String, Credentials>,
}

/// Scriptable [`WireConnector`] for tests.
#[derive(Default)]
pub struct MockConnector {
    state: Mutex<ConnectorState>,
}

impl MockConnector {
    /// A connector that opens sessions successfully with no queued events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future connect for `tenant` fail with the given reason.
    pub fn fail_connects(&self, tenant: &TenantId, reason: &str) {
        let _ = self
            .state
            .lock()
            .fail_tenants
            .insert(tenant.to_string(), reason.to_string());
    }

    /// Queue events emitted automatically on the tenant's next connect.
    pub fn queue_events(&self, tenant: &TenantId, events: Vec<WireEvent>) {
        self.state
            .lock()
            .queued_events
            .entry(tenant.to_string())
            .or_default()
            .extend(events);
    }

    /// How many times `connect` was called for the tenant.
    pub fn connect_count(&self, tenant: &TenantId) -> usize {
        self.state
            .lock()
            .connect_counts
            .get(tenant.as_str())
            .copied()
            .unwrap_or(0)
    }

    /// Handle to the most recently opened session for the tenant.
    pub fn last_handle(&self, tenant: &TenantId) -> Option<MockHandle> {
        self.state
            .lock()
            .handles
            .get(tenant.as_str())
            .and_then(|handles| handles.last().cloned())
    }

    /// Drop every held sender for the tenant, ending its event streams.
    pub fn close_stream(&self, tenant: &TenantId) {
        let _ = self.state.lock().handles.remove(tenant.as_str());
    }

    /// Credentials the last connect for the tenant was opened with.
    pub fn last_credentials(&self, tenant: &TenantId) -> Option<Credentials> {
        self.state
            .lock()
            .captured_credentials
            .get(tenant.as_str())
            .cloned()
    }
}

#[async_trait]
impl WireConnector for MockConnector {
    async fn connect(
        &self,
        tenant: &TenantId,
        credentials: Credentials,
    ) -> Result<WireConnection, WireError> {
        let (handle, connection, queued) = {
            let mut state = self.state.lock();
            *state
                .connect_counts
                .entry(tenant.to_string())
                .or_insert(0) += 1;
            let _ = state
                .captured_credentials
                .insert(tenant.to_string(), credentials);
            if let Some(reason) = state.fail_tenants.get(tenant.as_str()) {
                return Err(WireError::ConnectFailed(reason.clone()));
            }

            let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            let session = Arc::new(MockSession::default());
            let handle = MockHandle {
                session: Arc::clone(&session),
                tx,
            };
            state
                .handles
                .entry(tenant.to_string())
                .or_default()
                .push(handle.clone());
            let queued = state
                .queued_events
                .remove(tenant.as_str())
                .unwrap_or_default();
            (
                handle,
                WireConnection {
                    session,
                    events: rx,
                },
                queued,
            )
        };
        for event in queued {
            handle.emit(event).await;
        }
        Ok(connection)
    }
}
