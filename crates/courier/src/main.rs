//! Courier gateway entrypoint.
//!
//! Wires settings, credential store, protocol connector, backend
//! notifier, and lifecycle manager together, resumes previously
//! authenticated tenants in the background, and serves the HTTP/WS
//! surface until interrupted.

#![deny(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use courier_runtime::{
    EventFanout, HttpBackendNotifier, LifecycleManager, SessionRegistry, SweepOutcome,
};
use courier_server::AppState;
use courier_store::CredentialStore;
use courier_wire::testutil::MockConnector;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_tracing();
    let settings = courier_settings::get_settings();
    tracing::info!(version = %settings.version, "courier gateway starting");

    let store = CredentialStore::new(&settings.gateway.auth_dir);
    let notifier = Arc::new(HttpBackendNotifier::new(settings.webhook.clone()));
    // Placeholder protocol capability until a real client is linked in;
    // every seam above it programs against the WireConnector trait.
    let connector = Arc::new(MockConnector::new());

    let manager = LifecycleManager::new(
        Arc::new(SessionRegistry::new()),
        Arc::new(EventFanout::new()),
        notifier,
        store,
        connector,
        settings.gateway.clone(),
    );

    // Resume previously authenticated tenants without blocking startup.
    let sweeper = Arc::clone(&manager);
    let _ = tokio::spawn(async move {
        let outcomes = sweeper.auto_reconnect_all().await;
        let started = outcomes
            .iter()
            .filter(|(_, o)| *o == SweepOutcome::Started)
            .count();
        let reauth = outcomes
            .iter()
            .filter(|(_, o)| *o == SweepOutcome::ReauthRequired)
            .count();
        let failed = outcomes
            .iter()
            .filter(|(_, o)| *o == SweepOutcome::Failed)
            .count();
        tracing::info!(
            total = outcomes.len(),
            started,
            reauth_required = reauth,
            failed,
            "reconnect sweep finished"
        );
    });

    let addr: SocketAddr = format!("{}:{}", settings.server.bind, settings.server.port)
        .parse()
        .map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid bind address: {e}"),
            )
        })?;
    courier_server::serve(AppState::new(manager), addr).await
}
