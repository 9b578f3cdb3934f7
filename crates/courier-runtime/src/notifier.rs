//! Backend webhook notification.
//!
//! Every gateway event is forwarded to the backend as
//! `POST { "event": <name>, ...payload }` with the configured `x-api-key`
//! header. Delivery is best-effort: failures are logged, never retried,
//! and never surfaced to the code path that produced the event.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use courier_settings::WebhookSettings;

/// Forwards gateway events to the tenant backend.
///
/// `notify` returns the backend's JSON response body on a 2xx reply —
/// message relay uses it to resolve senders to customer ids — and `None`
/// on any failure.
#[async_trait]
pub trait BackendNotifier: Send + Sync {
    /// Deliver one event. Never errors; failure means `None`.
    async fn notify(&self, event: &str, payload: Value) -> Option<Value>;
}

/// HTTP webhook implementation of [`BackendNotifier`].
pub struct HttpBackendNotifier {
    client: reqwest::Client,
    settings: WebhookSettings,
}

impl HttpBackendNotifier {
    /// Create a notifier posting to the configured webhook endpoint.
    pub fn new(settings: WebhookSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }
}

#[async_trait]
impl BackendNotifier for HttpBackendNotifier {
    async fn notify(&self, event: &str, payload: Value) -> Option<Value> {
        let mut body = serde_json::Map::new();
        let _ = body.insert("event".to_string(), json!(event));
        if let Value::Object(fields) = payload {
            body.extend(fields);
        }

        let result = self
            .client
            .post(&self.settings.url)
            .header("x-api-key", &self.settings.api_key)
            .json(&Value::Object(body))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(event, "backend notified");
                response.json().await.ok()
            }
            Ok(response) => {
                warn!(event, status = %response.status(), "backend rejected notification");
                None
            }
            Err(e) => {
                warn!(event, error = %e, "backend webhook unreachable");
                None
            }
        }
    }
}
