//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so the JSON
//! file may be partial — missing fields get their compiled default. Each
//! `Default` impl carries the production default values.

use serde::{Deserialize, Serialize};

/// Root settings for the Courier gateway.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourierSettings {
    /// Settings schema version.
    pub version: String,
    /// HTTP/WebSocket server settings.
    pub server: ServerSettings,
    /// Backend webhook settings.
    pub webhook: WebhookSettings,
    /// Session lifecycle timing and storage settings.
    pub gateway: GatewaySettings,
}

impl Default for CourierSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            server: ServerSettings::default(),
            webhook: WebhookSettings::default(),
            gateway: GatewaySettings::default(),
        }
    }
}

impl CourierSettings {
    /// Correct invalid values in place rather than rejecting the file.
    ///
    /// Zero delays would turn scheduled reconnects and the startup sweep
    /// into hot loops against the remote service, so they are floored.
    pub fn validate(&mut self) {
        fn floor_ms(val: &mut u64, min: u64, name: &str) {
            if *val < min {
                tracing::warn!("{name} too small ({val}ms), flooring to {min}ms");
                *val = min;
            }
        }
        floor_ms(&mut self.gateway.reconnect_delay_ms, 100, "reconnect_delay_ms");
        floor_ms(
            &mut self.gateway.sweep_tenant_delay_ms,
            50,
            "sweep_tenant_delay_ms",
        );
        if self.gateway.default_country_code.is_empty()
            || !self
                .gateway
                .default_country_code
                .chars()
                .all(|c| c.is_ascii_digit())
        {
            tracing::warn!(
                code = %self.gateway.default_country_code,
                "invalid default country code, resetting to 62"
            );
            self.gateway.default_country_code = "62".to_string();
        }
    }
}

/// Network settings for the HTTP/WebSocket surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub bind: String,
    /// Listen port.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5005,
        }
    }
}

/// Backend webhook endpoint and credentials.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookSettings {
    /// Endpoint URL that receives `{event, ...payload}` notifications.
    pub url: String,
    /// Value of the `x-api-key` header.
    pub api_key: String,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost/api/wa/webhook".to_string(),
            api_key: String::new(),
        }
    }
}

/// Timing, storage, and addressing settings for the session lifecycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// Fixed delay before retrying a transient disconnect.
    pub reconnect_delay_ms: u64,
    /// How long a QR request waits for the challenge to materialize.
    pub qr_wait_timeout_ms: u64,
    /// Inter-tenant throttle during the startup reconnect sweep.
    pub sweep_tenant_delay_ms: u64,
    /// Root directory for per-tenant credential blobs.
    pub auth_dir: String,
    /// Country code prepended when normalizing local phone numbers.
    pub default_country_code: String,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 5_000,
            qr_wait_timeout_ms: 3_000,
            sweep_tenant_delay_ms: 1_000,
            auth_dir: "./auth".to_string(),
            default_country_code: "62".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_constants() {
        let settings = CourierSettings::default();
        assert_eq!(settings.server.port, 5005);
        assert_eq!(settings.gateway.reconnect_delay_ms, 5_000);
        assert_eq!(settings.gateway.qr_wait_timeout_ms, 3_000);
        assert_eq!(settings.gateway.default_country_code, "62");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: CourierSettings =
            serde_json::from_str(r#"{"server": {"port": 9090}}"#).unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.bind, "0.0.0.0");
        assert_eq!(settings.gateway.reconnect_delay_ms, 5_000);
    }

    #[test]
    fn validate_floors_delays_and_resets_bad_country_code() {
        let mut settings = CourierSettings::default();
        settings.gateway.reconnect_delay_ms = 0;
        settings.gateway.default_country_code = "abc".to_string();
        settings.validate();
        assert_eq!(settings.gateway.reconnect_delay_ms, 100);
        assert_eq!(settings.gateway.default_country_code, "62");
    }
}
