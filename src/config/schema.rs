//! Configuration schema definitions.
//!
//! Every section derives Serde traits and falls back to defaults, so an empty
//! file is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capabilities::{names, CapabilitySet};

/// Root configuration for an ETP endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EtpConfig {
    /// WebSocket listener (server side).
    pub listener: ListenerConfig,

    /// What this endpoint declares during the handshake.
    pub endpoint: EndpointConfig,

    /// Per-session timeouts and limits.
    pub session: SessionConfig,

    /// Connection-time authentication.
    pub auth: AuthConfig,

    /// Outbound connection settings (client side).
    pub client: ClientConfig,

    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:9000").
    pub bind_address: String,

    /// HTTP path upgraded to WebSocket.
    pub path: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent sessions.
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9000".to_string(),
            path: "/".to_string(),
            tls: None,
            max_connections: 1000,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub application_name: String,
    pub application_version: String,
    pub supported_formats: Vec<String>,
    pub supported_compression: Vec<String>,
    pub supported_data_objects: Vec<String>,

    /// Advertised as the `MaxResponseCount` endpoint capability.
    pub max_response_count: i64,

    /// Advertised as the `MaxWebSocketMessagePayloadSize` endpoint capability.
    pub max_message_size: i64,
}

impl EndpointConfig {
    pub fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new()
            .with(names::MAX_RESPONSE_COUNT, self.max_response_count)
            .with(names::MAX_WEBSOCKET_MESSAGE_PAYLOAD_SIZE, self.max_message_size)
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            application_name: "etp-devkit".to_string(),
            application_version: env!("CARGO_PKG_VERSION").to_string(),
            supported_formats: vec!["xml".to_string()],
            supported_compression: Vec::new(),
            supported_data_objects: Vec::new(),
            max_response_count: 10_000,
            max_message_size: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Default wait for a response to a request.
    pub request_timeout_secs: u64,

    /// Bound on the RequestSession/OpenSession roundtrip.
    pub open_timeout_secs: u64,

    /// ETP 1.2 ping interval; 0 disables keepalive.
    pub keepalive_interval_secs: u64,

    /// Upper bound on outstanding correlated requests.
    pub max_pending_requests: usize,
}

impl SessionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }

    pub fn keepalive_interval(&self) -> Option<Duration> {
        (self.keepalive_interval_secs > 0).then(|| Duration::from_secs(self.keepalive_interval_secs))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            open_timeout_secs: 10,
            keepalive_interval_secs: 0,
            max_pending_requests: 8192,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    None,
    Basic,
    Bearer,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub username: String,
    pub password: String,
    pub bearer_tokens: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server URL (`ws://` or `wss://`).
    pub url: String,

    /// "1.1" or "1.2".
    pub version: String,

    /// "binary" or "json".
    pub encoding: String,

    pub connect_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,

    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9000/".to_string(),
            version: "1.2".to_string(),
            encoding: "binary".to_string(),
            connect_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5000,
            username: None,
            password: None,
            token: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9100".to_string(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: EtpConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:9000");
        assert_eq!(config.endpoint.supported_formats, vec!["xml".to_string()]);
        assert_eq!(config.session.keepalive_interval(), None);
        assert_eq!(config.auth.mode, AuthMode::None);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: EtpConfig = toml::from_str(
            r#"
            [session]
            keepalive_interval_secs = 15

            [auth]
            mode = "bearer"
            bearer_tokens = ["t0k3n"]
            "#,
        )
        .unwrap();
        assert_eq!(config.session.keepalive_interval(), Some(Duration::from_secs(15)));
        assert_eq!(config.session.request_timeout_secs, 30);
        assert_eq!(config.auth.mode, AuthMode::Bearer);
        assert_eq!(
            config.endpoint.capabilities().get_long(names::MAX_RESPONSE_COUNT),
            Some(10_000)
        );
    }
}
