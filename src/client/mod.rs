//! Outbound ETP connections.
//!
//! `EtpClient::connect` dials the server with retry and backoff, attaches a
//! client-side session and runs the RequestSession/OpenSession handshake.

use thiserror::Error;

use crate::auth::Credentials;
use crate::capabilities::EndpointDescriptor;
use crate::codec::{CodecError, Encoding};
use crate::config::{ClientConfig, EtpConfig, SessionConfig};
use crate::registry::HandlerRegistry;
use crate::resilience::calculate_backoff;
use crate::session::{Session, SessionError, SessionOptions};
use crate::transport::{websocket, TransportError, TransportHandle};
use crate::version::{EtpVersion, VersionError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error(transparent)]
    Encoding(#[from] CodecError),
    #[error("could not connect after {attempts} attempt(s): {source}")]
    Connect {
        attempts: u32,
        #[source]
        source: TransportError,
    },
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone)]
pub struct EtpClient {
    url: String,
    version: EtpVersion,
    encoding: Encoding,
    credentials: Option<Credentials>,
    endpoint: EndpointDescriptor,
    session: SessionConfig,
    connect_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl EtpClient {
    pub fn new(config: &EtpConfig) -> Result<Self, ClientError> {
        let client = &config.client;
        Ok(Self {
            url: client.url.clone(),
            version: client.version.parse()?,
            encoding: client.encoding.parse()?,
            credentials: credentials_from(client),
            endpoint: EndpointDescriptor::from_config(&config.endpoint),
            session: config.session.clone(),
            connect_attempts: client.connect_attempts.max(1),
            base_delay_ms: client.base_delay_ms,
            max_delay_ms: client.max_delay_ms,
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn version(&self) -> EtpVersion {
        self.version
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Connects, attaches a session over `registry` and opens it.
    pub async fn connect(&self, registry: HandlerRegistry) -> Result<Session, ClientError> {
        let transport = self.dial().await?;
        let options = SessionOptions::client(self.version, self.encoding)
            .with_endpoint(self.endpoint.clone())
            .with_config(self.session.clone());

        let session = Session::new(options, registry)?;
        session.attach(transport)?;
        session.open().await?;
        Ok(session)
    }

    async fn dial(&self) -> Result<TransportHandle, ClientError> {
        let mut last_error = None;
        for attempt in 0..self.connect_attempts {
            let delay = calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match websocket::connect(&self.url, self.version, self.encoding, self.credentials.as_ref()).await {
                Ok(transport) => {
                    tracing::info!(url = %self.url, attempt = attempt + 1, version = %self.version, "connected");
                    return Ok(transport);
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, attempt = attempt + 1, error = %e, "connect failed");
                    last_error = Some(e);
                }
            }
        }
        Err(ClientError::Connect {
            attempts: self.connect_attempts,
            source: last_error.unwrap_or_else(|| TransportError::Connect("no attempts made".into())),
        })
    }
}

/// A token wins over username/password.
fn credentials_from(config: &ClientConfig) -> Option<Credentials> {
    if let Some(token) = &config.token {
        return Some(Credentials::bearer(token.clone()));
    }
    match (&config.username, &config.password) {
        (Some(username), Some(password)) => Some(Credentials::basic(username.clone(), password.clone())),
        (Some(username), None) => Some(Credentials::basic(username.clone(), String::new())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_config() {
        let mut config = EtpConfig::default();
        config.client.version = "1.1".to_string();
        config.client.encoding = "json".to_string();
        config.client.token = Some("abc".to_string());

        let client = EtpClient::new(&config).unwrap();
        assert_eq!(client.version(), EtpVersion::V11);
        assert_eq!(client.encoding(), Encoding::Json);
        assert_eq!(client.credentials, Some(Credentials::bearer("abc")));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut config = EtpConfig::default();
        config.client.version = "2.0".to_string();
        assert!(matches!(EtpClient::new(&config), Err(ClientError::Version(_))));
    }

    #[tokio::test]
    async fn gives_up_after_the_configured_attempts() {
        let mut config = EtpConfig::default();
        config.client.connect_attempts = 2;
        config.client.base_delay_ms = 1;
        config.client.max_delay_ms = 2;
        // Port 9 (discard) is not expected to accept WebSocket upgrades.
        let client = EtpClient::new(&config).unwrap().with_url("ws://127.0.0.1:9/");

        let err = client.connect(HandlerRegistry::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::Connect { attempts: 2, .. }));
    }
}
