//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and cross-field
//! rules. Every problem is reported, not just the first.

use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::codec::Encoding;
use crate::config::schema::{AuthMode, EtpConfig};
use crate::version::EtpVersion;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &EtpConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if !config.listener.path.starts_with('/') {
        errors.push(ValidationError::new("listener.path", "must start with '/'"));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    if config.endpoint.supported_formats.is_empty() {
        errors.push(ValidationError::new("endpoint.supported_formats", "must not be empty"));
    }

    if config.session.request_timeout_secs == 0 {
        errors.push(ValidationError::new("session.request_timeout_secs", "must be greater than 0"));
    }
    if config.session.open_timeout_secs == 0 {
        errors.push(ValidationError::new("session.open_timeout_secs", "must be greater than 0"));
    }
    if config.session.max_pending_requests == 0 {
        errors.push(ValidationError::new("session.max_pending_requests", "must be greater than 0"));
    }

    match config.auth.mode {
        AuthMode::Basic if config.auth.username.is_empty() => {
            errors.push(ValidationError::new("auth.username", "required for basic auth"));
        }
        AuthMode::Bearer if config.auth.bearer_tokens.is_empty() => {
            errors.push(ValidationError::new("auth.bearer_tokens", "at least one token is required"));
        }
        _ => {}
    }

    match Url::parse(&config.client.url) {
        Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
        Ok(url) => errors.push(ValidationError::new(
            "client.url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("client.url", e.to_string())),
    }
    if config.client.version.parse::<EtpVersion>().is_err() {
        errors.push(ValidationError::new("client.version", "must be 1.1 or 1.2"));
    }
    if config.client.encoding.parse::<Encoding>().is_err() {
        errors.push(ValidationError::new("client.encoding", "must be binary or json"));
    }
    if config.client.connect_attempts == 0 {
        errors.push(ValidationError::new("client.connect_attempts", "must be at least 1"));
    }

    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new("observability.log_format", "must be pretty or json"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "is not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&EtpConfig::default()).is_ok());
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = EtpConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.listener.path = "etp".into();
        config.client.url = "http://localhost".into();
        config.client.version = "2.0".into();
        config.auth.mode = AuthMode::Bearer;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "listener.path",
                "auth.bearer_tokens",
                "client.url",
                "client.version",
            ]
        );
    }
}
