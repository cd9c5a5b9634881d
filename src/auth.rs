//! Connection-time authentication.
//!
//! Credentials travel in the HTTP `Authorization` header of the WebSocket
//! upgrade. The server checks them before upgrading; the session only ever
//! sees a pre-authenticated transport.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::config::{AuthConfig, AuthMode};

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { username: String, password: String },
    Bearer(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    Missing,
    #[error("malformed Authorization header: {0}")]
    Malformed(String),
    #[error("unsupported authorization scheme {0}")]
    UnsupportedScheme(String),
    #[error("invalid credentials")]
    Rejected,
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Credentials::Bearer(token.into())
    }

    /// Parses an `Authorization` header value.
    pub fn parse(value: &str) -> Result<Self, AuthError> {
        let (scheme, rest) = value
            .trim()
            .split_once(' ')
            .ok_or_else(|| AuthError::Malformed("expected '<scheme> <credentials>'".into()))?;
        let rest = rest.trim();

        if scheme.eq_ignore_ascii_case("basic") {
            let decoded = STANDARD
                .decode(rest)
                .map_err(|e| AuthError::Malformed(e.to_string()))?;
            let decoded = String::from_utf8(decoded)
                .map_err(|_| AuthError::Malformed("credentials are not utf-8".into()))?;
            let (username, password) = decoded
                .split_once(':')
                .ok_or_else(|| AuthError::Malformed("expected 'user:password'".into()))?;
            Ok(Credentials::basic(username, password))
        } else if scheme.eq_ignore_ascii_case("bearer") {
            if rest.is_empty() {
                return Err(AuthError::Malformed("empty bearer token".into()));
            }
            Ok(Credentials::bearer(rest))
        } else {
            Err(AuthError::UnsupportedScheme(scheme.to_string()))
        }
    }

    /// Renders the `Authorization` header value.
    pub fn to_header_value(&self) -> String {
        match self {
            Credentials::Basic { username, password } => {
                format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
            }
            Credentials::Bearer(token) => format!("Bearer {token}"),
        }
    }

    /// Username for basic credentials, "bearer" otherwise.
    pub fn principal(&self) -> &str {
        match self {
            Credentials::Basic { username, .. } => username,
            Credentials::Bearer(_) => "bearer",
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Bearer(_) => f.debug_tuple("Bearer").field(&"<redacted>").finish(),
        }
    }
}

/// Checks an upgrade request's `Authorization` header against the config.
///
/// With `mode = "none"` a supplied header is still parsed and passed on.
pub fn authenticate(config: &AuthConfig, header: Option<&str>) -> Result<Option<Credentials>, AuthError> {
    let credentials = header.map(Credentials::parse).transpose();
    match config.mode {
        AuthMode::None => Ok(credentials.ok().flatten()),
        AuthMode::Basic => match credentials?.ok_or(AuthError::Missing)? {
            Credentials::Basic { username, password }
                if username == config.username && password == config.password =>
            {
                Ok(Some(Credentials::Basic { username, password }))
            }
            Credentials::Basic { .. } => Err(AuthError::Rejected),
            Credentials::Bearer(_) => Err(AuthError::UnsupportedScheme("Bearer".into())),
        },
        AuthMode::Bearer => match credentials?.ok_or(AuthError::Missing)? {
            Credentials::Bearer(token) if config.bearer_tokens.iter().any(|t| *t == token) => {
                Ok(Some(Credentials::Bearer(token)))
            }
            Credentials::Bearer(_) => Err(AuthError::Rejected),
            Credentials::Basic { .. } => Err(AuthError::UnsupportedScheme("Basic".into())),
        },
    }
}

/// `WWW-Authenticate` challenge for a mode, if it has one.
pub fn challenge(mode: AuthMode) -> Option<&'static str> {
    match mode {
        AuthMode::None => None,
        AuthMode::Basic => Some("Basic realm=\"etp\""),
        AuthMode::Bearer => Some("Bearer"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_config() -> AuthConfig {
        AuthConfig {
            mode: AuthMode::Basic,
            username: "witsml".into(),
            password: "s3cret".into(),
            bearer_tokens: Vec::new(),
        }
    }

    #[test]
    fn header_values_parse_back() {
        for credentials in [Credentials::basic("witsml", "pa:ss"), Credentials::bearer("abc.def")] {
            let header = credentials.to_header_value();
            assert_eq!(Credentials::parse(&header).unwrap(), credentials);
        }
        assert_eq!(
            Credentials::basic("u", "p").to_header_value(),
            "Basic dTpw"
        );
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert!(matches!(Credentials::parse("Basic"), Err(AuthError::Malformed(_))));
        assert!(matches!(Credentials::parse("Basic !!!"), Err(AuthError::Malformed(_))));
        assert!(matches!(
            Credentials::parse("Digest abc"),
            Err(AuthError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn basic_mode_checks_username_and_password() {
        let config = basic_config();
        let good = Credentials::basic("witsml", "s3cret").to_header_value();
        let bad = Credentials::basic("witsml", "nope").to_header_value();

        assert!(authenticate(&config, Some(&good)).unwrap().is_some());
        assert_eq!(authenticate(&config, Some(&bad)), Err(AuthError::Rejected));
        assert_eq!(authenticate(&config, None), Err(AuthError::Missing));
    }

    #[test]
    fn bearer_mode_checks_the_token_list() {
        let config = AuthConfig {
            mode: AuthMode::Bearer,
            bearer_tokens: vec!["t1".into(), "t2".into()],
            ..AuthConfig::default()
        };
        assert!(authenticate(&config, Some("Bearer t2")).is_ok());
        assert_eq!(authenticate(&config, Some("Bearer t3")), Err(AuthError::Rejected));
    }

    #[test]
    fn none_mode_accepts_anything() {
        let config = AuthConfig::default();
        assert_eq!(authenticate(&config, None), Ok(None));
        assert_eq!(authenticate(&config, Some("garbage")), Ok(None));
        assert!(format!("{:?}", Credentials::bearer("hidden")).contains("redacted"));
    }
}
