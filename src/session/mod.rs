//! Session core and dispatcher.
//!
//! # Data Flow
//! ```text
//! TransportEvent::Frame
//!     → read loop (one task per session, arrival order)
//!     → codec decode ── failure ──▶ ProtocolException (correlated if possible)
//!     → Core protocol            → version's CoreHandler (handshake, close, ping, auth)
//!     → correlated               → CorrelationTracker → PendingResponse
//!     → push (Change/Delete)     → SubscriptionRegistry → SubscriptionHandle
//!     → otherwise                → HandlerRegistry.resolve(protocol, local role)
//!
//! Session::send / request / respond / subscribe
//!     → outbound lock: id, encode, register, write
//! ```
//!
//! # Lifecycle
//! `Closed → Opening → Open → Closing → Closed`. Closing stops new sends,
//! cancels pending requests, clears subscriptions, stops the keepalive and
//! only then drops the transport.
//!
//! # Design Decisions
//! - `Session` is a cheap clone over shared state; handlers receive `&Session`
//! - Handlers and background tasks close through `request_close`, which never
//!   waits on the task that called it
//! - The handler registry is frozen once a transport is attached

mod engine;
mod handshake;
mod keepalive;
mod outbound;
mod phase;

use thiserror::Error;

use crate::capabilities::{EndpointDescriptor, NegotiationError};
use crate::codec::{CodecError, Encoding};
use crate::config::{EndpointConfig, SessionConfig};
use crate::correlation::{RequestError, TrackerError};
use crate::error::{ErrorCode, ProtocolFault};
use crate::messages::{MessageKind, Protocol, Role};
use crate::registry::RegistryError;
use crate::subscription::SubscriptionError;
use crate::transport::TransportError;
use crate::version::EtpVersion;

pub use engine::Session;
pub use phase::SessionPhase;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,
    #[error("session is {0}, not open")]
    NotOpen(SessionPhase),
    #[error("protocol {0} was not negotiated for this session")]
    UnsupportedProtocol(Protocol),
    #[error("{0} is not defined for ETP {1}")]
    UnsupportedMessage(MessageKind, EtpVersion),
    #[error("{0} is described by the catalog; send its typed body instead of Raw")]
    RawForCataloguedProtocol(Protocol),
    #[error("{0} is not a request")]
    NotARequest(MessageKind),
    #[error("{0} is not a notification push")]
    NotAPush(MessageKind),
    #[error("subscription requests go through subscribe()")]
    SubscriptionRequest,
    #[error("session already attached to a transport")]
    AlreadyStarted,
    #[error("operation not available to the {0} side")]
    WrongRole(Role),
    #[error("authorization rejected (challenges: {0:?})")]
    AuthorizationRejected(Vec<String>),
    #[error("session did not open in time")]
    OpenTimeout,
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<SessionError> for ProtocolFault {
    fn from(err: SessionError) -> Self {
        let code = match &err {
            SessionError::UnsupportedProtocol(_) => ErrorCode::UnsupportedProtocol,
            SessionError::UnsupportedMessage(..)
            | SessionError::NotARequest(_)
            | SessionError::RawForCataloguedProtocol(_) => {
                ErrorCode::InvalidMessageType
            }
            SessionError::Codec(_) => ErrorCode::InvalidMessage,
            SessionError::Subscription(SubscriptionError::Duplicate(_)) => {
                ErrorCode::RequestUuidRejected
            }
            SessionError::Subscription(SubscriptionError::Unknown(_)) => ErrorCode::NotFound,
            SessionError::Tracker(TrackerError::TooManyPending(_)) => ErrorCode::LimitExceeded,
            SessionError::Negotiation(e) => e.error_code(),
            _ => ErrorCode::InvalidState,
        };
        ProtocolFault::new(code, err.to_string())
    }
}

/// How a session is built: which side it plays and what it declares.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub role: Role,
    pub version: EtpVersion,
    pub encoding: Encoding,
    pub endpoint: EndpointDescriptor,
    pub config: SessionConfig,
}

impl SessionOptions {
    pub fn client(version: EtpVersion, encoding: Encoding) -> Self {
        Self::new(Role::Client, version, encoding)
    }

    pub fn server(version: EtpVersion, encoding: Encoding) -> Self {
        Self::new(Role::Server, version, encoding)
    }

    fn new(role: Role, version: EtpVersion, encoding: Encoding) -> Self {
        Self {
            role,
            version,
            encoding,
            endpoint: EndpointDescriptor::from_config(&EndpointConfig::default()),
            config: SessionConfig::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: EndpointDescriptor) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_errors_map_to_exception_codes() {
        let fault = ProtocolFault::from(SessionError::UnsupportedProtocol(Protocol::STORE));
        assert_eq!(fault.code, ErrorCode::UnsupportedProtocol);

        let fault = ProtocolFault::from(SessionError::Subscription(SubscriptionError::Duplicate(
            "k".into(),
        )));
        assert_eq!(fault.code, ErrorCode::RequestUuidRejected);

        let fault = ProtocolFault::from(SessionError::NotOpen(SessionPhase::Opening));
        assert_eq!(fault.code, ErrorCode::InvalidState);
        assert!(fault.message.contains("opening"));
    }
}
