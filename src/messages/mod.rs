//! Typed ETP message bodies.
//!
//! # Data Flow
//! ```text
//! wire frame
//!     → codec (header + catalog lookup → MessageKind)
//!     → MessageBody::from_json / from_binary (explicit match, no reflection)
//!     → EtpMessage { header, body, timestamp }
//!     → session dispatch
//! ```
//!
//! # Design Decisions
//! - One fieldless `MessageKind` per body type; the per-version catalog maps
//!   kinds to (protocol, messageType) pairs
//! - Bodies are plain serde structs shared by both ETP versions
//! - Binary bodies use postcard, JSON bodies use serde_json
//! - Protocols outside the catalog travel as `Raw`, payload untouched

pub mod core;
pub mod discovery;
pub mod notification;
pub mod protocol;
pub mod raw;
pub mod store;
pub mod value;

use std::fmt;

use chrono::{DateTime, Utc};

use crate::codec::header::MessageHeader;

pub use self::core::*;
pub use self::discovery::*;
pub use self::notification::*;
pub use self::protocol::{Protocol, Role};
pub use self::raw::{Raw, RawPayload};
pub use self::store::*;
pub use self::value::DataValue;

macro_rules! message_bodies {
    ($($variant:ident),+ $(,)?) => {
        /// Discriminant of every body type the devkit understands.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum MessageKind {
            $($variant,)+
            Raw,
        }

        impl MessageKind {
            pub const fn name(self) -> &'static str {
                match self {
                    $(MessageKind::$variant => stringify!($variant),)+
                    MessageKind::Raw => "Raw",
                }
            }
        }

        #[derive(Debug, Clone, PartialEq)]
        pub enum MessageBody {
            $($variant($variant),)+
            Raw(Raw),
        }

        impl MessageBody {
            pub fn kind(&self) -> MessageKind {
                match self {
                    $(MessageBody::$variant(_) => MessageKind::$variant,)+
                    MessageBody::Raw(_) => MessageKind::Raw,
                }
            }

            pub(crate) fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
                match self {
                    $(MessageBody::$variant(body) => serde_json::to_value(body),)+
                    MessageBody::Raw(body) => body.to_json(),
                }
            }

            pub(crate) fn to_binary(&self) -> Result<Vec<u8>, postcard::Error> {
                match self {
                    $(MessageBody::$variant(body) => postcard::to_allocvec(body),)+
                    MessageBody::Raw(body) => body.to_binary(),
                }
            }

            pub(crate) fn from_json(
                header: &MessageHeader,
                kind: MessageKind,
                value: serde_json::Value,
            ) -> Result<Self, serde_json::Error> {
                Ok(match kind {
                    $(MessageKind::$variant => MessageBody::$variant(serde_json::from_value(value)?),)+
                    MessageKind::Raw => MessageBody::Raw(Raw::from_wire_json(header, value)),
                })
            }

            pub(crate) fn from_binary(
                header: &MessageHeader,
                kind: MessageKind,
                bytes: &[u8],
            ) -> Result<Self, postcard::Error> {
                Ok(match kind {
                    $(MessageKind::$variant => MessageBody::$variant(postcard::from_bytes(bytes)?),)+
                    MessageKind::Raw => MessageBody::Raw(Raw::from_wire_binary(header, bytes)),
                })
            }
        }

        $(
            impl From<$variant> for MessageBody {
                fn from(body: $variant) -> Self {
                    MessageBody::$variant(body)
                }
            }
        )+

        impl From<Raw> for MessageBody {
            fn from(body: Raw) -> Self {
                MessageBody::Raw(body)
            }
        }
    };
}

message_bodies! {
    RequestSession,
    OpenSession,
    CloseSession,
    RenewSecurityToken,
    Authorize,
    AuthorizeResponse,
    Ping,
    Pong,
    ProtocolException,
    Acknowledge,
    GetResources,
    GetResourcesResponse,
    GetObject,
    PutObject,
    DeleteObject,
    Object,
    NotificationRequest,
    ChangeNotification,
    DeleteNotification,
    CancelNotification,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl MessageBody {
    /// Subscription key carried by notification traffic.
    pub fn subscription_key(&self) -> Option<&str> {
        match self {
            MessageBody::NotificationRequest(body) => Some(&body.request.uuid),
            MessageBody::ChangeNotification(body) => Some(&body.request_uuid),
            MessageBody::DeleteNotification(body) => Some(&body.request_uuid),
            MessageBody::CancelNotification(body) => Some(&body.request_uuid),
            _ => None,
        }
    }

    /// Unsolicited store-to-customer pushes.
    pub fn is_push(&self) -> bool {
        matches!(
            self,
            MessageBody::ChangeNotification(_) | MessageBody::DeleteNotification(_)
        )
    }
}

/// A decoded or outgoing message. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct EtpMessage {
    header: MessageHeader,
    body: MessageBody,
    timestamp: DateTime<Utc>,
}

impl EtpMessage {
    pub fn new(header: MessageHeader, body: impl Into<MessageBody>) -> Self {
        Self {
            header,
            body: body.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// When the message was built locally or received from the transport.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn into_body(self) -> MessageBody {
        self.body
    }

    pub fn into_parts(self) -> (MessageHeader, MessageBody) {
        (self.header, self.body)
    }
}
