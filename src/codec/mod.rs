//! Wire encoding of ETP messages.
//!
//! # Data Flow
//! ```text
//! Binary (WebSocket binary frame):
//!     avro header → [avro header extension, 1.2 only] → postcard body
//!
//! JSON (WebSocket text frame):
//!     [header, body]  or  [header, {"extension": {...}}, body]
//!
//! Decode:
//!     frame → header.rs (HeaderCodec) → catalog lookup → MessageBody
//!                                        (uncatalogued protocol → Raw)
//! ```
//!
//! # Design Decisions
//! - The header is Avro-faithful so foreign endpoints can read it
//! - Decode failures keep the header when it could be read so the session
//!   can correlate the resulting ProtocolException

pub mod avro;
pub mod header;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::{ErrorCode, ProtocolFault};
use crate::messages::{EtpMessage, MessageBody, MessageKind, Protocol};
use crate::transport::Frame;
use crate::version::catalog::{ACKNOWLEDGE, PROTOCOL_EXCEPTION};
use crate::version::{EtpVersion, MessageCatalog, VersionAdapter};

pub use header::{HeaderCodec, HeaderExtension, MessageFlags, MessageHeader, MessageId};

/// Name of the HTTP header selecting the body encoding.
pub const ENCODING_HEADER: &str = "etp-encoding";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Binary,
    Json,
}

impl Encoding {
    pub const fn as_str(self) -> &'static str {
        match self {
            Encoding::Binary => "binary",
            Encoding::Json => "json",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" => Ok(Encoding::Binary),
            "json" => Ok(Encoding::Json),
            other => Err(CodecError::UnknownEncoding(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unexpected end of input")]
    Truncated,
    #[error("malformed variable-length integer")]
    InvalidVarint,
    #[error("value {0} out of range for {1}")]
    OutOfRange(i64, &'static str),
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,
    #[error("unsupported union branch {0}")]
    UnsupportedUnionBranch(i64),
    #[error("header extensions are not supported by ETP {0}")]
    ExtensionNotSupported(EtpVersion),
    #[error("unknown message type {message_type} for protocol {protocol}")]
    UnknownMessageType { protocol: Protocol, message_type: u32 },
    #[error("{0} is not defined for ETP {1}")]
    KindNotDefined(MessageKind, EtpVersion),
    #[error("expected a {expected} frame")]
    UnexpectedFrame { expected: Encoding },
    #[error("unknown encoding: {0}")]
    UnknownEncoding(String),
    #[error("malformed JSON envelope: {0}")]
    Envelope(String),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("binary body: {0}")]
    Body(#[from] postcard::Error),
}

/// A frame that could not be turned into a message.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct DecodeFailure {
    /// Present when the header decoded before the failure.
    pub header: Option<MessageHeader>,
    pub error: CodecError,
}

impl DecodeFailure {
    fn new(header: Option<MessageHeader>, error: impl Into<CodecError>) -> Self {
        Self {
            header,
            error: error.into(),
        }
    }

    /// The exception to report back to the sender.
    pub fn fault(&self) -> ProtocolFault {
        let code = match self.error {
            CodecError::UnknownMessageType { .. } => ErrorCode::InvalidMessageType,
            _ => ErrorCode::InvalidMessage,
        };
        ProtocolFault::new(code, self.error.to_string())
    }
}

/// Encodes and decodes whole messages for one session.
#[derive(Debug, Clone, Copy)]
pub struct MessageCodec {
    header: HeaderCodec,
    catalog: &'static MessageCatalog,
    encoding: Encoding,
}

impl MessageCodec {
    pub fn new(adapter: &dyn VersionAdapter, encoding: Encoding) -> Self {
        Self {
            header: adapter.header_codec(),
            catalog: adapter.catalog(),
            encoding,
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn encode(&self, message: &EtpMessage) -> Result<Frame, CodecError> {
        match self.encoding {
            Encoding::Binary => {
                let mut out = Vec::with_capacity(64);
                self.header.encode_binary(message.header(), &mut out)?;
                out.extend_from_slice(&message.body().to_binary()?);
                Ok(Frame::Binary(out))
            }
            Encoding::Json => {
                let mut parts = self.header.encode_json(message.header())?;
                parts.push(message.body().to_json()?);
                Ok(Frame::Text(serde_json::to_string(&parts)?))
            }
        }
    }

    pub fn decode(&self, frame: &Frame) -> Result<EtpMessage, DecodeFailure> {
        let expected = self.encoding;
        match (self.encoding, frame) {
            (Encoding::Binary, Frame::Binary(bytes)) => {
                let mut input = bytes.as_slice();
                let header = self
                    .header
                    .decode_binary(&mut input)
                    .map_err(|e| DecodeFailure::new(None, e))?;
                let kind = self.kind_for(&header)?;
                match MessageBody::from_binary(&header, kind, input) {
                    Ok(body) => Ok(EtpMessage::new(header, body)),
                    Err(e) => Err(DecodeFailure::new(Some(header), e)),
                }
            }
            (Encoding::Json, Frame::Text(text)) => {
                let envelope: Vec<Value> =
                    serde_json::from_str(text).map_err(|e| DecodeFailure::new(None, e))?;
                let (header, body) = self
                    .header
                    .decode_json(envelope)
                    .map_err(|e| DecodeFailure::new(None, e))?;
                let kind = self.kind_for(&header)?;
                match MessageBody::from_json(&header, kind, body) {
                    Ok(body) => Ok(EtpMessage::new(header, body)),
                    Err(e) => Err(DecodeFailure::new(Some(header), e)),
                }
            }
            _ => Err(DecodeFailure::new(None, CodecError::UnexpectedFrame { expected })),
        }
    }

    fn kind_for(&self, header: &MessageHeader) -> Result<MessageKind, DecodeFailure> {
        if let Some(kind) = self.catalog.lookup(header.protocol, header.message_type) {
            return Ok(kind);
        }
        if !self.catalog.knows_protocol(header.protocol) {
            // Negotiation, not the codec, decides whether the session accepts it.
            return Ok(match header.message_type {
                PROTOCOL_EXCEPTION => MessageKind::ProtocolException,
                ACKNOWLEDGE => MessageKind::Acknowledge,
                _ => MessageKind::Raw,
            });
        }
        let error = CodecError::UnknownMessageType {
            protocol: header.protocol,
            message_type: header.message_type,
        };
        Err(DecodeFailure::new(Some(header.clone()), error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{GetResources, GetResourcesResponse, ProtocolException, Raw, Resource};
    use crate::version::adapter_for;
    use std::collections::BTreeMap;

    fn resource(uri: &str) -> Resource {
        Resource {
            uri: uri.to_string(),
            name: "Well 01".to_string(),
            content_type: "application/x-witsml+xml;version=1.4.1.1;type=well".to_string(),
            resource_type: "DataObject".to_string(),
            has_children: 0,
            uuid: Some("b6a7c0b3".to_string()),
            last_changed: 1_700_000_000_000_000,
            custom_data: BTreeMap::new(),
        }
    }

    fn sample(version: EtpVersion) -> EtpMessage {
        let message_type = adapter_for(version)
            .catalog()
            .entry(MessageKind::GetResourcesResponse)
            .map(|entry| entry.message_type)
            .unwrap();
        let header = MessageHeader::new(
            Protocol::DISCOVERY,
            message_type,
            4,
            MessageFlags::MULTI_PART | MessageFlags::FINAL_PART,
        )
        .with_message_id(9);
        EtpMessage::new(
            header,
            GetResourcesResponse {
                resources: vec![resource("eml:///well(1)")],
            },
        )
    }

    #[test]
    fn messages_survive_every_version_and_encoding() {
        for version in [EtpVersion::V11, EtpVersion::V12] {
            for encoding in [Encoding::Binary, Encoding::Json] {
                let codec = MessageCodec::new(adapter_for(version).as_ref(), encoding);
                let message = sample(version);
                let frame = codec.encode(&message).unwrap();
                let decoded = codec.decode(&frame).unwrap();
                assert_eq!(decoded.header(), message.header());
                assert_eq!(decoded.body(), message.body());
            }
        }
    }

    #[test]
    fn json_frames_are_arrays() {
        let codec = MessageCodec::new(adapter_for(EtpVersion::V11).as_ref(), Encoding::Json);
        let header = MessageHeader::new(Protocol::DISCOVERY, 1, 0, MessageFlags::FINAL_PART)
            .with_message_id(2);
        let frame = codec
            .encode(&EtpMessage::new(header, GetResources { uri: "/".into() }))
            .unwrap();
        let Frame::Text(text) = frame else {
            panic!("json codec produced a binary frame");
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value[1], serde_json::json!({ "uri": "/" }));
    }

    #[test]
    fn wrong_frame_type_is_rejected() {
        let codec = MessageCodec::new(adapter_for(EtpVersion::V12).as_ref(), Encoding::Binary);
        let failure = codec.decode(&Frame::Text("[]".into())).unwrap_err();
        assert!(failure.header.is_none());
        assert_eq!(failure.fault().code, ErrorCode::InvalidMessage);
    }

    #[test]
    fn uncatalogued_protocols_decode_as_raw() {
        let codec = MessageCodec::new(adapter_for(EtpVersion::V11).as_ref(), Encoding::Binary);
        let header_codec = HeaderCodec::new(EtpVersion::V11);

        let mut out = Vec::new();
        let header = MessageHeader::new(Protocol::GROWING_OBJECT, 1, 0, MessageFlags::NONE)
            .with_message_id(5);
        header_codec.encode_binary(&header, &mut out).unwrap();
        out.extend_from_slice(&[7, 8, 9]);
        let message = codec.decode(&Frame::Binary(out)).unwrap();
        assert_eq!(message.header(), &header);
        assert_eq!(
            message.body(),
            &MessageBody::Raw(Raw::binary(Protocol::GROWING_OBJECT, 1, vec![7, 8, 9]))
        );

        let exception = EtpMessage::new(
            MessageHeader::new(Protocol::GROWING_OBJECT, 1000, 5, MessageFlags::FINAL_PART)
                .with_message_id(6),
            ProtocolException {
                error_code: 5,
                error_message: "no such object".into(),
            },
        );
        let decoded = codec.decode(&codec.encode(&exception).unwrap()).unwrap();
        assert_eq!(decoded.kind(), MessageKind::ProtocolException);
    }

    #[test]
    fn raw_json_bodies_pass_through_untouched() {
        let codec = MessageCodec::new(adapter_for(EtpVersion::V12).as_ref(), Encoding::Json);
        let header = MessageHeader::new(Protocol(24), 3, 0, MessageFlags::NONE).with_message_id(2);
        let body = serde_json::json!({ "uri": "eml:///well(1)", "count": 4 });
        let message = EtpMessage::new(header, Raw::json(Protocol(24), 3, body.clone()));

        let decoded = codec.decode(&codec.encode(&message).unwrap()).unwrap();
        assert_eq!(decoded.body(), &MessageBody::Raw(Raw::json(Protocol(24), 3, body)));
    }

    #[test]
    fn unknown_type_of_a_catalogued_protocol_is_rejected() {
        let codec = MessageCodec::new(adapter_for(EtpVersion::V11).as_ref(), Encoding::Binary);
        let header_codec = HeaderCodec::new(EtpVersion::V11);

        let mut out = Vec::new();
        let header = MessageHeader::new(Protocol::DISCOVERY, 77, 0, MessageFlags::NONE)
            .with_message_id(5);
        header_codec.encode_binary(&header, &mut out).unwrap();
        let failure = codec.decode(&Frame::Binary(out)).unwrap_err();
        assert_eq!(failure.fault().code, ErrorCode::InvalidMessageType);
        assert_eq!(failure.header.unwrap().message_id, 5);
    }

    #[test]
    fn encoding_parses_case_insensitively() {
        assert_eq!("JSON".parse::<Encoding>().unwrap(), Encoding::Json);
        assert_eq!(" binary ".parse::<Encoding>().unwrap(), Encoding::Binary);
        assert!("xml".parse::<Encoding>().is_err());
    }
}
