//! Message header, flags and the per-version header codec.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{avro, CodecError};
use crate::messages::{DataValue, Protocol};
use crate::version::EtpVersion;

pub type MessageId = i64;

/// Header flag bitset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageFlags(u32);

impl MessageFlags {
    pub const NONE: MessageFlags = MessageFlags(0);
    pub const MULTI_PART: MessageFlags = MessageFlags(0x01);
    pub const FINAL_PART: MessageFlags = MessageFlags(0x02);
    pub const NO_DATA: MessageFlags = MessageFlags(0x04);
    pub const COMPRESSED: MessageFlags = MessageFlags(0x08);
    pub const ACKNOWLEDGE: MessageFlags = MessageFlags(0x10);
    /// Wire-only in ETP 1.2; decoded headers expose the extension instead.
    pub const HEADER_EXTENSION: MessageFlags = MessageFlags(0x20);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: MessageFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn with(self, other: MessageFlags) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn without(self, other: MessageFlags) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn is_multi_part(self) -> bool {
        self.contains(Self::MULTI_PART)
    }

    pub const fn is_final_part(self) -> bool {
        self.contains(Self::FINAL_PART)
    }

    pub const fn has_no_data(self) -> bool {
        self.contains(Self::NO_DATA)
    }

    pub const fn is_compressed(self) -> bool {
        self.contains(Self::COMPRESSED)
    }

    pub const fn wants_acknowledge(self) -> bool {
        self.contains(Self::ACKNOWLEDGE)
    }
}

impl BitOr for MessageFlags {
    type Output = MessageFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.with(rhs)
    }
}

impl BitOrAssign for MessageFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.with(rhs);
    }
}

impl fmt::Display for MessageFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// ETP 1.2 header extension.
pub type HeaderExtension = BTreeMap<String, DataValue>;

/// The fixed envelope in front of every message body.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageHeader {
    pub protocol: Protocol,
    pub message_type: u32,
    pub correlation_id: MessageId,
    pub message_id: MessageId,
    pub message_flags: MessageFlags,
    pub extension: Option<HeaderExtension>,
}

impl MessageHeader {
    /// Header with an unassigned (zero) message id.
    pub fn new(
        protocol: Protocol,
        message_type: u32,
        correlation_id: MessageId,
        message_flags: MessageFlags,
    ) -> Self {
        Self {
            protocol,
            message_type,
            correlation_id,
            message_id: 0,
            message_flags,
            extension: None,
        }
    }

    pub fn with_message_id(mut self, message_id: MessageId) -> Self {
        self.message_id = message_id;
        self
    }

    pub fn with_extension(mut self, extension: HeaderExtension) -> Self {
        self.extension = Some(extension);
        self
    }

    pub fn is_correlated(&self) -> bool {
        self.correlation_id != 0
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonHeader {
    protocol: u32,
    message_type: u32,
    correlation_id: i64,
    message_id: i64,
    message_flags: u32,
}

#[derive(Serialize, Deserialize)]
struct JsonExtension {
    extension: HeaderExtension,
}

/// Version-aware header encoder/decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderCodec {
    version: EtpVersion,
}

impl HeaderCodec {
    pub const fn new(version: EtpVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> EtpVersion {
        self.version
    }

    pub fn supports_extension(&self) -> bool {
        self.version == EtpVersion::V12
    }

    fn wire_flags(&self, header: &MessageHeader) -> Result<u32, CodecError> {
        if !self.supports_extension() {
            if header.extension.is_some() {
                return Err(CodecError::ExtensionNotSupported(self.version));
            }
            return Ok(header.message_flags.bits());
        }
        let flags = match header.extension {
            Some(_) => header.message_flags.with(MessageFlags::HEADER_EXTENSION),
            None => header.message_flags.without(MessageFlags::HEADER_EXTENSION),
        };
        Ok(flags.bits())
    }

    /// Splits raw wire flags into the decoded flags and whether an extension follows.
    fn read_flags(&self, bits: u32) -> (MessageFlags, bool) {
        let flags = MessageFlags::from_bits(bits);
        if self.supports_extension() && flags.contains(MessageFlags::HEADER_EXTENSION) {
            (flags.without(MessageFlags::HEADER_EXTENSION), true)
        } else {
            (flags, false)
        }
    }

    pub fn encode_binary(&self, header: &MessageHeader, out: &mut Vec<u8>) -> Result<(), CodecError> {
        let flags = self.wire_flags(header)?;
        avro::write_int(out, to_int(header.protocol.id(), "protocol")?);
        avro::write_int(out, to_int(header.message_type, "messageType")?);
        avro::write_long(out, header.correlation_id);
        avro::write_long(out, header.message_id);
        avro::write_int(out, to_int(flags, "messageFlags")?);
        if let Some(extension) = &header.extension {
            avro::write_map(out, extension);
        }
        Ok(())
    }

    pub fn decode_binary(&self, input: &mut &[u8]) -> Result<MessageHeader, CodecError> {
        let protocol = from_int(avro::read_int(input)?, "protocol")?;
        let message_type = from_int(avro::read_int(input)?, "messageType")?;
        let correlation_id = avro::read_long(input)?;
        let message_id = avro::read_long(input)?;
        let bits = from_int(avro::read_int(input)?, "messageFlags")?;
        let (message_flags, has_extension) = self.read_flags(bits);
        let extension = if has_extension {
            Some(avro::read_map(input)?)
        } else {
            None
        };
        Ok(MessageHeader {
            protocol: Protocol(protocol),
            message_type,
            correlation_id,
            message_id,
            message_flags,
            extension,
        })
    }

    /// Leading JSON array elements: the header, then the extension if present.
    pub fn encode_json(&self, header: &MessageHeader) -> Result<Vec<Value>, CodecError> {
        let flags = self.wire_flags(header)?;
        let mut parts = vec![serde_json::to_value(JsonHeader {
            protocol: header.protocol.id(),
            message_type: header.message_type,
            correlation_id: header.correlation_id,
            message_id: header.message_id,
            message_flags: flags,
        })?];
        if let Some(extension) = &header.extension {
            parts.push(serde_json::to_value(JsonExtension {
                extension: extension.clone(),
            })?);
        }
        Ok(parts)
    }

    /// Decodes the header from a JSON envelope, returning it with the body element.
    pub fn decode_json(&self, envelope: Vec<Value>) -> Result<(MessageHeader, Value), CodecError> {
        let mut parts = envelope.into_iter();
        let first = parts
            .next()
            .ok_or_else(|| CodecError::Envelope("empty message array".into()))?;
        let raw: JsonHeader = serde_json::from_value(first)?;
        let (message_flags, has_extension) = self.read_flags(raw.message_flags);
        let mut header = MessageHeader {
            protocol: Protocol(raw.protocol),
            message_type: raw.message_type,
            correlation_id: raw.correlation_id,
            message_id: raw.message_id,
            message_flags,
            extension: None,
        };
        if has_extension {
            let element = parts
                .next()
                .ok_or_else(|| CodecError::Envelope("missing header extension".into()))?;
            let wrapped: JsonExtension = serde_json::from_value(element)?;
            header.extension = Some(wrapped.extension);
        }
        let body = parts
            .next()
            .ok_or_else(|| CodecError::Envelope("missing message body".into()))?;
        if parts.next().is_some() {
            return Err(CodecError::Envelope("unexpected trailing elements".into()));
        }
        Ok((header, body))
    }
}

fn to_int(value: u32, field: &'static str) -> Result<i32, CodecError> {
    i32::try_from(value).map_err(|_| CodecError::OutOfRange(i64::from(value), field))
}

fn from_int(value: i32, field: &'static str) -> Result<u32, CodecError> {
    u32::try_from(value).map_err(|_| CodecError::OutOfRange(i64::from(value), field))
}
