//! Opaque bodies for protocols the catalog does not describe.

use serde::ser::Error as _;
use serde_json::Value;

use crate::codec::header::MessageHeader;
use crate::messages::Protocol;

/// Payload exactly as it travelled, in the session's encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    Binary(Vec<u8>),
    Json(Value),
}

/// A message of an uncatalogued protocol. The session routes it by header
/// alone; interpreting the payload is up to the protocol handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Raw {
    pub protocol: Protocol,
    pub message_type: u32,
    pub payload: RawPayload,
}

impl Raw {
    pub fn binary(protocol: Protocol, message_type: u32, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            protocol,
            message_type,
            payload: RawPayload::Binary(bytes.into()),
        }
    }

    pub fn json(protocol: Protocol, message_type: u32, value: Value) -> Self {
        Self {
            protocol,
            message_type,
            payload: RawPayload::Json(value),
        }
    }

    pub(crate) fn from_wire_binary(header: &MessageHeader, bytes: &[u8]) -> Self {
        Self::binary(header.protocol, header.message_type, bytes)
    }

    pub(crate) fn from_wire_json(header: &MessageHeader, value: Value) -> Self {
        Self::json(header.protocol, header.message_type, value)
    }

    pub(crate) fn to_json(&self) -> Result<Value, serde_json::Error> {
        match &self.payload {
            RawPayload::Json(value) => Ok(value.clone()),
            RawPayload::Binary(_) => Err(serde_json::Error::custom(
                "binary payload cannot be sent on a json session",
            )),
        }
    }

    pub(crate) fn to_binary(&self) -> Result<Vec<u8>, postcard::Error> {
        match &self.payload {
            RawPayload::Binary(bytes) => Ok(bytes.clone()),
            RawPayload::Json(_) => Err(postcard::Error::custom(
                "json payload cannot be sent on a binary session",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_must_match_the_session_encoding() {
        let raw = Raw::binary(Protocol::GROWING_OBJECT, 1, vec![1, 2, 3]);
        assert_eq!(raw.to_binary().unwrap(), vec![1, 2, 3]);
        assert!(raw.to_json().is_err());

        let raw = Raw::json(Protocol::GROWING_OBJECT, 1, serde_json::json!({ "uri": "eml:///" }));
        assert_eq!(raw.to_json().unwrap()["uri"], "eml:///");
        assert!(raw.to_binary().is_err());
    }
}
