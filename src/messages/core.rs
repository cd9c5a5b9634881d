//! Core protocol bodies (protocol 0) plus the protocol-agnostic
//! `ProtocolException` and `Acknowledge`.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capabilities::CapabilitySet;
use crate::messages::{Protocol, Role};

/// Microseconds since the Unix epoch, as carried in `currentDateTime` fields.
pub fn current_date_time() -> i64 {
    Utc::now().timestamp_micros()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: i32,
    pub minor: i32,
    pub revision: i32,
    pub patch: i32,
}

impl ProtocolVersion {
    pub const fn new(major: i32, minor: i32) -> Self {
        Self {
            major,
            minor,
            revision: 0,
            patch: 0,
        }
    }
}

/// A protocol an endpoint requests or supports, with the role the server plays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedProtocol {
    pub protocol: Protocol,
    pub protocol_version: ProtocolVersion,
    pub role: Role,
    pub protocol_capabilities: CapabilitySet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSession {
    pub application_name: String,
    pub application_version: String,
    pub client_instance_id: Uuid,
    pub requested_protocols: Vec<SupportedProtocol>,
    pub supported_data_objects: Vec<String>,
    pub supported_compression: Vec<String>,
    pub supported_formats: Vec<String>,
    pub endpoint_capabilities: CapabilitySet,
    pub current_date_time: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSession {
    pub application_name: String,
    pub application_version: String,
    pub server_instance_id: Uuid,
    pub session_id: Uuid,
    pub supported_protocols: Vec<SupportedProtocol>,
    pub supported_data_objects: Vec<String>,
    pub supported_compression: Vec<String>,
    pub supported_formats: Vec<String>,
    pub endpoint_capabilities: CapabilitySet,
    pub current_date_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseSession {
    pub reason: String,
}

/// ETP 1.1 token renewal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewSecurityToken {
    pub token: String,
}

/// ETP 1.2 in-session authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorize {
    pub authorization: String,
    pub supplemental_authorization: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    pub success: bool,
    pub challenges: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ping {
    pub current_date_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pong {
    pub current_date_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolException {
    pub error_code: i32,
    pub error_message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledge {}
