//! Negotiated per-session state.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::capabilities::CapabilitySet;
use crate::messages::{Protocol, ProtocolVersion, Role};
use crate::version::EtpVersion;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationInfo {
    pub name: String,
    pub version: String,
    pub instance_id: Uuid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NegotiatedProtocol {
    pub protocol: Protocol,
    pub version: ProtocolVersion,
    pub local_role: Role,
    pub counterpart_role: Role,
    pub capabilities: CapabilitySet,
}

/// Result of a successful handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub session_id: Uuid,
    pub version: EtpVersion,
    pub local: ApplicationInfo,
    pub counterpart: ApplicationInfo,
    pub protocols: Vec<NegotiatedProtocol>,
    pub supported_data_objects: Vec<String>,
    pub supported_compression: Vec<String>,
    pub supported_formats: Vec<String>,
    pub endpoint_capabilities: CapabilitySet,
    /// Latest security token; the only field renewed in place.
    pub authorization: Option<String>,
    pub opened_at: DateTime<Utc>,
}

impl SessionState {
    pub fn protocol(&self, protocol: Protocol) -> Option<&NegotiatedProtocol> {
        self.protocols.iter().find(|p| p.protocol == protocol)
    }

    pub fn supports(&self, protocol: Protocol) -> bool {
        protocol == Protocol::CORE || self.protocol(protocol).is_some()
    }

    /// The role this endpoint plays for a negotiated protocol.
    pub fn local_role(&self, protocol: Protocol) -> Option<Role> {
        self.protocol(protocol).map(|p| p.local_role)
    }

    pub fn protocol_numbers(&self) -> Vec<Protocol> {
        self.protocols.iter().map(|p| p.protocol).collect()
    }
}
