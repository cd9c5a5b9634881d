//! Session-open capability negotiation.

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::capabilities::{ApplicationInfo, CapabilitySet, NegotiatedProtocol, SessionState};
use crate::config::schema::EndpointConfig;
use crate::error::ErrorCode;
use crate::messages::{
    current_date_time, OpenSession, Protocol, RequestSession, Role, SupportedProtocol,
};
use crate::version::EtpVersion;

/// Format assumed when a counterpart declares none.
pub const DEFAULT_FORMAT: &str = "xml";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    #[error("no mutually supported protocols")]
    NoSupportedProtocols,
    #[error("no mutually supported formats")]
    NoSupportedFormats,
    #[error("counterpart rejected the session (code {code}): {message}")]
    Rejected { code: i32, message: String },
}

impl NegotiationError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            NegotiationError::NoSupportedProtocols => ErrorCode::NoSupportedProtocols,
            NegotiationError::NoSupportedFormats => ErrorCode::NoSupportedFormats,
            NegotiationError::Rejected { code, .. } => {
                ErrorCode::from_code(*code).unwrap_or(ErrorCode::InvalidState)
            }
        }
    }
}

/// What this endpoint declares about itself during the handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointDescriptor {
    pub application_name: String,
    pub application_version: String,
    pub instance_id: Uuid,
    pub supported_data_objects: Vec<String>,
    pub supported_compression: Vec<String>,
    pub supported_formats: Vec<String>,
    pub capabilities: CapabilitySet,
}

impl EndpointDescriptor {
    pub fn from_config(config: &EndpointConfig) -> Self {
        Self {
            application_name: config.application_name.clone(),
            application_version: config.application_version.clone(),
            instance_id: Uuid::new_v4(),
            supported_data_objects: config.supported_data_objects.clone(),
            supported_compression: config.supported_compression.clone(),
            supported_formats: config.supported_formats.clone(),
            capabilities: config.capabilities(),
        }
    }

    fn application_info(&self) -> ApplicationInfo {
        ApplicationInfo {
            name: self.application_name.clone(),
            version: self.application_version.clone(),
            instance_id: self.instance_id,
        }
    }
}

/// A protocol handler registered locally, as seen by negotiation.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferedProtocol {
    pub protocol: Protocol,
    pub role: Role,
    pub capabilities: CapabilitySet,
}

#[derive(Debug, Clone)]
pub struct ServerNegotiation {
    pub open_session: OpenSession,
    pub state: SessionState,
}

/// Server side: answer a `RequestSession` from the locally offered handlers.
///
/// A requested protocol is supported when the server registered a handler
/// for exactly the role the client asked it to play.
pub fn negotiate_server(
    local: &EndpointDescriptor,
    offered: &[OfferedProtocol],
    request: &RequestSession,
    version: EtpVersion,
) -> Result<ServerNegotiation, NegotiationError> {
    let protocol_version = version.protocol_version();
    let mut supported: Vec<SupportedProtocol> = Vec::new();
    let mut negotiated = Vec::new();

    for requested in &request.requested_protocols {
        if requested.protocol == Protocol::CORE
            || supported.iter().any(|s| s.protocol == requested.protocol)
        {
            continue;
        }
        let Some(handler) = offered
            .iter()
            .find(|o| o.protocol == requested.protocol && o.role == requested.role)
        else {
            continue;
        };
        let capabilities = handler.capabilities.restrict(&requested.protocol_capabilities);
        supported.push(SupportedProtocol {
            protocol: handler.protocol,
            protocol_version,
            role: handler.role,
            protocol_capabilities: capabilities.clone(),
        });
        negotiated.push(NegotiatedProtocol {
            protocol: handler.protocol,
            version: protocol_version,
            local_role: handler.role,
            counterpart_role: handler.role.counterpart(),
            capabilities,
        });
    }
    if supported.is_empty() {
        return Err(NegotiationError::NoSupportedProtocols);
    }

    let formats = intersect(
        &local.supported_formats,
        &formats_or_default(&request.supported_formats),
    );
    if formats.is_empty() {
        return Err(NegotiationError::NoSupportedFormats);
    }
    let compression = intersect(&local.supported_compression, &request.supported_compression);
    let data_objects = union(&local.supported_data_objects, &request.supported_data_objects);
    let session_id = Uuid::new_v4();

    let open_session = OpenSession {
        application_name: local.application_name.clone(),
        application_version: local.application_version.clone(),
        server_instance_id: local.instance_id,
        session_id,
        supported_protocols: supported,
        supported_data_objects: data_objects.clone(),
        supported_compression: compression.clone(),
        supported_formats: formats.clone(),
        endpoint_capabilities: local.capabilities.clone(),
        current_date_time: current_date_time(),
    };
    let state = SessionState {
        session_id,
        version,
        local: local.application_info(),
        counterpart: ApplicationInfo {
            name: request.application_name.clone(),
            version: request.application_version.clone(),
            instance_id: request.client_instance_id,
        },
        protocols: negotiated,
        supported_data_objects: data_objects,
        supported_compression: compression,
        supported_formats: formats,
        endpoint_capabilities: local.capabilities.restrict(&request.endpoint_capabilities),
        authorization: None,
        opened_at: Utc::now(),
    };
    Ok(ServerNegotiation { open_session, state })
}

/// Client side: accept the server's `OpenSession` against what was requested.
pub fn negotiate_client(
    local: &EndpointDescriptor,
    requested: &[SupportedProtocol],
    open: &OpenSession,
    version: EtpVersion,
) -> Result<SessionState, NegotiationError> {
    let protocols: Vec<NegotiatedProtocol> = open
        .supported_protocols
        .iter()
        .filter(|sp| sp.protocol != Protocol::CORE)
        .filter(|sp| {
            requested
                .iter()
                .any(|r| r.protocol == sp.protocol && r.role == sp.role)
        })
        .map(|sp| NegotiatedProtocol {
            protocol: sp.protocol,
            version: sp.protocol_version,
            local_role: sp.role.counterpart(),
            counterpart_role: sp.role,
            capabilities: sp.protocol_capabilities.clone(),
        })
        .collect();
    if protocols.is_empty() {
        return Err(NegotiationError::NoSupportedProtocols);
    }

    let formats = intersect(
        &local.supported_formats,
        &formats_or_default(&open.supported_formats),
    );
    if formats.is_empty() {
        return Err(NegotiationError::NoSupportedFormats);
    }

    Ok(SessionState {
        session_id: open.session_id,
        version,
        local: local.application_info(),
        counterpart: ApplicationInfo {
            name: open.application_name.clone(),
            version: open.application_version.clone(),
            instance_id: open.server_instance_id,
        },
        protocols,
        supported_data_objects: union(&local.supported_data_objects, &open.supported_data_objects),
        supported_compression: intersect(&local.supported_compression, &open.supported_compression),
        supported_formats: formats,
        endpoint_capabilities: local.capabilities.restrict(&open.endpoint_capabilities),
        authorization: None,
        opened_at: Utc::now(),
    })
}

fn formats_or_default(formats: &[String]) -> Vec<String> {
    if formats.is_empty() {
        vec![DEFAULT_FORMAT.to_string()]
    } else {
        formats.to_vec()
    }
}

/// Case-insensitive intersection keeping the order of `ours`.
fn intersect(ours: &[String], theirs: &[String]) -> Vec<String> {
    ours.iter()
        .filter(|a| theirs.iter().any(|b| a.eq_ignore_ascii_case(b)))
        .cloned()
        .collect()
}

/// Case-insensitive union, `ours` first.
fn union(ours: &[String], theirs: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(ours.len() + theirs.len());
    for item in ours.iter().chain(theirs) {
        if !merged.iter().any(|m| m.eq_ignore_ascii_case(item)) {
            merged.push(item.clone());
        }
    }
    merged
}
