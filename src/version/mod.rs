//! ETP version adapters.
//!
//! # Data Flow
//! ```text
//! WebSocket sub-protocol ("energistics-tp" | "etp12.energistics.org")
//!     → EtpVersion
//!     → adapter_for(version) → Arc<dyn VersionAdapter>
//!           ├─ header_codec()      (extension support)
//!           ├─ catalog()           (valid protocol/messageType pairs + arity)
//!           └─ core_handler(role)  (client or server Core protocol)
//! ```
//!
//! # Design Decisions
//! - Version differences stay behind the adapter; the session never matches
//!   on the version directly except for version-only features (ping, authorize)
//! - Catalogs are static tables built at compile time

pub mod catalog;
pub mod etp11;
pub mod etp12;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::HeaderCodec;
use crate::messages::{Protocol, ProtocolVersion, Role};
use crate::registry::ProtocolHandler;

pub use catalog::{CatalogEntry, MessageCatalog, ResponseArity};
pub use etp11::Etp11Adapter;
pub use etp12::Etp12Adapter;

pub const ETP11_SUBPROTOCOL: &str = "energistics-tp";
pub const ETP12_SUBPROTOCOL: &str = "etp12.energistics.org";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("unsupported ETP version: {0}")]
    UnsupportedVersion(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EtpVersion {
    #[serde(rename = "1.1")]
    V11,
    #[serde(rename = "1.2")]
    V12,
}

impl EtpVersion {
    pub const fn as_str(self) -> &'static str {
        match self {
            EtpVersion::V11 => "1.1",
            EtpVersion::V12 => "1.2",
        }
    }

    pub const fn subprotocol(self) -> &'static str {
        match self {
            EtpVersion::V11 => ETP11_SUBPROTOCOL,
            EtpVersion::V12 => ETP12_SUBPROTOCOL,
        }
    }

    pub fn from_subprotocol(name: &str) -> Result<Self, VersionError> {
        match name.trim() {
            ETP11_SUBPROTOCOL => Ok(EtpVersion::V11),
            ETP12_SUBPROTOCOL => Ok(EtpVersion::V12),
            other => Err(VersionError::UnsupportedVersion(other.to_string())),
        }
    }

    /// Version advertised for every sub-protocol in the handshake.
    pub const fn protocol_version(self) -> ProtocolVersion {
        match self {
            EtpVersion::V11 => ProtocolVersion::new(1, 1),
            EtpVersion::V12 => ProtocolVersion::new(1, 2),
        }
    }
}

impl fmt::Display for EtpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EtpVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1.1" | "v1.1" | "11" => Ok(EtpVersion::V11),
            "1.2" | "v1.2" | "12" => Ok(EtpVersion::V12),
            other => Err(VersionError::UnsupportedVersion(other.to_string())),
        }
    }
}

/// Per-version strategy consulted by the session.
pub trait VersionAdapter: Send + Sync + fmt::Debug {
    fn version(&self) -> EtpVersion;

    fn header_codec(&self) -> HeaderCodec;

    fn catalog(&self) -> &'static MessageCatalog;

    /// Default Core protocol handler for the given endpoint role.
    fn core_handler(&self, role: Role) -> Arc<dyn ProtocolHandler>;

    fn is_valid_message_type(&self, protocol: Protocol, message_type: u32) -> bool {
        self.catalog().is_valid(protocol, message_type)
    }
}

pub fn adapter_for(version: EtpVersion) -> Arc<dyn VersionAdapter> {
    match version {
        EtpVersion::V11 => Arc::new(Etp11Adapter),
        EtpVersion::V12 => Arc::new(Etp12Adapter),
    }
}

/// Resolves an adapter from a textual version tag such as `"1.2"`.
pub fn adapter_for_tag(tag: &str) -> Result<Arc<dyn VersionAdapter>, VersionError> {
    Ok(adapter_for(tag.parse()?))
}

/// Picks the preferred supported version from a `Sec-WebSocket-Protocol` offer.
pub fn select_subprotocol(offered: &str) -> Option<EtpVersion> {
    let offered: Vec<&str> = offered.split(',').map(str::trim).collect();
    [EtpVersion::V12, EtpVersion::V11]
        .into_iter()
        .find(|version| offered.contains(&version.subprotocol()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageKind;

    #[test]
    fn unknown_tags_are_unsupported() {
        assert!(matches!(
            adapter_for_tag("2.0"),
            Err(VersionError::UnsupportedVersion(tag)) if tag == "2.0"
        ));
        assert_eq!(adapter_for_tag("1.1").unwrap().version(), EtpVersion::V11);
    }

    #[test]
    fn subprotocol_selection_prefers_newest() {
        assert_eq!(
            select_subprotocol("energistics-tp, etp12.energistics.org"),
            Some(EtpVersion::V12)
        );
        assert_eq!(select_subprotocol("energistics-tp"), Some(EtpVersion::V11));
        assert_eq!(select_subprotocol("graphql-ws"), None);
    }

    #[test]
    fn validity_differs_between_versions() {
        let v11 = adapter_for(EtpVersion::V11);
        let v12 = adapter_for(EtpVersion::V12);

        assert!(v11.is_valid_message_type(Protocol::DISCOVERY, 2));
        assert!(!v12.is_valid_message_type(Protocol::DISCOVERY, 2));
        assert!(v12.is_valid_message_type(Protocol::DISCOVERY, 4));

        assert!(!v11.is_valid_message_type(Protocol::CORE, 8));
        assert!(v12.is_valid_message_type(Protocol::CORE, 8));

        assert!(v11.is_valid_message_type(Protocol::STORE, 1000));
        assert!(!v11.is_valid_message_type(Protocol::GROWING_OBJECT, 1000));
    }

    #[test]
    fn every_catalog_is_consistent() {
        for version in [EtpVersion::V11, EtpVersion::V12] {
            let catalog = adapter_for(version).catalog();
            for entry in catalog.entries {
                assert!(catalog.knows_protocol(entry.protocol));
                assert_eq!(catalog.lookup(entry.protocol, entry.message_type), Some(entry.kind));
                assert_eq!(catalog.entry(entry.kind).map(|e| e.message_type), Some(entry.message_type));
            }
        }
        assert!(adapter_for(EtpVersion::V11).catalog().entry(MessageKind::Ping).is_none());
        assert!(adapter_for(EtpVersion::V12).catalog().entry(MessageKind::RenewSecurityToken).is_none());
    }
}
