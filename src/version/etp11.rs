//! ETP 1.1 adapter.

use std::sync::Arc;

use crate::codec::HeaderCodec;
use crate::handlers::core::CoreHandler;
use crate::messages::{MessageKind as K, Protocol, Role};
use crate::registry::ProtocolHandler;
use crate::version::catalog::{
    CatalogEntry as E, MessageCatalog, ResponseArity as A, ACKNOWLEDGE, PROTOCOL_EXCEPTION,
};
use crate::version::{EtpVersion, VersionAdapter};

pub static ETP11_CATALOG: MessageCatalog = MessageCatalog {
    protocols: &[
        Protocol::CORE,
        Protocol::DISCOVERY,
        Protocol::STORE,
        Protocol::STORE_NOTIFICATION,
    ],
    entries: &[
        E::new(Protocol::CORE, 1, K::RequestSession, "RequestSession", A::Single, &[K::OpenSession]),
        E::new(Protocol::CORE, 2, K::OpenSession, "OpenSession", A::None, &[]),
        E::new(Protocol::CORE, 5, K::CloseSession, "CloseSession", A::None, &[]),
        E::new(Protocol::CORE, 6, K::RenewSecurityToken, "RenewSecurityToken", A::None, &[]),
        E::new(Protocol::CORE, PROTOCOL_EXCEPTION, K::ProtocolException, "ProtocolException", A::None, &[]),
        E::new(Protocol::CORE, ACKNOWLEDGE, K::Acknowledge, "Acknowledge", A::None, &[]),
        E::new(Protocol::DISCOVERY, 1, K::GetResources, "GetResources", A::MultiPart, &[K::GetResourcesResponse]),
        E::new(Protocol::DISCOVERY, 2, K::GetResourcesResponse, "GetResourcesResponse", A::None, &[]),
        E::new(Protocol::STORE, 1, K::GetObject, "GetObject", A::Single, &[K::Object]),
        E::new(Protocol::STORE, 2, K::PutObject, "PutObject", A::None, &[]),
        E::new(Protocol::STORE, 3, K::DeleteObject, "DeleteObject", A::None, &[]),
        E::new(Protocol::STORE, 4, K::Object, "Object", A::None, &[]),
        E::new(Protocol::STORE_NOTIFICATION, 1, K::NotificationRequest, "NotificationRequest", A::Subscription, &[]),
        E::new(Protocol::STORE_NOTIFICATION, 2, K::ChangeNotification, "ChangeNotification", A::None, &[]),
        E::new(Protocol::STORE_NOTIFICATION, 3, K::DeleteNotification, "DeleteNotification", A::None, &[]),
        E::new(Protocol::STORE_NOTIFICATION, 4, K::CancelNotification, "CancelNotification", A::None, &[]),
    ],
};

#[derive(Debug, Default)]
pub struct Etp11Adapter;

impl VersionAdapter for Etp11Adapter {
    fn version(&self) -> EtpVersion {
        EtpVersion::V11
    }

    fn header_codec(&self) -> HeaderCodec {
        HeaderCodec::new(EtpVersion::V11)
    }

    fn catalog(&self) -> &'static MessageCatalog {
        &ETP11_CATALOG
    }

    fn core_handler(&self, role: Role) -> Arc<dyn ProtocolHandler> {
        Arc::new(CoreHandler::new(EtpVersion::V11, role))
    }
}
