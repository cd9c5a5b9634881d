//! ETP 1.2 adapter. Adds in-session authorization, ping/pong and header
//! extensions; several messages keep their 1.1 semantics under new names.

use std::sync::Arc;

use crate::codec::HeaderCodec;
use crate::handlers::core::CoreHandler;
use crate::messages::{MessageKind as K, Protocol, Role};
use crate::registry::ProtocolHandler;
use crate::version::catalog::{
    CatalogEntry as E, MessageCatalog, ResponseArity as A, ACKNOWLEDGE, PROTOCOL_EXCEPTION,
};
use crate::version::{EtpVersion, VersionAdapter};

pub static ETP12_CATALOG: MessageCatalog = MessageCatalog {
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
        E::new(Protocol::CORE, 6, K::Authorize, "Authorize", A::Single, &[K::AuthorizeResponse]),
        E::new(Protocol::CORE, 7, K::AuthorizeResponse, "AuthorizeResponse", A::None, &[]),
        E::new(Protocol::CORE, 8, K::Ping, "Ping", A::Single, &[K::Pong]),
        E::new(Protocol::CORE, 9, K::Pong, "Pong", A::None, &[]),
        E::new(Protocol::CORE, PROTOCOL_EXCEPTION, K::ProtocolException, "ProtocolException", A::None, &[]),
        E::new(Protocol::CORE, ACKNOWLEDGE, K::Acknowledge, "Acknowledge", A::None, &[]),
        E::new(Protocol::DISCOVERY, 1, K::GetResources, "GetResources", A::MultiPart, &[K::GetResourcesResponse]),
        E::new(Protocol::DISCOVERY, 4, K::GetResourcesResponse, "GetResourcesResponse", A::None, &[]),
        E::new(Protocol::STORE, 1, K::GetObject, "GetDataObjects", A::Single, &[K::Object]),
        E::new(Protocol::STORE, 2, K::PutObject, "PutDataObjects", A::None, &[]),
        E::new(Protocol::STORE, 3, K::DeleteObject, "DeleteDataObjects", A::None, &[]),
        E::new(Protocol::STORE, 4, K::Object, "GetDataObjectsResponse", A::None, &[]),
        E::new(Protocol::STORE_NOTIFICATION, 2, K::ChangeNotification, "ObjectChanged", A::None, &[]),
        E::new(Protocol::STORE_NOTIFICATION, 3, K::DeleteNotification, "ObjectDeleted", A::None, &[]),
        E::new(Protocol::STORE_NOTIFICATION, 4, K::CancelNotification, "UnsubscribeNotifications", A::None, &[]),
        E::new(Protocol::STORE_NOTIFICATION, 6, K::NotificationRequest, "SubscribeNotifications", A::Subscription, &[]),
    ],
};

#[derive(Debug, Default)]
pub struct Etp12Adapter;

impl VersionAdapter for Etp12Adapter {
    fn version(&self) -> EtpVersion {
        EtpVersion::V12
    }

    fn header_codec(&self) -> HeaderCodec {
        HeaderCodec::new(EtpVersion::V12)
    }

    fn catalog(&self) -> &'static MessageCatalog {
        &ETP12_CATALOG
    }

    fn core_handler(&self, role: Role) -> Arc<dyn ProtocolHandler> {
        Arc::new(CoreHandler::new(EtpVersion::V12, role))
    }
}
