//! Store protocol (4): get, put and delete data objects.

use std::sync::Arc;

use crate::error::{ErrorCode, ProtocolFault};
use crate::handlers::memory::{split_uri, MemoryStore};
use crate::messages::{
    DataObject, DeleteObject, EtpMessage, GetObject, MessageBody, Object, Protocol, PutObject, Role,
};
use crate::registry::ProtocolHandler;
use crate::session::{Session, SessionError};

pub struct StoreHandler {
    store: Arc<MemoryStore>,
}

impl StoreHandler {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

impl ProtocolHandler for StoreHandler {
    fn protocol(&self) -> Protocol {
        Protocol::STORE
    }

    fn role(&self) -> Role {
        Role::Store
    }

    fn handle_message(&self, session: &Session, message: &EtpMessage) -> Result<(), ProtocolFault> {
        match message.body() {
            MessageBody::GetObject(GetObject { uri }) => {
                let data_object = self
                    .store
                    .get(uri)
                    .ok_or_else(|| ProtocolFault::not_found(format!("no object at {uri}")))?;
                session.respond(message.header(), Object { data_object })?;
                Ok(())
            }
            MessageBody::PutObject(PutObject { data_object }) => {
                if split_uri(&data_object.resource.uri).is_empty() {
                    return Err(ProtocolFault::new(
                        ErrorCode::InvalidUri,
                        "data object URI must name an object below the root",
                    ));
                }
                let stored = self.store.put(data_object.clone());
                tracing::debug!(session = %session.id(), uri = %stored.resource.uri, "object stored");
                Ok(())
            }
            MessageBody::DeleteObject(DeleteObject { uri }) => {
                self.store
                    .delete(uri)
                    .ok_or_else(|| ProtocolFault::not_found(format!("no object at {uri}")))?;
                tracing::debug!(session = %session.id(), uri = %uri, "object deleted");
                Ok(())
            }
            _ => Err(ProtocolFault::new(
                ErrorCode::InvalidMessageType,
                format!("{} is not handled by the store", message.kind()),
            )),
        }
    }
}

/// Customer side of Store.
#[derive(Debug, Default)]
pub struct StoreCustomerHandler;

impl StoreCustomerHandler {
    pub fn new() -> Self {
        Self
    }

    /// The object at `uri`; `None` when the store answered without data.
    pub async fn get_object(
        &self,
        session: &Session,
        uri: impl Into<String>,
    ) -> Result<Option<DataObject>, SessionError> {
        let response = session.request(GetObject { uri: uri.into() })?.wait().await?;
        Ok(match response.into_single().map(EtpMessage::into_body) {
            Some(MessageBody::Object(object)) => Some(object.data_object),
            _ => None,
        })
    }

    /// Upserts an object and waits for the store's acknowledgement.
    pub async fn put_object(&self, session: &Session, data_object: DataObject) -> Result<(), SessionError> {
        session.request(PutObject { data_object })?.wait().await?;
        Ok(())
    }

    pub async fn delete_object(&self, session: &Session, uri: impl Into<String>) -> Result<(), SessionError> {
        session.request(DeleteObject { uri: uri.into() })?.wait().await?;
        Ok(())
    }
}

impl ProtocolHandler for StoreCustomerHandler {
    fn protocol(&self) -> Protocol {
        Protocol::STORE
    }

    fn role(&self) -> Role {
        Role::Customer
    }

    fn handle_message(&self, _session: &Session, message: &EtpMessage) -> Result<(), ProtocolFault> {
        Err(ProtocolFault::new(
            ErrorCode::InvalidMessageType,
            format!("{} is not expected by a store customer", message.kind()),
        ))
    }
}
