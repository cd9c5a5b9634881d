//! Discovery protocol (3): browse resources by URI.

use std::sync::Arc;

use crate::capabilities::{names, CapabilitySet};
use crate::error::{ErrorCode, ProtocolFault};
use crate::handlers::memory::MemoryStore;
use crate::messages::{
    EtpMessage, GetResources, GetResourcesResponse, MessageBody, Protocol, Resource, Role,
};
use crate::registry::ProtocolHandler;
use crate::session::{Session, SessionError};

pub const DEFAULT_MAX_RESPONSE_COUNT: usize = 10_000;

/// Store side: answers GetResources from a [`MemoryStore`], one resource per
/// response part.
pub struct DiscoveryStoreHandler {
    store: Arc<MemoryStore>,
    max_response_count: usize,
}

impl DiscoveryStoreHandler {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            max_response_count: DEFAULT_MAX_RESPONSE_COUNT,
        }
    }

    pub fn with_max_response_count(mut self, max_response_count: usize) -> Self {
        self.max_response_count = max_response_count;
        self
    }

    /// Negotiated limit, falling back to the locally declared one.
    fn response_limit(&self, session: &Session) -> usize {
        session
            .state()
            .and_then(|state| {
                state
                    .protocol(Protocol::DISCOVERY)
                    .and_then(|p| p.capabilities.get_long(names::MAX_RESPONSE_COUNT))
            })
            .and_then(|limit| usize::try_from(limit).ok())
            .unwrap_or(self.max_response_count)
    }
}

impl ProtocolHandler for DiscoveryStoreHandler {
    fn protocol(&self) -> Protocol {
        Protocol::DISCOVERY
    }

    fn role(&self) -> Role {
        Role::Store
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new().with(names::MAX_RESPONSE_COUNT, self.max_response_count as i64)
    }

    fn handle_message(&self, session: &Session, message: &EtpMessage) -> Result<(), ProtocolFault> {
        let MessageBody::GetResources(request) = message.body() else {
            return Err(ProtocolFault::new(
                ErrorCode::InvalidMessageType,
                format!("{} is not handled by the discovery store", message.kind()),
            ));
        };

        let children = self
            .store
            .children(&request.uri)
            .ok_or_else(|| ProtocolFault::not_found(format!("no resource at {}", request.uri)))?;
        let limit = self.response_limit(session);
        if children.len() > limit {
            return Err(ProtocolFault::new(
                ErrorCode::LimitExceeded,
                format!("{} resources exceed the limit of {limit}", children.len()),
            ));
        }

        tracing::debug!(session = %session.id(), uri = %request.uri, count = children.len(), "GetResources");
        let parts: Vec<MessageBody> = children
            .into_iter()
            .map(|resource| {
                MessageBody::from(GetResourcesResponse {
                    resources: vec![resource],
                })
            })
            .collect();
        session.respond_multipart(message.header(), parts)?;
        Ok(())
    }
}

/// Customer side of Discovery.
#[derive(Debug, Default)]
pub struct DiscoveryCustomerHandler;

impl DiscoveryCustomerHandler {
    pub fn new() -> Self {
        Self
    }

    /// Children of `uri`, in the order the store sent them. An empty store
    /// answer yields an empty list.
    pub async fn get_resources(
        &self,
        session: &Session,
        uri: impl Into<String>,
    ) -> Result<Vec<Resource>, SessionError> {
        let response = session.request(GetResources { uri: uri.into() })?.wait().await?;
        Ok(response
            .into_parts()
            .into_iter()
            .filter_map(|part| match part.into_body() {
                MessageBody::GetResourcesResponse(body) => Some(body.resources),
                _ => None,
            })
            .flatten()
            .collect())
    }
}

impl ProtocolHandler for DiscoveryCustomerHandler {
    fn protocol(&self) -> Protocol {
        Protocol::DISCOVERY
    }

    fn role(&self) -> Role {
        Role::Customer
    }

    fn handle_message(&self, _session: &Session, message: &EtpMessage) -> Result<(), ProtocolFault> {
        Err(ProtocolFault::new(
            ErrorCode::InvalidMessageType,
            format!("{} is not expected by a discovery customer", message.kind()),
        ))
    }
}
