//! Protocol handler registry.
//!
//! # Data Flow
//! ```text
//! application
//!     → register(Arc<H>)        binds (protocol, role) and TypeId(H)
//!     → Session::attach()       registry frozen from here on
//!
//! dispatch:
//!     (header.protocol, negotiated local role) → resolve() → handler
//! application:
//!     resolve_by_type::<H>() → Arc<H> (typed helpers on customer handlers)
//! ```
//!
//! # Design Decisions
//! - Last registration for a (protocol, role) wins
//! - Lookup by concrete handler type replaces interface lookup
//! - The session keeps the registry behind an `ArcSwap`; dispatch reads a
//!   snapshot without locking

mod handler;

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::capabilities::OfferedProtocol;
use crate::messages::{Protocol, Role};

pub use handler::ProtocolHandler;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no handler registered for {protocol} as {role}")]
    NotFound { protocol: Protocol, role: Role },
    #[error("no handler of type {0} registered")]
    InterfaceNotFound(&'static str),
    #[error("handlers cannot be registered once the session is attached")]
    Frozen,
}

#[derive(Clone)]
struct Registration {
    handler: Arc<dyn ProtocolHandler>,
    any: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
}

/// Maps (protocol, role) and handler type to handler instances.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<(Protocol, Role), Registration>,
    by_type: HashMap<TypeId, (Protocol, Role)>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, replacing any previous one for the same
    /// (protocol, role).
    pub fn register<H: ProtocolHandler>(&mut self, handler: Arc<H>) -> &mut Self {
        let key = (handler.protocol(), handler.role());
        let registration = Registration {
            handler: handler.clone(),
            any: handler,
            type_id: TypeId::of::<H>(),
            type_name: std::any::type_name::<H>(),
        };

        if let Some(replaced) = self.handlers.insert(key, registration) {
            tracing::debug!(
                protocol = %key.0,
                role = %key.1,
                replaced = replaced.type_name,
                "handler replaced"
            );
            if self.by_type.get(&replaced.type_id) == Some(&key) {
                self.by_type.remove(&replaced.type_id);
            }
        }
        self.by_type.insert(TypeId::of::<H>(), key);
        self
    }

    pub fn with<H: ProtocolHandler>(mut self, handler: Arc<H>) -> Self {
        self.register(handler);
        self
    }

    pub fn resolve(&self, protocol: Protocol, role: Role) -> Result<Arc<dyn ProtocolHandler>, RegistryError> {
        self.handlers
            .get(&(protocol, role))
            .map(|r| r.handler.clone())
            .ok_or(RegistryError::NotFound { protocol, role })
    }

    pub fn resolve_by_type<H: ProtocolHandler>(&self) -> Result<Arc<H>, RegistryError> {
        let missing = || RegistryError::InterfaceNotFound(std::any::type_name::<H>());
        let key = self.by_type.get(&TypeId::of::<H>()).ok_or_else(missing)?;
        let registration = self.handlers.get(key).ok_or_else(missing)?;
        registration.any.clone().downcast::<H>().map_err(|_| missing())
    }

    pub fn handlers(&self) -> impl Iterator<Item = &Arc<dyn ProtocolHandler>> {
        self.handlers.values().map(|r| &r.handler)
    }

    /// Non-Core handlers as offered to negotiation.
    pub fn offered(&self) -> Vec<OfferedProtocol> {
        self.handlers()
            .filter(|h| h.protocol() != Protocol::CORE)
            .map(|h| OfferedProtocol {
                protocol: h.protocol(),
                role: h.role(),
                capabilities: h.capabilities(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.handlers
                    .iter()
                    .map(|((protocol, role), r)| (format!("{protocol}/{role}"), r.type_name)),
            )
            .finish()
    }
}
