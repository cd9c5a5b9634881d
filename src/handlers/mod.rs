//! Protocol handlers shipped with the devkit.
//!
//! `core` is installed by every session. The rest are sample store and
//! customer sides for Discovery, Store and StoreNotification backed by
//! [`MemoryStore`].

pub mod core;
pub mod discovery;
pub mod memory;
pub mod notification;
pub mod store;

use std::sync::Arc;

use crate::registry::HandlerRegistry;

pub use self::core::CoreHandler;
pub use discovery::{DiscoveryCustomerHandler, DiscoveryStoreHandler};
pub use memory::MemoryStore;
pub use notification::{NotificationCustomerHandler, NotificationStoreHandler};
pub use store::{StoreCustomerHandler, StoreHandler};

/// Store-side handlers over a shared store. Build one registry per session;
/// the notification handler owns a per-session change feed.
pub fn store_registry(store: Arc<MemoryStore>, max_response_count: usize) -> HandlerRegistry {
    HandlerRegistry::new()
        .with(Arc::new(
            DiscoveryStoreHandler::new(store.clone()).with_max_response_count(max_response_count),
        ))
        .with(Arc::new(StoreHandler::new(store.clone())))
        .with(Arc::new(NotificationStoreHandler::new(store)))
}

/// Customer-side handlers for all sample protocols.
pub fn customer_registry() -> HandlerRegistry {
    HandlerRegistry::new()
        .with(Arc::new(DiscoveryCustomerHandler::new()))
        .with(Arc::new(StoreCustomerHandler::new()))
        .with(Arc::new(NotificationCustomerHandler::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Protocol, Role};

    #[test]
    fn registries_cover_both_sides() {
        let store = store_registry(Arc::new(MemoryStore::new()), 100);
        assert_eq!(store.len(), 3);
        assert!(store.resolve(Protocol::DISCOVERY, Role::Store).is_ok());
        assert!(store.resolve(Protocol::STORE_NOTIFICATION, Role::Store).is_ok());

        let customer = customer_registry();
        assert!(customer.resolve_by_type::<StoreCustomerHandler>().is_ok());
        assert!(customer.resolve(Protocol::DISCOVERY, Role::Store).is_err());
        assert_eq!(customer.offered().len(), 3);
    }
}
