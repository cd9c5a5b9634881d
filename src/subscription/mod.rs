//! Subscription registry.
//!
//! # Data Flow
//! ```text
//! customer: Session::subscribe()
//!     → register_with_events(key, header, request)   (before the wire)
//!     → pushes arrive uncorrelated, carrying requestUuid = key
//!     → deliver() → SubscriptionHandle::next()
//!
//! store: NotificationRequest received
//!     → register(key, header, request)
//!     → change feed → lookup/subscriptions() → Session::push_notification()
//!
//! ProtocolException correlated to our subscribe message
//!     → reject(message_id) → Rejected event, entry removed
//! ```
//!
//! # Design Decisions
//! - Keyed by the caller-chosen key, never by correlation id
//! - Only subscriptions this endpoint sent are indexed by message id; the
//!   store side sees the customer's ids, which live in another id space
//! - Session close clears the registry and ends every event stream

mod handle;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::codec::{MessageHeader, MessageId};
use crate::messages::{EtpMessage, MessageBody, ProtocolException};

pub use handle::SubscriptionHandle;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error("subscription {0} already exists")]
    Duplicate(String),
    #[error("no subscription {0}")]
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub key: String,
    pub originating_header: MessageHeader,
    pub request: MessageBody,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Notification(EtpMessage),
    /// The counterpart refused the subscription; no further events follow.
    Rejected(ProtocolException),
    /// Cancelled locally or the session closed.
    Closed,
}

struct Entry {
    subscription: Arc<Subscription>,
    events: Option<mpsc::UnboundedSender<SubscriptionEvent>>,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    by_key: DashMap<String, Entry>,
    by_request: DashMap<MessageId, String>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store side: records a subscription the counterpart requested.
    pub fn register(
        &self,
        key: impl Into<String>,
        originating_header: MessageHeader,
        request: MessageBody,
    ) -> Result<(), SubscriptionError> {
        self.insert(key.into(), originating_header, request, None)
    }

    /// Customer side: registers a subscription this endpoint is sending, with
    /// its pushes streamed to the returned receiver. A ProtocolException
    /// correlated to the request's message id rejects it.
    pub fn register_with_events(
        &self,
        key: impl Into<String>,
        originating_header: MessageHeader,
        request: MessageBody,
    ) -> Result<mpsc::UnboundedReceiver<SubscriptionEvent>, SubscriptionError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.insert(key.into(), originating_header, request, Some(tx))?;
        Ok(rx)
    }

    fn insert(
        &self,
        key: String,
        originating_header: MessageHeader,
        request: MessageBody,
        events: Option<mpsc::UnboundedSender<SubscriptionEvent>>,
    ) -> Result<(), SubscriptionError> {
        let request_id = events.as_ref().map(|_| originating_header.message_id);
        match self.by_key.entry(key.clone()) {
            MapEntry::Occupied(_) => return Err(SubscriptionError::Duplicate(key)),
            MapEntry::Vacant(slot) => {
                slot.insert(Entry {
                    subscription: Arc::new(Subscription {
                        key: key.clone(),
                        originating_header,
                        request,
                        created_at: Utc::now(),
                    }),
                    events,
                });
            }
        }
        if let Some(request_id) = request_id.filter(|id| *id != 0) {
            self.by_request.insert(request_id, key);
        }
        Ok(())
    }

    pub fn unregister(&self, key: &str) -> Result<Arc<Subscription>, SubscriptionError> {
        let (_, entry) = self
            .by_key
            .remove(key)
            .ok_or_else(|| SubscriptionError::Unknown(key.to_string()))?;
        self.by_request
            .remove_if(&entry.subscription.originating_header.message_id, |_, k| k == key);
        if let Some(events) = &entry.events {
            let _ = events.send(SubscriptionEvent::Closed);
        }
        Ok(entry.subscription)
    }

    pub fn lookup(&self, key: &str) -> Option<Arc<Subscription>> {
        self.by_key.get(key).map(|e| e.subscription.clone())
    }

    /// Key of the subscription this endpoint created with the given message id.
    pub fn lookup_by_request(&self, request_id: MessageId) -> Option<String> {
        self.by_request.get(&request_id).map(|k| k.clone())
    }

    /// Routes a push to its subscription's event stream. The message is handed
    /// back when nothing consumes it.
    pub fn deliver(&self, message: EtpMessage) -> Result<(), EtpMessage> {
        let Some(key) = message.body().subscription_key() else {
            return Err(message);
        };
        let Some(entry) = self.by_key.get(key) else {
            return Err(message);
        };
        match &entry.events {
            Some(events) => match events.send(SubscriptionEvent::Notification(message)) {
                Ok(()) => Ok(()),
                // The handle was dropped; fall back to the protocol handler.
                Err(mpsc::error::SendError(SubscriptionEvent::Notification(message))) => Err(message),
                Err(_) => Ok(()),
            },
            None => Err(message),
        }
    }

    /// Removes the subscription created by `request_id` and reports the rejection.
    pub fn reject(&self, request_id: MessageId, exception: ProtocolException) -> bool {
        let Some((_, key)) = self.by_request.remove(&request_id) else {
            return false;
        };
        if let Some((_, entry)) = self.by_key.remove(&key) {
            tracing::warn!(
                subscription = %key,
                code = exception.error_code,
                message = %exception.error_message,
                "subscription rejected"
            );
            if let Some(events) = &entry.events {
                let _ = events.send(SubscriptionEvent::Rejected(exception));
            }
        }
        true
    }

    /// Snapshot of the live subscriptions.
    pub fn subscriptions(&self) -> Vec<Arc<Subscription>> {
        self.by_key.iter().map(|e| e.subscription.clone()).collect()
    }

    /// Drops every subscription, ending all event streams.
    pub fn clear(&self) -> usize {
        let keys: Vec<String> = self.by_key.iter().map(|e| e.key().clone()).collect();
        let mut cleared = 0;
        for key in keys {
            if let Some((_, entry)) = self.by_key.remove(&key) {
                if let Some(events) = &entry.events {
                    let _ = events.send(SubscriptionEvent::Closed);
                }
                cleared += 1;
            }
        }
        self.by_request.clear();
        cleared
    }

    pub fn keys(&self) -> Vec<String> {
        self.by_key.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MessageFlags;
    use crate::messages::{
        ChangeNotification, DataObject, NotificationRequest, NotificationRequestRecord,
        ObjectChange, ObjectChangeType, Protocol, Resource,
    };

    fn request(key: &str) -> (MessageHeader, MessageBody) {
        let header =
            MessageHeader::new(Protocol::STORE_NOTIFICATION, 1, 0, MessageFlags::NONE).with_message_id(11);
        let body = NotificationRequest {
            request: NotificationRequestRecord {
                uri: "eml:///".into(),
                uuid: key.into(),
                include_object_data: true,
                start_time: 0,
                object_types: Vec::new(),
            },
        };
        (header, body.into())
    }

    fn push(key: &str) -> EtpMessage {
        let header = MessageHeader::new(Protocol::STORE_NOTIFICATION, 2, 0, MessageFlags::NONE);
        EtpMessage::new(
            header,
            ChangeNotification {
                change: ObjectChange {
                    change_type: ObjectChangeType::Upsert,
                    change_time: 1,
                    data_object: DataObject {
                        resource: Resource {
                            uri: "eml:///well(1)".into(),
                            name: "Well 1".into(),
                            content_type: String::new(),
                            resource_type: "DataObject".into(),
                            has_children: 0,
                            uuid: None,
                            last_changed: 1,
                            custom_data: Default::default(),
                        },
                        content_encoding: String::new(),
                        data: Vec::new(),
                    },
                },
                request_uuid: key.into(),
            },
        )
    }

    #[test]
    fn duplicate_and_unknown_keys() {
        let registry = SubscriptionRegistry::new();
        let (header, body) = request("k1");
        registry.register("k1", header.clone(), body.clone()).unwrap();
        assert_eq!(
            registry.register("k1", header, body),
            Err(SubscriptionError::Duplicate("k1".into()))
        );
        assert_eq!(
            registry.unregister("nope").unwrap_err(),
            SubscriptionError::Unknown("nope".into())
        );

        let removed = registry.unregister("k1").unwrap();
        assert_eq!(removed.originating_header.message_id, 11);
        assert!(registry.lookup_by_request(11).is_none());
    }

    #[test]
    fn inbound_subscriptions_are_not_indexed_by_the_peers_message_id() {
        let registry = SubscriptionRegistry::new();
        let (header, body) = request("theirs");
        registry.register("theirs", header, body).unwrap();
        let (header, body) = request("ours");
        let _events = registry
            .register_with_events("ours", header.with_message_id(12), body)
            .unwrap();

        let exception = ProtocolException {
            error_code: 5,
            error_message: "no such push".into(),
        };
        assert!(registry.lookup_by_request(11).is_none());
        assert!(!registry.reject(11, exception.clone()));
        assert!(registry.lookup("theirs").is_some());

        // Removing the store-side entry leaves our own index alone.
        registry.unregister("theirs").unwrap();
        assert_eq!(registry.lookup_by_request(12).as_deref(), Some("ours"));
        assert!(registry.reject(12, exception));
        assert!(registry.is_empty());
    }

    #[test]
    fn pushes_reach_the_stream_by_key() {
        let registry = SubscriptionRegistry::new();
        let (header, body) = request("k1");
        let mut events = registry.register_with_events("k1", header, body).unwrap();

        assert!(registry.deliver(push("k1")).is_ok());
        assert!(registry.deliver(push("other")).is_err());

        match events.try_recv().unwrap() {
            SubscriptionEvent::Notification(message) => {
                assert_eq!(message.header().correlation_id, 0);
            }
            other => panic!("unexpected event {other:?}"),
        }
        let found = registry.lookup("k1").unwrap();
        assert_eq!(found.originating_header.message_id, 11);
    }

    #[test]
    fn rejection_removes_the_subscription() {
        let registry = SubscriptionRegistry::new();
        let (header, body) = request("k1");
        let mut events = registry.register_with_events("k1", header, body).unwrap();

        let exception = ProtocolException {
            error_code: 22,
            error_message: "duplicate request uuid".into(),
        };
        assert!(registry.reject(11, exception.clone()));
        assert!(!registry.reject(11, exception.clone()));
        assert!(registry.is_empty());
        assert_eq!(events.try_recv().unwrap(), SubscriptionEvent::Rejected(exception));
    }

    #[test]
    fn clear_closes_every_stream() {
        let registry = SubscriptionRegistry::new();
        let (header, body) = request("a");
        let mut a = registry.register_with_events("a", header, body).unwrap();
        let (header, body) = request("b");
        registry.register("b", header.with_message_id(12), body).unwrap();

        assert_eq!(registry.clear(), 2);
        assert_eq!(a.try_recv().unwrap(), SubscriptionEvent::Closed);
        assert!(registry.lookup("b").is_none());
    }
}
