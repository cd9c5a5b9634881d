//! StoreNotification protocol (5): change subscriptions and pushes.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{ErrorCode, ProtocolFault};
use crate::handlers::memory::{split_uri, MemoryStore};
use crate::messages::{
    current_date_time, ChangeNotification, DeleteNotification, EtpMessage, MessageBody,
    NotificationRequest, NotificationRequestRecord, ObjectChange, ObjectChangeType, Protocol,
    Resource, Role,
};
use crate::registry::ProtocolHandler;
use crate::session::{Session, SessionError};
use crate::subscription::{Subscription, SubscriptionHandle};

const UNCLAIMED_CAPACITY: usize = 256;

/// Store side. Registers subscriptions and runs a change feed that pushes
/// matching store changes while the session is open. Use one instance per
/// session.
pub struct NotificationStoreHandler {
    store: Arc<MemoryStore>,
    feed: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationStoreHandler {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            feed: Mutex::new(None),
        }
    }
}

impl ProtocolHandler for NotificationStoreHandler {
    fn protocol(&self) -> Protocol {
        Protocol::STORE_NOTIFICATION
    }

    fn role(&self) -> Role {
        Role::Store
    }

    fn handle_message(&self, session: &Session, message: &EtpMessage) -> Result<(), ProtocolFault> {
        match message.body() {
            MessageBody::NotificationRequest(request) => {
                let key = request.request.uuid.clone();
                session
                    .subscriptions()
                    .register(key.clone(), message.header().clone(), message.body().clone())
                    .map_err(|e| ProtocolFault::new(ErrorCode::RequestUuidRejected, e.to_string()))?;
                tracing::info!(
                    session = %session.id(),
                    subscription = %key,
                    uri = %request.request.uri,
                    "subscription registered"
                );
                Ok(())
            }
            MessageBody::CancelNotification(cancel) => {
                session
                    .subscriptions()
                    .unregister(&cancel.request_uuid)
                    .map_err(|e| ProtocolFault::not_found(e.to_string()))?;
                tracing::info!(session = %session.id(), subscription = %cancel.request_uuid, "subscription cancelled");
                Ok(())
            }
            _ => Err(ProtocolFault::new(
                ErrorCode::InvalidMessageType,
                format!("{} is not handled by the notification store", message.kind()),
            )),
        }
    }

    fn on_session_opened(&self, session: &Session) {
        let mut changes = self.store.subscribe();
        let session = session.clone();
        let feed = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => push_change(&session, &change),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(session = %session.id(), skipped, "change feed lagged");
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        });
        if let Some(previous) = self.feed.lock().replace(feed) {
            previous.abort();
        }
    }

    fn on_session_closed(&self) {
        if let Some(feed) = self.feed.lock().take() {
            feed.abort();
        }
    }
}

fn push_change(session: &Session, change: &ObjectChange) {
    for subscription in session.subscriptions().subscriptions() {
        let Some(record) = interested(&subscription, change) else {
            continue;
        };
        let mut change = change.clone();
        if !record.include_object_data {
            change.data_object.data.clear();
        }
        let request_uuid = subscription.key.clone();
        let body: MessageBody = match change.change_type {
            ObjectChangeType::Upsert => ChangeNotification { change, request_uuid }.into(),
            ObjectChangeType::Delete => DeleteNotification {
                delete: change,
                request_uuid,
            }
            .into(),
        };
        if let Err(e) = session.push_notification(body) {
            tracing::debug!(session = %session.id(), subscription = %subscription.key, error = %e, "push skipped");
        }
    }
}

fn interested<'a>(subscription: &'a Subscription, change: &ObjectChange) -> Option<&'a NotificationRequestRecord> {
    let MessageBody::NotificationRequest(request) = &subscription.request else {
        return None;
    };
    let record = &request.request;
    let resource = &change.data_object.resource;
    let under_uri = split_uri(&resource.uri).starts_with(&split_uri(&record.uri));
    let since_start = record.start_time <= 0 || change.change_time >= record.start_time;
    let type_matches = record.object_types.is_empty()
        || object_type(resource).is_some_and(|t| record.object_types.iter().any(|want| want == t));
    (under_uri && since_start && type_matches).then_some(record)
}

/// The `type=` parameter of a resource's content type.
fn object_type(resource: &Resource) -> Option<&str> {
    resource
        .content_type
        .split(';')
        .find_map(|param| param.trim().strip_prefix("type="))
}

/// Customer side. Pushes not claimed by a [`SubscriptionHandle`] are
/// rebroadcast to [`NotificationCustomerHandler::notifications`].
pub struct NotificationCustomerHandler {
    unclaimed: broadcast::Sender<EtpMessage>,
}

impl Default for NotificationCustomerHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationCustomerHandler {
    pub fn new() -> Self {
        let (unclaimed, _) = broadcast::channel(UNCLAIMED_CAPACITY);
        Self { unclaimed }
    }

    pub fn notifications(&self) -> broadcast::Receiver<EtpMessage> {
        self.unclaimed.subscribe()
    }

    /// Subscribes to changes below `uri`, optionally limited to object types.
    pub fn subscribe(
        &self,
        session: &Session,
        uri: impl Into<String>,
        object_types: Vec<String>,
        include_object_data: bool,
    ) -> Result<SubscriptionHandle, SessionError> {
        session.subscribe(NotificationRequest {
            request: NotificationRequestRecord {
                uri: uri.into(),
                uuid: Uuid::new_v4().to_string(),
                include_object_data,
                start_time: current_date_time(),
                object_types,
            },
        })
    }
}

impl ProtocolHandler for NotificationCustomerHandler {
    fn protocol(&self) -> Protocol {
        Protocol::STORE_NOTIFICATION
    }

    fn role(&self) -> Role {
        Role::Customer
    }

    fn handle_message(&self, session: &Session, message: &EtpMessage) -> Result<(), ProtocolFault> {
        if !message.body().is_push() {
            return Err(ProtocolFault::new(
                ErrorCode::InvalidMessageType,
                format!("{} is not expected by a notification customer", message.kind()),
            ));
        }
        if self.unclaimed.send(message.clone()).is_err() {
            tracing::debug!(
                session = %session.id(),
                subscription = message.body().subscription_key().unwrap_or_default(),
                "push without a listener dropped"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{MessageFlags, MessageHeader};
    use crate::handlers::memory::sample_object;

    fn subscription(uri: &str, object_types: Vec<String>, start_time: i64) -> Subscription {
        Subscription {
            key: "k".to_string(),
            originating_header: MessageHeader::new(Protocol::STORE_NOTIFICATION, 1, 0, MessageFlags::NONE),
            request: NotificationRequest {
                request: NotificationRequestRecord {
                    uri: uri.to_string(),
                    uuid: "k".to_string(),
                    include_object_data: false,
                    start_time,
                    object_types,
                },
            }
            .into(),
            created_at: chrono::Utc::now(),
        }
    }

    fn change(uri: &str, object_type: &str, change_time: i64) -> ObjectChange {
        ObjectChange {
            change_type: ObjectChangeType::Upsert,
            change_time,
            data_object: sample_object(uri, "x", object_type),
        }
    }

    #[test]
    fn matches_by_uri_prefix() {
        let sub = subscription("eml:///witsml/well(1)", vec![], 0);
        assert!(interested(&sub, &change("eml:///witsml/well(1)/wellbore(2)", "wellbore", 5)).is_some());
        assert!(interested(&sub, &change("eml:///witsml/well(10)", "well", 5)).is_none());
        assert!(interested(&subscription("/", vec![], 0), &change("eml:///a", "well", 5)).is_some());
    }

    #[test]
    fn filters_by_type_and_start_time() {
        let sub = subscription("/", vec!["wellbore".to_string()], 100);
        assert!(interested(&sub, &change("eml:///a/b", "wellbore", 150)).is_some());
        assert!(interested(&sub, &change("eml:///a/b", "well", 150)).is_none());
        assert!(interested(&sub, &change("eml:///a/b", "wellbore", 50)).is_none());
    }

    #[test]
    fn reads_type_from_content_type() {
        let object = sample_object("eml:///w", "w", "log");
        assert_eq!(object_type(&object.resource), Some("log"));
    }
}
