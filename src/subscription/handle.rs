use tokio::sync::mpsc;

use crate::session::{Session, SessionError};
use crate::subscription::SubscriptionEvent;

/// Customer-side view of one subscription.
///
/// Dropping a live handle cancels the subscription as [`cancel`] would, so
/// neither side keeps an entry nobody reads.
///
/// [`cancel`]: SubscriptionHandle::cancel
pub struct SubscriptionHandle {
    key: String,
    events: mpsc::UnboundedReceiver<SubscriptionEvent>,
    session: Session,
    finished: bool,
}

impl SubscriptionHandle {
    pub(crate) fn new(
        key: String,
        events: mpsc::UnboundedReceiver<SubscriptionEvent>,
        session: Session,
    ) -> Self {
        Self {
            key,
            events,
            session,
            finished: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Next event; `None` once the subscription was rejected or closed.
    pub async fn next(&mut self) -> Option<SubscriptionEvent> {
        if self.finished {
            return None;
        }
        let event = self.events.recv().await;
        if !matches!(event, Some(SubscriptionEvent::Notification(_))) {
            self.finished = true;
        }
        event
    }

    /// Unregisters locally and tells the store to stop pushing.
    pub fn cancel(mut self) -> Result<(), SessionError> {
        self.finished = true;
        self.session.cancel_subscription(&self.key)
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.session.cancel_subscription(&self.key) {
            tracing::debug!(session = %self.session.id(), subscription = %self.key, error = %e, "cancel on drop skipped");
        }
    }
}
