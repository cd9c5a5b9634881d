//! Caller-side handle for an outstanding request.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::codec::MessageId;
use crate::correlation::tracker::{
    CancelReason, CorrelationTracker, RequestError, RequestOutcome, ResponseSet,
};

/// Awaits the outcome of one request.
///
/// Dropping the handle before it settles removes the pending entry, so a
/// caller that walks away never leaves a dangling waiter behind.
pub struct PendingResponse {
    request_id: MessageId,
    rx: oneshot::Receiver<RequestOutcome>,
    tracker: Arc<CorrelationTracker>,
    default_timeout: Duration,
    settled: bool,
}

impl std::fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResponse")
            .field("request_id", &self.request_id)
            .field("settled", &self.settled)
            .finish_non_exhaustive()
    }
}

impl PendingResponse {
    pub(crate) fn new(
        request_id: MessageId,
        rx: oneshot::Receiver<RequestOutcome>,
        tracker: Arc<CorrelationTracker>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            request_id,
            rx,
            tracker,
            default_timeout,
            settled: false,
        }
    }

    pub fn request_id(&self) -> MessageId {
        self.request_id
    }

    /// Waits up to the session's configured request timeout.
    pub async fn wait(self) -> Result<ResponseSet, RequestError> {
        let timeout = self.default_timeout;
        self.wait_timeout(timeout).await
    }

    pub async fn wait_timeout(mut self, timeout: Duration) -> Result<ResponseSet, RequestError> {
        let outcome = match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RequestError::Cancelled(CancelReason::ConnectionClosed)),
            Err(_) => {
                if self.tracker.fail(self.request_id, RequestError::TimedOut(timeout)) {
                    Err(RequestError::TimedOut(timeout))
                } else {
                    // Settled between the deadline and the removal.
                    self.rx
                        .try_recv()
                        .unwrap_or(Err(RequestError::TimedOut(timeout)))
                }
            }
        };
        self.settled = true;
        outcome
    }

    /// Abandons the request; a late response is dropped as unknown.
    pub fn cancel(mut self) {
        self.tracker.cancel(self.request_id, CancelReason::Caller);
        self.settled = true;
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if !self.settled {
            self.tracker.remove(self.request_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{MessageFlags, MessageHeader};
    use crate::correlation::ResponseKind;
    use crate::messages::{EtpMessage, MessageKind, Object, Protocol};

    fn pending(tracker: &Arc<CorrelationTracker>, id: MessageId) -> PendingResponse {
        let rx = tracker
            .register(id, MessageKind::GetObject, ResponseKind::Single, &[MessageKind::Object])
            .unwrap();
        PendingResponse::new(id, rx, tracker.clone(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn timeout_removes_the_entry() {
        let tracker = Arc::new(CorrelationTracker::new(8));
        let response = pending(&tracker, 1);

        let err = response.wait_timeout(Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(err, RequestError::TimedOut(Duration::from_millis(20)));
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn drop_and_cancel_release_the_entry() {
        let tracker = Arc::new(CorrelationTracker::new(8));
        drop(pending(&tracker, 1));
        assert!(!tracker.is_pending(1));

        pending(&tracker, 2).cancel();
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn settled_response_is_returned() {
        let tracker = Arc::new(CorrelationTracker::new(8));
        let response = pending(&tracker, 4);

        let header = MessageHeader::new(Protocol::STORE, 4, 4, MessageFlags::FINAL_PART);
        let object = Object {
            data_object: crate::messages::DataObject {
                resource: crate::messages::Resource {
                    uri: "eml:///well(1)".into(),
                    name: "Well 1".into(),
                    content_type: String::new(),
                    resource_type: "DataObject".into(),
                    has_children: 0,
                    uuid: None,
                    last_changed: 0,
                    custom_data: Default::default(),
                },
                content_encoding: String::new(),
                data: b"<well/>".to_vec(),
            },
        };
        tracker.on_message(EtpMessage::new(header, object));

        let set = response.wait().await.unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.request_id(), 4);
    }
}
