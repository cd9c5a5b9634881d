//! Pending request table keyed by message id.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::capabilities::NegotiationError;
use crate::codec::MessageId;
use crate::correlation::reassembly::{Reassembly, ReassemblyStep};
use crate::error::ErrorCode;
use crate::messages::{EtpMessage, MessageBody, MessageKind, ProtocolException};
use crate::observability::metrics;
use crate::version::ResponseArity;

/// How a request expects to be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Single,
    MultiPart,
    /// No body expected; settled by an Acknowledge.
    FireAndForget,
    /// Long-lived; owned by the subscription registry, never tracked here.
    Notification,
}

impl ResponseKind {
    pub fn from_arity(arity: ResponseArity) -> Self {
        match arity {
            ResponseArity::None => ResponseKind::FireAndForget,
            ResponseArity::Single => ResponseKind::Single,
            ResponseArity::MultiPart => ResponseKind::MultiPart,
            ResponseArity::Subscription => ResponseKind::Notification,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ResponseKind::Single => "single",
            ResponseKind::MultiPart => "multipart",
            ResponseKind::FireAndForget => "fire_and_forget",
            ResponseKind::Notification => "notification",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    ConnectionClosed,
    Caller,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::ConnectionClosed => f.write_str("connection closed"),
            CancelReason::Caller => f.write_str("cancelled by caller"),
        }
    }
}

/// Terminal failure of a request, delivered on the same channel as success.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("counterpart raised {}: {}", describe_code(.0.error_code), .0.error_message)]
    Exception(ProtocolException),
    #[error("request cancelled: {0}")]
    Cancelled(CancelReason),
    #[error("no response within {0:?}")]
    TimedOut(Duration),
    #[error("{request} was answered with {actual}")]
    UnexpectedResponse {
        request: MessageKind,
        actual: MessageKind,
    },
    #[error(transparent)]
    Negotiation(NegotiationError),
}

impl RequestError {
    /// The ETP error code, when the counterpart sent one.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            RequestError::Exception(e) => ErrorCode::from_code(e.error_code),
            RequestError::Negotiation(e) => Some(e.error_code()),
            _ => None,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            RequestError::Exception(_) => "exception",
            RequestError::Cancelled(_) => "cancelled",
            RequestError::TimedOut(_) => "timed_out",
            RequestError::UnexpectedResponse { .. } => "unexpected",
            RequestError::Negotiation(_) => "rejected",
        }
    }
}

fn describe_code(code: i32) -> String {
    match ErrorCode::from_code(code) {
        Some(known) => known.to_string(),
        None => format!("error {code}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("too many pending requests (limit {0})")]
    TooManyPending(usize),
    #[error("message id {0} is already pending")]
    DuplicateId(MessageId),
}

/// The completed answer to a request: every response part in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSet {
    request_id: MessageId,
    parts: Vec<EtpMessage>,
}

impl ResponseSet {
    pub fn new(request_id: MessageId, parts: Vec<EtpMessage>) -> Self {
        Self { request_id, parts }
    }

    pub fn request_id(&self) -> MessageId {
        self.request_id
    }

    pub fn parts(&self) -> &[EtpMessage] {
        &self.parts
    }

    pub fn into_parts(self) -> Vec<EtpMessage> {
        self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn bodies(&self) -> impl Iterator<Item = &MessageBody> {
        self.parts.iter().map(EtpMessage::body)
    }

    pub fn into_single(self) -> Option<EtpMessage> {
        self.parts.into_iter().next()
    }
}

pub type RequestOutcome = Result<ResponseSet, RequestError>;

pub enum Correlation {
    Consumed,
    /// No pending request matched; the message is handed back.
    Unmatched(EtpMessage),
}

struct PendingRequest {
    request: MessageKind,
    kind: ResponseKind,
    expected: &'static [MessageKind],
    reassembly: Reassembly,
    sent_at: Instant,
    tx: oneshot::Sender<RequestOutcome>,
}

enum Progress {
    Pending,
    Settled(RequestOutcome),
}

impl PendingRequest {
    fn accept(&mut self, request_id: MessageId, message: EtpMessage) -> Progress {
        let flags = message.header().message_flags;
        let kind = message.kind();
        if let MessageBody::ProtocolException(exception) = message.body() {
            return Progress::Settled(Err(RequestError::Exception(exception.clone())));
        }
        if kind == MessageKind::Acknowledge {
            if !flags.has_no_data() {
                return if self.kind == ResponseKind::FireAndForget {
                    Progress::Settled(Ok(ResponseSet::new(request_id, vec![message])))
                } else {
                    Progress::Pending
                };
            }
        } else if !self.expected.contains(&kind) {
            return Progress::Settled(Err(RequestError::UnexpectedResponse {
                request: self.request,
                actual: kind,
            }));
        }

        if self.kind == ResponseKind::Single {
            let parts = if flags.has_no_data() { Vec::new() } else { vec![message] };
            return Progress::Settled(Ok(ResponseSet::new(request_id, parts)));
        }

        match self.reassembly.push(message) {
            Ok(ReassemblyStep::Pending) => Progress::Pending,
            Ok(ReassemblyStep::Complete(parts)) => {
                Progress::Settled(Ok(ResponseSet::new(request_id, parts)))
            }
            Err(e) => {
                tracing::warn!(request_id, error = %e, "dropping response part");
                Progress::Pending
            }
        }
    }

    fn settle(self, request_id: MessageId, outcome: RequestOutcome) {
        let label = match &outcome {
            Ok(_) => "ok",
            Err(e) => e.outcome(),
        };
        metrics::record_request(self.request.name(), label, self.sent_at.elapsed());
        if self.tx.send(outcome).is_err() {
            tracing::debug!(request_id, "response arrived after the caller stopped waiting");
        }
    }
}

/// Outstanding requests of one session.
pub struct CorrelationTracker {
    pending: Mutex<HashMap<MessageId, PendingRequest>>,
    max_pending: usize,
}

impl CorrelationTracker {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            max_pending,
        }
    }

    /// Records a request before it becomes visible to the transport.
    pub fn register(
        &self,
        request_id: MessageId,
        request: MessageKind,
        kind: ResponseKind,
        expected: &'static [MessageKind],
    ) -> Result<oneshot::Receiver<RequestOutcome>, TrackerError> {
        let mut pending = self.pending.lock();
        if pending.len() >= self.max_pending {
            return Err(TrackerError::TooManyPending(self.max_pending));
        }
        if pending.contains_key(&request_id) {
            return Err(TrackerError::DuplicateId(request_id));
        }

        let (tx, rx) = oneshot::channel();
        pending.insert(
            request_id,
            PendingRequest {
                request,
                kind,
                expected,
                reassembly: Reassembly::new(),
                sent_at: Instant::now(),
                tx,
            },
        );
        metrics::set_pending_requests(pending.len());
        Ok(rx)
    }

    /// Routes a correlated inbound message to its pending request.
    pub fn on_message(&self, message: EtpMessage) -> Correlation {
        let request_id = message.header().correlation_id;
        let mut pending = self.pending.lock();
        let Some(entry) = pending.get_mut(&request_id) else {
            return Correlation::Unmatched(message);
        };

        let outcome = match entry.accept(request_id, message) {
            Progress::Pending => return Correlation::Consumed,
            Progress::Settled(outcome) => outcome,
        };
        let entry = pending.remove(&request_id);
        metrics::set_pending_requests(pending.len());
        drop(pending);

        if let Some(entry) = entry {
            entry.settle(request_id, outcome);
        }
        Correlation::Consumed
    }

    /// Settles a pending request with an error. Returns false if it was not pending.
    pub fn fail(&self, request_id: MessageId, error: RequestError) -> bool {
        let entry = {
            let mut pending = self.pending.lock();
            let entry = pending.remove(&request_id);
            metrics::set_pending_requests(pending.len());
            entry
        };
        match entry {
            Some(entry) => {
                entry.settle(request_id, Err(error));
                true
            }
            None => false,
        }
    }

    pub fn cancel(&self, request_id: MessageId, reason: CancelReason) -> bool {
        self.fail(request_id, RequestError::Cancelled(reason))
    }

    /// Forgets a request without notifying its waiter.
    pub fn remove(&self, request_id: MessageId) -> bool {
        let mut pending = self.pending.lock();
        let removed = pending.remove(&request_id).is_some();
        metrics::set_pending_requests(pending.len());
        removed
    }

    /// Settles every pending request as cancelled. Returns how many there were.
    pub fn cancel_all(&self, reason: CancelReason) -> usize {
        let drained: Vec<(MessageId, PendingRequest)> = {
            let mut pending = self.pending.lock();
            let drained = pending.drain().collect();
            metrics::set_pending_requests(0);
            drained
        };

        let count = drained.len();
        for (request_id, entry) in drained {
            if !entry.reassembly.is_empty() {
                tracing::warn!(
                    request_id,
                    parts = entry.reassembly.len(),
                    "multi-part response abandoned before its final part"
                );
            }
            entry.settle(request_id, Err(RequestError::Cancelled(reason)));
        }
        count
    }

    pub fn is_pending(&self, request_id: MessageId) -> bool {
        self.pending.lock().contains_key(&request_id)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
