use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;

use crate::auth::Credentials;
use crate::capabilities::{EndpointDescriptor, SessionState};
use crate::codec::{MessageCodec, MessageFlags, MessageHeader, MessageId};
use crate::config::SessionConfig;
use crate::correlation::{
    CancelReason, Correlation, CorrelationTracker, PendingResponse, ResponseKind,
};
use crate::error::{ErrorCode, ProtocolFault};
use crate::messages::{
    current_date_time, Acknowledge, Authorize, CancelNotification, CloseSession, EtpMessage,
    MessageBody, MessageKind, NotificationRequest, Ping, Protocol, RenewSecurityToken, Role,
    SupportedProtocol,
};
use crate::observability::metrics::{self, Direction};
use crate::registry::{HandlerRegistry, ProtocolHandler};
use crate::session::outbound::Outbound;
use crate::session::phase::PhaseCell;
use crate::session::{SessionError, SessionOptions, SessionPhase};
use crate::subscription::{SubscriptionHandle, SubscriptionRegistry};
use crate::transport::connection::ConnectionId;
use crate::transport::{Frame, TransportEvent, TransportHandle};
use crate::version::catalog::{CatalogEntry, ACKNOWLEDGE, PROTOCOL_EXCEPTION};
use crate::version::{adapter_for, EtpVersion, MessageCatalog, ResponseArity, VersionAdapter};

/// Responses a raw request accepts.
const RAW_RESPONSES: &[MessageKind] = &[MessageKind::Raw];

struct Route {
    protocol: Protocol,
    message_type: u32,
    entry: Option<&'static CatalogEntry>,
}

impl Route {
    fn arity(&self) -> Option<ResponseArity> {
        self.entry.map(|entry| entry.arity)
    }
}

#[derive(Default)]
struct Link {
    peer: String,
    credentials: Option<Credentials>,
}

pub(crate) struct SessionInner {
    pub(crate) id: ConnectionId,
    pub(crate) role: Role,
    pub(crate) adapter: Arc<dyn VersionAdapter>,
    pub(crate) core: Arc<dyn ProtocolHandler>,
    pub(crate) endpoint: EndpointDescriptor,
    pub(crate) config: SessionConfig,
    pub(crate) phase: PhaseCell,
    pub(crate) registry: ArcSwap<HandlerRegistry>,
    pub(crate) state: ArcSwapOption<SessionState>,
    pub(crate) outbound: Outbound,
    pub(crate) tracker: Arc<CorrelationTracker>,
    pub(crate) subscriptions: SubscriptionRegistry,
    pub(crate) requested: Mutex<Vec<SupportedProtocol>>,
    pub(crate) keepalive: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    stop: Notify,
    closed_tx: watch::Sender<bool>,
    link: Mutex<Link>,
}

/// One ETP connection, client or server side.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(options: SessionOptions, registry: HandlerRegistry) -> Result<Self, SessionError> {
        if !matches!(options.role, Role::Client | Role::Server) {
            return Err(SessionError::WrongRole(options.role));
        }
        let adapter = adapter_for(options.version);
        let core = adapter.core_handler(options.role);
        let codec = MessageCodec::new(adapter.as_ref(), options.encoding);
        let (closed_tx, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(SessionInner {
                id: ConnectionId::next(),
                role: options.role,
                adapter,
                core,
                endpoint: options.endpoint,
                tracker: Arc::new(CorrelationTracker::new(options.config.max_pending_requests)),
                config: options.config,
                phase: PhaseCell::new(),
                registry: ArcSwap::from_pointee(registry),
                state: ArcSwapOption::empty(),
                outbound: Outbound::new(codec),
                subscriptions: SubscriptionRegistry::new(),
                requested: Mutex::new(Vec::new()),
                keepalive: Mutex::new(None),
                started: AtomicBool::new(false),
                stop: Notify::new(),
                closed_tx,
                link: Mutex::new(Link::default()),
            }),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Client or Server.
    pub fn role(&self) -> Role {
        self.inner.role
    }

    pub fn version(&self) -> EtpVersion {
        self.inner.adapter.version()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.phase.get()
    }

    pub fn is_open(&self) -> bool {
        self.phase() == SessionPhase::Open
    }

    /// Negotiated state; `None` until the handshake completes.
    pub fn state(&self) -> Option<Arc<SessionState>> {
        self.inner.state.load_full()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn endpoint(&self) -> &EndpointDescriptor {
        &self.inner.endpoint
    }

    pub fn peer(&self) -> String {
        self.inner.link.lock().peer.clone()
    }

    /// Credentials the transport authenticated before the session started.
    pub fn credentials(&self) -> Option<Credentials> {
        self.inner.link.lock().credentials.clone()
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.tracker.len()
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.inner.subscriptions
    }

    pub fn catalog(&self) -> &'static MessageCatalog {
        self.inner.adapter.catalog()
    }

    pub fn registry(&self) -> Arc<HandlerRegistry> {
        self.inner.registry.load_full()
    }

    /// Adds or replaces a handler. Fails once a transport is attached.
    pub fn register_handler<H: ProtocolHandler>(&self, handler: Arc<H>) -> Result<(), SessionError> {
        if self.inner.started.load(Ordering::Acquire) {
            return Err(crate::registry::RegistryError::Frozen.into());
        }
        self.inner.registry.rcu(|current| {
            let mut next = HandlerRegistry::clone(current);
            next.register(handler.clone());
            next
        });
        Ok(())
    }

    pub fn handler<H: ProtocolHandler>(&self) -> Result<Arc<H>, SessionError> {
        Ok(self.inner.registry.load().resolve_by_type::<H>()?)
    }

    /// Binds the session to a transport and starts the read loop. The session
    /// moves to Opening; clients follow up with [`Session::open`].
    pub fn attach(&self, transport: TransportHandle) -> Result<JoinHandle<()>, SessionError> {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Err(SessionError::AlreadyStarted);
        }
        self.inner.phase.begin_opening().map_err(SessionError::NotOpen)?;

        let TransportHandle {
            outbound,
            inbound,
            peer,
            credentials,
        } = transport;
        {
            let mut link = self.inner.link.lock();
            link.peer = peer;
            link.credentials = credentials;
        }
        self.inner.outbound.attach(outbound);
        metrics::session_attached();
        tracing::info!(
            session = %self.id(),
            peer = %self.peer(),
            role = %self.role(),
            version = %self.version(),
            encoding = %self.inner.outbound.codec().encoding(),
            "session attached"
        );

        let session = self.clone();
        Ok(tokio::spawn(session.read_loop(inbound)))
    }

    async fn read_loop(self, mut inbound: mpsc::Receiver<TransportEvent>) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.inner.stop.notified() => break,
                event = inbound.recv() => event,
            };
            match event {
                Some(TransportEvent::Frame(frame)) => self.dispatch_frame(frame),
                Some(TransportEvent::Closed(reason)) => {
                    tracing::info!(session = %self.id(), reason = ?reason, "transport closed by peer");
                    self.shutdown(reason.unwrap_or_else(|| "transport closed".into()), false)
                        .await;
                    break;
                }
                Some(TransportEvent::Failed(e)) => {
                    tracing::warn!(session = %self.id(), error = %e, "transport failed");
                    self.shutdown(e.to_string(), false).await;
                    break;
                }
                None => {
                    self.shutdown("transport dropped".to_string(), false).await;
                    break;
                }
            }
        }
        tracing::debug!(session = %self.id(), "read loop finished");
    }

    // --- outbound -------------------------------------------------------

    fn entry(&self, kind: MessageKind) -> Result<&'static CatalogEntry, SessionError> {
        self.catalog()
            .entry(kind)
            .ok_or(SessionError::UnsupportedMessage(kind, self.version()))
    }

    /// Where an outgoing body goes on the wire. Raw bodies carry their own
    /// address and have no known arity.
    fn route(&self, body: &MessageBody) -> Result<Route, SessionError> {
        match body {
            MessageBody::Raw(raw) if self.catalog().knows_protocol(raw.protocol) => {
                Err(SessionError::RawForCataloguedProtocol(raw.protocol))
            }
            MessageBody::Raw(raw) => Ok(Route {
                protocol: raw.protocol,
                message_type: raw.message_type,
                entry: None,
            }),
            body => {
                let entry = self.entry(body.kind())?;
                Ok(Route {
                    protocol: entry.protocol,
                    message_type: entry.message_type,
                    entry: Some(entry),
                })
            }
        }
    }

    fn check_sendable(&self, protocol: Protocol) -> Result<(), SessionError> {
        match self.phase() {
            SessionPhase::Closing => Err(SessionError::Closed),
            SessionPhase::Closed if self.inner.started.load(Ordering::Acquire) => {
                Err(SessionError::Closed)
            }
            SessionPhase::Opening if protocol == Protocol::CORE => Ok(()),
            SessionPhase::Open => match self.state() {
                Some(state) if state.supports(protocol) => Ok(()),
                _ => Err(SessionError::UnsupportedProtocol(protocol)),
            },
            phase => Err(SessionError::NotOpen(phase)),
        }
    }

    fn emit<F>(
        &self,
        header: MessageHeader,
        body: MessageBody,
        closing: bool,
        prepare: F,
    ) -> Result<MessageId, SessionError>
    where
        F: FnOnce(&MessageHeader) -> Result<(), SessionError>,
    {
        let message = self.inner.outbound.push(header, body, closing, prepare)?;
        let header = message.header();
        metrics::record_message(Direction::Sent, self.version(), header.protocol, message.kind());
        tracing::trace!(
            session = %self.id(),
            kind = %message.kind(),
            message_id = header.message_id,
            correlation_id = header.correlation_id,
            flags = %header.message_flags,
            "sent"
        );
        Ok(header.message_id)
    }

    /// Sends a message without tracking a response.
    pub fn send(&self, body: impl Into<MessageBody>) -> Result<MessageId, SessionError> {
        let body = body.into();
        let route = self.route(&body)?;
        if route.arity() == Some(ResponseArity::Subscription) {
            return Err(SessionError::SubscriptionRequest);
        }
        self.check_sendable(route.protocol)?;
        let header = MessageHeader::new(route.protocol, route.message_type, 0, MessageFlags::NONE);
        self.emit(header, body, false, |_| Ok(()))
    }

    /// Sends a request and returns a handle to its outcome. Fire-and-forget
    /// requests ask for an Acknowledge and settle when it arrives.
    pub fn request(&self, body: impl Into<MessageBody>) -> Result<PendingResponse, SessionError> {
        let body = body.into();
        let kind = body.kind();
        let route = self.route(&body)?;
        let (response_kind, expected) = match route.entry {
            Some(entry) => {
                if entry.is_protocol_agnostic() || body.is_push() || self.catalog().is_response(kind) {
                    return Err(SessionError::NotARequest(kind));
                }
                (ResponseKind::from_arity(entry.arity), entry.responses)
            }
            // Answered by parts of the same protocol, single or multi-part.
            None => (ResponseKind::MultiPart, RAW_RESPONSES),
        };
        let flags = match response_kind {
            ResponseKind::Notification => return Err(SessionError::SubscriptionRequest),
            ResponseKind::FireAndForget => MessageFlags::ACKNOWLEDGE,
            ResponseKind::Single | ResponseKind::MultiPart => MessageFlags::NONE,
        };
        self.check_sendable(route.protocol)?;

        let tracker = &self.inner.tracker;
        let header = MessageHeader::new(route.protocol, route.message_type, 0, flags);
        let mut receiver = None;
        let id = self.emit(header, body, false, |header| {
            receiver = Some(tracker.register(header.message_id, kind, response_kind, expected)?);
            Ok(())
        })?;
        let receiver = receiver.ok_or(SessionError::Closed)?;
        Ok(PendingResponse::new(
            id,
            receiver,
            tracker.clone(),
            self.inner.config.request_timeout(),
        ))
    }

    /// Sends the single response to `request`.
    pub fn respond(
        &self,
        request: &MessageHeader,
        body: impl Into<MessageBody>,
    ) -> Result<MessageId, SessionError> {
        let body = body.into();
        let route = self.route(&body)?;
        self.check_sendable(route.protocol)?;
        let header = MessageHeader::new(
            route.protocol,
            route.message_type,
            request.message_id,
            MessageFlags::FINAL_PART,
        );
        self.emit(header, body, false, |_| Ok(()))
    }

    /// Streams `parts` as a multi-part response; the last carries FinalPart.
    /// No parts at all is answered with Acknowledge + NoData.
    pub fn respond_multipart(
        &self,
        request: &MessageHeader,
        parts: Vec<MessageBody>,
    ) -> Result<usize, SessionError> {
        if parts.is_empty() {
            self.check_sendable(request.protocol)?;
            let header = MessageHeader::new(
                request.protocol,
                ACKNOWLEDGE,
                request.message_id,
                MessageFlags::NO_DATA | MessageFlags::FINAL_PART,
            );
            self.emit(header, Acknowledge::default().into(), false, |_| Ok(()))?;
            return Ok(0);
        }

        let count = parts.len();
        for (index, body) in parts.into_iter().enumerate() {
            let route = self.route(&body)?;
            self.check_sendable(route.protocol)?;
            let mut flags = MessageFlags::MULTI_PART;
            if index + 1 == count {
                flags |= MessageFlags::FINAL_PART;
            }
            let header = MessageHeader::new(route.protocol, route.message_type, request.message_id, flags);
            self.emit(header, body, false, |_| Ok(()))?;
        }
        Ok(count)
    }

    /// Answers `request` with a ProtocolException.
    pub fn send_exception(&self, request: &MessageHeader, fault: &ProtocolFault) -> Result<MessageId, SessionError> {
        let protocol = self.reply_protocol(request.protocol);
        let header = MessageHeader::new(
            protocol,
            PROTOCOL_EXCEPTION,
            request.message_id,
            MessageFlags::FINAL_PART,
        );
        let id = self.emit(header, fault.to_exception().into(), false, |_| Ok(()))?;
        metrics::record_exception(Direction::Sent, fault.code.code());
        Ok(id)
    }

    pub fn acknowledge(&self, request: &MessageHeader) -> Result<MessageId, SessionError> {
        let protocol = self.reply_protocol(request.protocol);
        let header = MessageHeader::new(protocol, ACKNOWLEDGE, request.message_id, MessageFlags::NONE);
        self.emit(header, Acknowledge::default().into(), false, |_| Ok(()))
    }

    /// Exceptions and acknowledgements travel on the request's protocol when
    /// the counterpart can read it there, otherwise on Core.
    fn reply_protocol(&self, protocol: Protocol) -> Protocol {
        let negotiated = self.state().is_some_and(|state| state.supports(protocol));
        if self.catalog().knows_protocol(protocol) || negotiated {
            protocol
        } else {
            Protocol::CORE
        }
    }

    /// Reports a fault for an inbound message. Exceptions are never answered
    /// with exceptions.
    fn reply_fault(&self, request: Option<&MessageHeader>, fault: &ProtocolFault) {
        if request.is_some_and(|h| h.message_type == PROTOCOL_EXCEPTION) {
            tracing::debug!(session = %self.id(), fault = %fault, "not answering an exception with an exception");
            return;
        }
        let fallback = MessageHeader::new(Protocol::CORE, 0, 0, MessageFlags::NONE);
        let request = request.unwrap_or(&fallback);
        tracing::debug!(
            session = %self.id(),
            protocol = %request.protocol,
            message_id = request.message_id,
            fault = %fault,
            "rejecting message"
        );
        if let Err(e) = self.send_exception(request, fault) {
            tracing::debug!(session = %self.id(), error = %e, "could not send protocol exception");
        }
    }

    /// Registers a subscription and sends its NotificationRequest. Pushes for
    /// the request's uuid arrive on the returned handle.
    pub fn subscribe(&self, request: NotificationRequest) -> Result<SubscriptionHandle, SessionError> {
        let key = request.request.uuid.clone();
        let entry = self.entry(MessageKind::NotificationRequest)?;
        self.check_sendable(entry.protocol)?;

        let subscriptions = &self.inner.subscriptions;
        let header = MessageHeader::new(entry.protocol, entry.message_type, 0, MessageFlags::NONE);
        let record = MessageBody::from(request.clone());
        let mut events = None;
        self.emit(header, request.into(), false, |header| {
            events = Some(subscriptions.register_with_events(key.clone(), header.clone(), record)?);
            Ok(())
        })?;
        let events = events.ok_or(SessionError::Closed)?;
        Ok(SubscriptionHandle::new(key, events, self.clone()))
    }

    /// Drops a customer-side subscription and tells the store to stop.
    pub fn cancel_subscription(&self, key: &str) -> Result<(), SessionError> {
        self.inner.subscriptions.unregister(key)?;
        if self.is_open() {
            self.send(CancelNotification {
                request_uuid: key.to_string(),
            })?;
        }
        Ok(())
    }

    /// Store side: pushes a change or delete notification for a registered
    /// subscription. Pushes travel uncorrelated; the key identifies them.
    pub fn push_notification(&self, body: impl Into<MessageBody>) -> Result<MessageId, SessionError> {
        let body = body.into();
        if !body.is_push() {
            return Err(SessionError::NotAPush(body.kind()));
        }
        let key = body.subscription_key().unwrap_or_default();
        if self.inner.subscriptions.lookup(key).is_none() {
            return Err(crate::subscription::SubscriptionError::Unknown(key.to_string()).into());
        }
        self.send(body)
    }

    /// ETP 1.2 round trip; returns the measured latency.
    pub async fn ping(&self) -> Result<Duration, SessionError> {
        let started = Instant::now();
        self.request(Ping {
            current_date_time: current_date_time(),
        })?
        .wait()
        .await?;
        Ok(started.elapsed())
    }

    /// Presents a new token: RenewSecurityToken on 1.1, Authorize on 1.2.
    pub async fn renew_security_token(&self, token: impl Into<String>) -> Result<(), SessionError> {
        let token = token.into();
        match self.version() {
            EtpVersion::V11 => {
                self.send(RenewSecurityToken { token: token.clone() })?;
            }
            EtpVersion::V12 => {
                let response = self
                    .request(Authorize {
                        authorization: token.clone(),
                        supplemental_authorization: Default::default(),
                    })?
                    .wait()
                    .await?;
                if let Some(MessageBody::AuthorizeResponse(answer)) =
                    response.into_single().map(EtpMessage::into_body)
                {
                    if !answer.success {
                        return Err(SessionError::AuthorizationRejected(answer.challenges));
                    }
                }
            }
        }
        self.update_authorization(token);
        Ok(())
    }

    /// Swaps in a copy of the session state carrying the new token.
    pub fn update_authorization(&self, token: impl Into<String>) {
        let token = token.into();
        self.inner.state.rcu(|current| {
            current.as_ref().map(|state| {
                let mut next = SessionState::clone(state);
                next.authorization = Some(token.clone());
                Arc::new(next)
            })
        });
        tracing::debug!(session = %self.id(), "authorization updated");
    }

    // --- dispatch -------------------------------------------------------

    fn dispatch_frame(&self, frame: Frame) {
        if self.phase().is_terminal() {
            tracing::trace!(session = %self.id(), "frame dropped after close");
            return;
        }
        let message = match self.inner.outbound.codec().decode(&frame) {
            Ok(message) => message,
            Err(failure) => {
                tracing::warn!(
                    session = %self.id(),
                    error = %failure,
                    message_id = failure.header.as_ref().map(|h| h.message_id),
                    "undecodable message"
                );
                self.reply_fault(failure.header.as_ref(), &failure.fault());
                return;
            }
        };
        self.dispatch(message);
    }

    fn dispatch(&self, message: EtpMessage) {
        let header = message.header().clone();
        let kind = message.kind();
        metrics::record_message(Direction::Received, self.version(), header.protocol, kind);
        tracing::trace!(
            session = %self.id(),
            kind = %kind,
            message_id = header.message_id,
            correlation_id = header.correlation_id,
            flags = %header.message_flags,
            "received"
        );

        if header.message_flags.is_compressed() {
            self.reply_fault(
                Some(&header),
                &ProtocolFault::new(ErrorCode::CompressionNotSupported, "compressed bodies are not supported"),
            );
            return;
        }
        if let MessageBody::ProtocolException(exception) = message.body() {
            metrics::record_exception(Direction::Received, exception.error_code);
        }
        if header.protocol == Protocol::CORE {
            self.dispatch_core(message);
            return;
        }
        if self.phase() != SessionPhase::Open {
            self.reply_fault(Some(&header), &ProtocolFault::invalid_state("session is not open"));
            return;
        }

        let mut message = message;
        if header.is_correlated() {
            message = match self.inner.tracker.on_message(message) {
                Correlation::Consumed => return,
                Correlation::Unmatched(message) => message,
            };
            if let MessageBody::ProtocolException(exception) = message.body() {
                if !self.inner.subscriptions.reject(header.correlation_id, exception.clone()) {
                    tracing::warn!(
                        session = %self.id(),
                        correlation_id = header.correlation_id,
                        code = exception.error_code,
                        message = %exception.error_message,
                        "exception for unknown request"
                    );
                }
                return;
            }
            if kind == MessageKind::Acknowledge || self.catalog().is_response(kind) {
                tracing::debug!(
                    session = %self.id(),
                    kind = %kind,
                    correlation_id = header.correlation_id,
                    "late or unknown response dropped"
                );
                return;
            }
        } else if let MessageBody::ProtocolException(exception) = message.body() {
            tracing::warn!(
                session = %self.id(),
                code = exception.error_code,
                message = %exception.error_message,
                "uncorrelated protocol exception"
            );
            return;
        } else if kind == MessageKind::Acknowledge {
            tracing::debug!(session = %self.id(), "uncorrelated acknowledge dropped");
            return;
        }

        if message.body().is_push() {
            message = match self.inner.subscriptions.deliver(message) {
                Ok(()) => return,
                Err(message) => message,
            };
        }
        self.dispatch_to_handler(message);
    }

    fn dispatch_core(&self, message: EtpMessage) {
        let header = message.header().clone();
        let kind = message.kind();
        if let Err(fault) = self.inner.core.handle_message(self, &message) {
            self.reply_fault(Some(&header), &fault);
            return;
        }
        if header.is_correlated() && self.inner.tracker.is_pending(header.correlation_id) {
            if let Correlation::Unmatched(_) = self.inner.tracker.on_message(message) {
                tracing::debug!(session = %self.id(), kind = %kind, "core response settled concurrently");
            }
            return;
        }
        self.auto_acknowledge(&header, kind);
    }

    fn dispatch_to_handler(&self, message: EtpMessage) {
        let header = message.header().clone();
        let kind = message.kind();
        let role = self.state().and_then(|state| state.local_role(header.protocol));
        let handler = role.and_then(|role| self.inner.registry.load().resolve(header.protocol, role).ok());
        let Some(handler) = handler else {
            self.reply_fault(
                Some(&header),
                &ProtocolFault::new(
                    ErrorCode::UnsupportedProtocol,
                    format!("protocol {} is not supported by this session", header.protocol),
                ),
            );
            return;
        };

        match handler.handle_message(self, &message) {
            Ok(()) => self.auto_acknowledge(&header, kind),
            Err(fault) => self.reply_fault(Some(&header), &fault),
        }
    }

    fn auto_acknowledge(&self, header: &MessageHeader, kind: MessageKind) {
        if !header.message_flags.wants_acknowledge()
            || matches!(kind, MessageKind::Acknowledge | MessageKind::ProtocolException)
        {
            return;
        }
        // Raw requests have no known response, so the flag alone decides.
        let fire_and_forget = kind == MessageKind::Raw
            || self
                .catalog()
                .entry(kind)
                .is_some_and(|entry| entry.arity == ResponseArity::None);
        if !fire_and_forget {
            return;
        }
        if let Err(e) = self.acknowledge(header) {
            tracing::debug!(session = %self.id(), error = %e, "could not acknowledge");
        }
    }

    // --- close ----------------------------------------------------------

    /// Closes the session, sending CloseSession first when it is open.
    pub async fn close(&self, reason: impl Into<String>) {
        let notify = self.is_open();
        self.shutdown(reason.into(), notify).await;
    }

    /// Starts a close from inside a handler or background task without
    /// waiting for it.
    pub fn request_close(&self, reason: impl Into<String>, notify: bool) {
        let session = self.clone();
        let reason = reason.into();
        tokio::spawn(async move { session.shutdown(reason, notify).await });
    }

    /// Resolves once the session is fully closed. Returns at once for a
    /// session that was never attached.
    pub async fn closed(&self) {
        if !self.inner.started.load(Ordering::Acquire) {
            return;
        }
        let mut closed = self.inner.closed_tx.subscribe();
        let _ = closed.wait_for(|closed| *closed).await;
    }

    pub(crate) async fn shutdown(&self, reason: String, notify: bool) {
        let previous = match self.inner.phase.begin_close() {
            Ok(previous) => previous,
            Err(SessionPhase::Closing) => {
                self.closed().await;
                return;
            }
            Err(_) => return,
        };

        self.inner.stop.notify_one();
        self.inner.outbound.stop_accepting();
        if notify {
            let header = self.entry(MessageKind::CloseSession).map(|entry| {
                MessageHeader::new(entry.protocol, entry.message_type, 0, MessageFlags::NONE)
            });
            let sent = header.and_then(|header| {
                self.emit(header, CloseSession { reason: reason.clone() }.into(), true, |_| Ok(()))
            });
            if let Err(e) = sent {
                tracing::debug!(session = %self.id(), error = %e, "could not send CloseSession");
            }
        }

        let cancelled = self.inner.tracker.cancel_all(CancelReason::ConnectionClosed);
        let subscriptions = self.inner.subscriptions.clear();
        let keepalive = self.inner.keepalive.lock().take();
        if let Some(keepalive) = keepalive {
            keepalive.abort();
            let _ = keepalive.await;
        }
        for handler in self.inner.registry.load().handlers() {
            handler.on_session_closed();
        }
        self.inner.core.on_session_closed();
        self.inner.outbound.detach();

        self.inner.phase.mark_closed();
        self.inner.closed_tx.send_replace(true);
        metrics::session_closed();
        tracing::info!(
            session = %self.id(),
            peer = %self.peer(),
            from = %previous,
            reason = %reason,
            cancelled_requests = cancelled,
            cleared_subscriptions = subscriptions,
            "session closed"
        );
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("role", &self.inner.role)
            .field("version", &self.version())
            .field("phase", &self.phase())
            .finish()
    }
}
