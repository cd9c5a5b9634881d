//! Session-open handshake on both sides.

use std::sync::Arc;

use crate::auth::Credentials;
use crate::capabilities::{negotiate_client, negotiate_server, ServerNegotiation};
use crate::codec::MessageHeader;
use crate::correlation::RequestError;
use crate::error::ProtocolFault;
use crate::messages::{
    current_date_time, MessageKind, OpenSession, Protocol, RequestSession, Role, SupportedProtocol,
};
use crate::observability::metrics;
use crate::session::{keepalive, Session, SessionError, SessionPhase};
use crate::version::EtpVersion;

impl Session {
    /// Client side: sends RequestSession and waits for the negotiated
    /// OpenSession. On any failure the session is closed before returning.
    pub async fn open(&self) -> Result<(), SessionError> {
        if self.role() != Role::Client {
            return Err(SessionError::WrongRole(self.role()));
        }
        if self.phase() != SessionPhase::Opening {
            return Err(SessionError::NotOpen(self.phase()));
        }

        let request = self.build_request_session();
        *self.inner.requested.lock() = request.requested_protocols.clone();
        let pending = self.request(request)?;

        match pending.wait_timeout(self.config().open_timeout()).await {
            Ok(_) if self.is_open() => Ok(()),
            Ok(_) => Err(SessionError::NotOpen(self.phase())),
            Err(RequestError::Exception(exception)) => {
                self.shutdown(exception.error_message.clone(), false).await;
                Err(SessionError::Negotiation(
                    crate::capabilities::NegotiationError::Rejected {
                        code: exception.error_code,
                        message: exception.error_message,
                    },
                ))
            }
            Err(RequestError::Negotiation(e)) => {
                // complete_open already asked for a close with CloseSession.
                self.closed().await;
                Err(SessionError::Negotiation(e))
            }
            Err(RequestError::TimedOut(_)) => {
                self.shutdown("open timed out".to_string(), true).await;
                Err(SessionError::OpenTimeout)
            }
            Err(e) => {
                self.shutdown(e.to_string(), false).await;
                Err(SessionError::Request(e))
            }
        }
    }

    /// RequestSession built from the registered handlers: each handler asks
    /// the server to play its counterpart role.
    pub fn build_request_session(&self) -> RequestSession {
        let version = self.version();
        let endpoint = self.endpoint();
        let requested_protocols = self
            .registry()
            .handlers()
            .filter(|handler| handler.protocol() != Protocol::CORE)
            .map(|handler| SupportedProtocol {
                protocol: handler.protocol(),
                protocol_version: version.protocol_version(),
                role: handler.counterpart_role(),
                protocol_capabilities: handler.capabilities(),
            })
            .collect();

        RequestSession {
            application_name: endpoint.application_name.clone(),
            application_version: endpoint.application_version.clone(),
            client_instance_id: endpoint.instance_id,
            requested_protocols,
            supported_data_objects: endpoint.supported_data_objects.clone(),
            supported_compression: endpoint.supported_compression.clone(),
            supported_formats: endpoint.supported_formats.clone(),
            endpoint_capabilities: endpoint.capabilities.clone(),
            current_date_time: current_date_time(),
        }
    }

    /// Server side: negotiates and answers a RequestSession. A failed
    /// negotiation is reported with a correlated exception and the session
    /// closes without CloseSession.
    pub(crate) fn accept_session(
        &self,
        header: &MessageHeader,
        request: &RequestSession,
    ) -> Result<(), ProtocolFault> {
        if self.role() != Role::Server || self.phase() != SessionPhase::Opening {
            return Err(ProtocolFault::invalid_state(format!(
                "RequestSession is not valid for a {} session that is {}",
                self.role(),
                self.phase()
            )));
        }

        let offered = self.registry().offered();
        match negotiate_server(self.endpoint(), &offered, request, self.version()) {
            Ok(ServerNegotiation { open_session, mut state }) => {
                state.authorization = self.bearer_token();
                self.inner.state.store(Some(Arc::new(state)));
                self.respond(header, open_session)?;
                self.on_opened();
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    session = %self.id(),
                    application = %request.application_name,
                    error = %e,
                    "session negotiation failed"
                );
                self.send_exception(header, &ProtocolFault::new(e.error_code(), e.to_string()))?;
                self.request_close(e.to_string(), false);
                Ok(())
            }
        }
    }

    /// Client side: validates the server's OpenSession before the `open()`
    /// waiter wakes, so traffic after OpenSession sees an open session.
    pub(crate) fn complete_open(
        &self,
        header: &MessageHeader,
        open: &OpenSession,
    ) -> Result<(), ProtocolFault> {
        if self.role() != Role::Client || self.phase() != SessionPhase::Opening {
            return Err(ProtocolFault::invalid_state(format!(
                "OpenSession is not valid for a {} session that is {}",
                self.role(),
                self.phase()
            )));
        }
        if !self.inner.tracker.is_pending(header.correlation_id) {
            return Err(ProtocolFault::invalid_state(
                "OpenSession does not answer a pending RequestSession",
            ));
        }

        let requested = self.inner.requested.lock().clone();
        match negotiate_client(self.endpoint(), &requested, open, self.version()) {
            Ok(mut state) => {
                state.authorization = self.bearer_token();
                self.inner.state.store(Some(Arc::new(state)));
                self.on_opened();
            }
            Err(e) => {
                tracing::warn!(
                    session = %self.id(),
                    server = %open.application_name,
                    error = %e,
                    "rejecting server's OpenSession"
                );
                self.inner
                    .tracker
                    .fail(header.correlation_id, RequestError::Negotiation(e.clone()));
                self.request_close(e.to_string(), true);
            }
        }
        Ok(())
    }

    fn bearer_token(&self) -> Option<String> {
        match self.credentials() {
            Some(Credentials::Bearer(token)) => Some(token),
            _ => None,
        }
    }

    fn on_opened(&self) {
        if let Err(phase) = self.inner.phase.mark_open() {
            tracing::debug!(session = %self.id(), phase = %phase, "open raced with close");
            return;
        }
        for handler in self.registry().handlers() {
            handler.on_session_opened(self);
        }
        self.inner.core.on_session_opened(self);

        if self.version() == EtpVersion::V12 {
            if let Some(interval) = self.config().keepalive_interval() {
                *self.inner.keepalive.lock() = Some(keepalive::spawn(self.clone(), interval));
            }
        }

        metrics::session_opened();
        let state = self.state();
        tracing::info!(
            session = %self.id(),
            peer = %self.peer(),
            role = %self.role(),
            version = %self.version(),
            counterpart = state.as_ref().map(|s| s.counterpart.name.as_str()).unwrap_or_default(),
            protocols = ?state.as_ref().map(|s| s.protocol_numbers()).unwrap_or_default(),
            "session open"
        );
    }

    /// True if `kind` may be received before the session is open.
    pub(crate) fn is_handshake_kind(kind: MessageKind) -> bool {
        matches!(
            kind,
            MessageKind::RequestSession
                | MessageKind::OpenSession
                | MessageKind::CloseSession
                | MessageKind::ProtocolException
                | MessageKind::Acknowledge
        )
    }
}
