//! Core protocol (0) handler, one per session side and ETP version.

use crate::codec::MessageHeader;
use crate::error::{ErrorCode, ProtocolFault};
use crate::messages::{current_date_time, AuthorizeResponse, EtpMessage, MessageBody, Pong, Protocol, Role};
use crate::registry::ProtocolHandler;
use crate::session::Session;
use crate::version::EtpVersion;

/// Challenge returned when an Authorize carries no usable token.
pub const BEARER_CHALLENGE: &str = "Bearer";

#[derive(Debug, Clone, Copy)]
pub struct CoreHandler {
    version: EtpVersion,
    role: Role,
}

impl CoreHandler {
    pub fn new(version: EtpVersion, role: Role) -> Self {
        Self { version, role }
    }

    pub fn version(&self) -> EtpVersion {
        self.version
    }

    fn authorize(&self, session: &Session, header: &MessageHeader, token: &str) -> Result<(), ProtocolFault> {
        let success = !token.trim().is_empty();
        if success {
            session.update_authorization(token);
        }
        let challenges = if success {
            Vec::new()
        } else {
            vec![BEARER_CHALLENGE.to_string()]
        };
        session.respond(header, AuthorizeResponse { success, challenges })?;
        Ok(())
    }
}

impl ProtocolHandler for CoreHandler {
    fn protocol(&self) -> Protocol {
        Protocol::CORE
    }

    fn role(&self) -> Role {
        self.role
    }

    fn handle_message(&self, session: &Session, message: &EtpMessage) -> Result<(), ProtocolFault> {
        let header = message.header();
        let kind = message.kind();
        if !session.is_open() && !Session::is_handshake_kind(kind) {
            return Err(ProtocolFault::invalid_state(format!(
                "{kind} received while the session is {}",
                session.phase()
            )));
        }

        match message.body() {
            MessageBody::RequestSession(request) => session.accept_session(header, request),
            MessageBody::OpenSession(open) => session.complete_open(header, open),
            MessageBody::CloseSession(close) => {
                tracing::info!(session = %session.id(), reason = %close.reason, "counterpart closed the session");
                session.request_close(close.reason.clone(), false);
                Ok(())
            }
            MessageBody::RenewSecurityToken(renew) => {
                session.update_authorization(renew.token.clone());
                Ok(())
            }
            MessageBody::Authorize(authorize) => self.authorize(session, header, &authorize.authorization),
            MessageBody::Ping(_) => {
                session.respond(
                    header,
                    Pong {
                        current_date_time: current_date_time(),
                    },
                )?;
                Ok(())
            }
            MessageBody::ProtocolException(exception) => {
                if !header.is_correlated() {
                    tracing::warn!(
                        session = %session.id(),
                        code = exception.error_code,
                        message = %exception.error_message,
                        "uncorrelated protocol exception"
                    );
                }
                Ok(())
            }
            MessageBody::Pong(_) | MessageBody::AuthorizeResponse(_) | MessageBody::Acknowledge(_) => {
                Ok(())
            }
            _ => Err(ProtocolFault::new(
                ErrorCode::InvalidMessageType,
                format!("{kind} is not a Core protocol message"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plays_the_requested_side() {
        let handler = CoreHandler::new(EtpVersion::V11, Role::Server);
        assert_eq!(handler.protocol(), Protocol::CORE);
        assert_eq!(handler.role(), Role::Server);
        assert_eq!(handler.counterpart_role(), Role::Client);
        assert_eq!(handler.version(), EtpVersion::V11);
    }
}
