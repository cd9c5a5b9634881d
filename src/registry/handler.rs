//! The protocol handler trait.

use std::any::Any;

use crate::capabilities::CapabilitySet;
use crate::error::ProtocolFault;
use crate::messages::{EtpMessage, Protocol, Role};
use crate::session::Session;

/// One side of one ETP protocol.
///
/// Handlers run on the session's dispatch task, one message at a time, so
/// `handle_message` must not block. Work that waits on the counterpart
/// (requests, long feeds) belongs in a spawned task.
pub trait ProtocolHandler: Any + Send + Sync {
    fn protocol(&self) -> Protocol;

    /// The role this endpoint plays for the protocol.
    fn role(&self) -> Role;

    fn counterpart_role(&self) -> Role {
        self.role().counterpart()
    }

    /// Capabilities offered for this protocol during negotiation.
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new()
    }

    /// Handle a message that is neither a tracked response nor a consumed
    /// subscription push. Returning a fault sends a `ProtocolException`
    /// correlated to the message.
    fn handle_message(&self, session: &Session, message: &EtpMessage) -> Result<(), ProtocolFault>;

    fn on_session_opened(&self, _session: &Session) {}

    fn on_session_closed(&self) {}
}
