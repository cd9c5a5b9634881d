//! Static (protocol, messageType) ↔ message kind tables.

use crate::messages::{MessageKind, Protocol};

/// `ProtocolException` message type in every protocol.
pub const PROTOCOL_EXCEPTION: u32 = 1000;
/// `Acknowledge` message type in every protocol.
pub const ACKNOWLEDGE: u32 = 1001;

/// How many responses a message expects when sent as a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseArity {
    /// Responses, pushes and fire-and-forget requests.
    None,
    Single,
    MultiPart,
    /// Long-lived; outcomes flow through the subscription registry.
    Subscription,
}

#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    pub protocol: Protocol,
    pub message_type: u32,
    pub kind: MessageKind,
    /// Name used by the version's own schema.
    pub wire_name: &'static str,
    pub arity: ResponseArity,
    pub responses: &'static [MessageKind],
}

impl CatalogEntry {
    pub const fn new(
        protocol: Protocol,
        message_type: u32,
        kind: MessageKind,
        wire_name: &'static str,
        arity: ResponseArity,
        responses: &'static [MessageKind],
    ) -> Self {
        Self {
            protocol,
            message_type,
            kind,
            wire_name,
            arity,
            responses,
        }
    }

    /// Exceptions and acknowledgements may travel on any known protocol.
    pub fn is_protocol_agnostic(&self) -> bool {
        matches!(self.kind, MessageKind::ProtocolException | MessageKind::Acknowledge)
    }
}

#[derive(Debug)]
pub struct MessageCatalog {
    pub protocols: &'static [Protocol],
    pub entries: &'static [CatalogEntry],
}

impl MessageCatalog {
    pub fn knows_protocol(&self, protocol: Protocol) -> bool {
        self.protocols.contains(&protocol)
    }

    pub fn lookup(&self, protocol: Protocol, message_type: u32) -> Option<MessageKind> {
        if !self.knows_protocol(protocol) {
            return None;
        }
        match message_type {
            PROTOCOL_EXCEPTION => Some(MessageKind::ProtocolException),
            ACKNOWLEDGE => Some(MessageKind::Acknowledge),
            _ => self
                .entries
                .iter()
                .find(|e| e.protocol == protocol && e.message_type == message_type)
                .map(|e| e.kind),
        }
    }

    pub fn entry(&self, kind: MessageKind) -> Option<&'static CatalogEntry> {
        self.entries.iter().find(|e| e.kind == kind)
    }

    pub fn is_valid(&self, protocol: Protocol, message_type: u32) -> bool {
        self.lookup(protocol, message_type).is_some()
    }

    /// True when some request in this catalog is answered by `kind`.
    pub fn is_response(&self, kind: MessageKind) -> bool {
        self.entries.iter().any(|e| e.responses.contains(&kind))
    }
}
