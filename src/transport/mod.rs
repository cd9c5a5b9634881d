//! Frame-level transports.
//!
//! # Data Flow
//! ```text
//! socket reader task ──TransportEvent──▶ inbound (mpsc)  ──▶ Session read loop
//! Session outbound   ──Frame──────────▶ outbound (mpsc) ──▶ socket writer task
//! ```
//!
//! # Design Decisions
//! - The session only sees channels; WebSocket, in-memory and test probes
//!   are interchangeable
//! - Dropping the outbound sender is how the session closes the socket
//! - Authentication happens before a handle exists

pub mod connection;
pub mod memory;
pub mod websocket;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::auth::Credentials;

/// Inbound buffering between a socket reader and the session.
pub const INBOUND_CAPACITY: usize = 256;

/// One WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Binary(Vec<u8>),
    Text(String),
}

impl Frame {
    pub fn len(&self) -> usize {
        match self {
            Frame::Binary(bytes) => bytes.len(),
            Frame::Text(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub enum TransportEvent {
    Frame(Frame),
    /// Orderly close, with the peer's reason if it gave one.
    Closed(Option<String>),
    Failed(TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("server selected sub-protocol {selected:?}, expected {expected}")]
    SubprotocolMismatch {
        expected: &'static str,
        selected: Option<String>,
    },
}

/// The session's side of a connection.
#[derive(Debug)]
pub struct TransportHandle {
    pub outbound: mpsc::UnboundedSender<Frame>,
    pub inbound: mpsc::Receiver<TransportEvent>,
    /// Human-readable peer description for logs.
    pub peer: String,
    pub credentials: Option<Credentials>,
}

impl TransportHandle {
    pub fn new(
        outbound: mpsc::UnboundedSender<Frame>,
        inbound: mpsc::Receiver<TransportEvent>,
        peer: impl Into<String>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            peer: peer.into(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }
}
