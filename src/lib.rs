//! ETP (Energistics Transfer Protocol) devkit.
//!
//! Session engine, message dispatch, correlation and subscription tracking
//! for ETP 1.1 and 1.2 over WebSocket, plus a server, a client and sample
//! Discovery/Store/StoreNotification handlers.

pub mod auth;
pub mod capabilities;
pub mod client;
pub mod codec;
pub mod config;
pub mod correlation;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod messages;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod server;
pub mod session;
pub mod subscription;
pub mod transport;
pub mod version;

pub use client::EtpClient;
pub use config::EtpConfig;
pub use error::{ErrorCode, ProtocolFault};
pub use lifecycle::Shutdown;
pub use server::EtpServer;
pub use session::{Session, SessionError, SessionOptions};
pub use version::EtpVersion;
