//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! etp.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EtpConfig (validated, immutable)
//!     → EtpServer holds it in an ArcSwap
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → new EtpConfig sent over a channel
//!     → server swaps it in for the next accepted session
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - A rejected reload keeps the running configuration

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AuthConfig, AuthMode, ClientConfig, EndpointConfig, EtpConfig, ListenerConfig,
    ObservabilityConfig, SessionConfig, TlsConfig,
};
pub use watcher::ConfigWatcher;
