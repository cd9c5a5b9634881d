//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! session / tracker / server
//!     → tracing events with session and peer fields → logging.rs
//!     → metrics.rs helpers → metrics facade → Prometheus exporter
//! ```
//!
//! # Design Decisions
//! - JSON logs for production, pretty logs for development
//! - Metric names live in one place
//! - Metric calls are no-ops until `init_metrics` installs a recorder

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
