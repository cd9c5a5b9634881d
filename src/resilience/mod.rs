//! Retry helpers for outbound connections.

pub mod backoff;

pub use backoff::calculate_backoff;
