//! Metrics collection and exposition.
//!
//! # Metrics
//! - `etp_messages_received_total` / `etp_messages_sent_total` (counter):
//!   by version, protocol, kind
//! - `etp_protocol_exceptions_total` (counter): by direction, code
//! - `etp_sessions_active` (gauge)
//! - `etp_sessions_opened_total` (counter)
//! - `etp_requests_pending` (gauge)
//! - `etp_request_duration_seconds` (histogram): by request kind, outcome
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

use crate::messages::{MessageKind, Protocol};
use crate::version::EtpVersion;

pub const MESSAGES_RECEIVED: &str = "etp_messages_received_total";
pub const MESSAGES_SENT: &str = "etp_messages_sent_total";
pub const PROTOCOL_EXCEPTIONS: &str = "etp_protocol_exceptions_total";
pub const SESSIONS_ACTIVE: &str = "etp_sessions_active";
pub const SESSIONS_OPENED: &str = "etp_sessions_opened_total";
pub const REQUESTS_PENDING: &str = "etp_requests_pending";
pub const REQUEST_DURATION: &str = "etp_request_duration_seconds";

/// Installs the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION.to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 30.0],
        )?
        .install()?;
    tracing::info!(address = %addr, "metrics endpoint listening");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Sent => "sent",
            Direction::Received => "received",
        }
    }
}

pub fn record_message(direction: Direction, version: EtpVersion, protocol: Protocol, kind: MessageKind) {
    let name = match direction {
        Direction::Sent => MESSAGES_SENT,
        Direction::Received => MESSAGES_RECEIVED,
    };
    counter!(
        name,
        "version" => version.as_str(),
        "protocol" => protocol.name(),
        "kind" => kind.name()
    )
    .increment(1);
}

pub fn record_exception(direction: Direction, code: i32) {
    counter!(PROTOCOL_EXCEPTIONS, "direction" => direction.as_str(), "code" => code.to_string())
        .increment(1);
}

pub fn session_attached() {
    gauge!(SESSIONS_ACTIVE).increment(1.0);
}

pub fn session_closed() {
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
}

pub fn session_opened() {
    counter!(SESSIONS_OPENED).increment(1);
}

pub fn set_pending_requests(count: usize) {
    gauge!(REQUESTS_PENDING).set(count as f64);
}

pub fn record_request(kind: &'static str, outcome: &'static str, elapsed: Duration) {
    histogram!(REQUEST_DURATION, "kind" => kind, "outcome" => outcome).record(elapsed.as_secs_f64());
}
