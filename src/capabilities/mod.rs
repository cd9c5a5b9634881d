//! Capabilities and session negotiation.
//!
//! # Data Flow
//! ```text
//! handlers (per-protocol CapabilitySet) + EndpointDescriptor (config)
//!     → RequestSession  ──▶  negotiate_server()  ──▶ OpenSession + SessionState
//!     → OpenSession     ──▶  negotiate_client()  ──▶ SessionState
//! ```
//!
//! # Design Decisions
//! - One enum-keyed map type for every capability set
//! - Numeric limits negotiate to the smaller value, flags to logical AND
//! - SessionState is immutable once built; token renewal swaps a new copy

pub mod negotiation;
pub mod state;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::messages::DataValue;

pub use negotiation::{
    negotiate_client, negotiate_server, EndpointDescriptor, NegotiationError, OfferedProtocol,
    ServerNegotiation,
};
pub use state::{ApplicationInfo, NegotiatedProtocol, SessionState};

/// Well-known capability names.
pub mod names {
    pub const MAX_RESPONSE_COUNT: &str = "MaxResponseCount";
    pub const MAX_WEBSOCKET_MESSAGE_PAYLOAD_SIZE: &str = "MaxWebSocketMessagePayloadSize";
    pub const SUPPORTS_ALTERNATE_REQUEST_URIS: &str = "SupportsAlternateRequestUris";
    pub const MAX_NOTIFICATION_SUBSCRIPTIONS: &str = "MaxSubscriptionSessionCount";
}

/// Named, typed capability values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeMap<String, DataValue>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<DataValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&DataValue> {
        self.0.get(name)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(DataValue::as_bool)
    }

    pub fn get_long(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(DataValue::as_long)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(DataValue::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DataValue)> {
        self.0.iter()
    }

    /// Combines local and counterpart values. Shared numeric keys take the
    /// smaller value and shared flags the logical AND; other keys are kept
    /// from whichever side declares them, local first.
    pub fn restrict(&self, counterpart: &CapabilitySet) -> CapabilitySet {
        let mut merged = counterpart.0.clone();
        for (name, local) in &self.0 {
            let value = match (local, counterpart.0.get(name)) {
                (DataValue::Boolean(a), Some(DataValue::Boolean(b))) => DataValue::Boolean(*a && *b),
                (a, Some(b)) => match (a.as_long(), b.as_long()) {
                    (Some(x), Some(y)) => DataValue::Long(x.min(y)),
                    _ => local.clone(),
                },
                (_, None) => local.clone(),
            };
            merged.insert(name.clone(), value);
        }
        CapabilitySet(merged)
    }
}

impl FromIterator<(String, DataValue)> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = (String, DataValue)>>(iter: T) -> Self {
        CapabilitySet(iter.into_iter().collect())
    }
}
