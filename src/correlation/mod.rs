//! Request/response correlation.
//!
//! # Data Flow
//! ```text
//! Session::request()
//!     → outbound lock: assign messageId → tracker.register() → transport
//!     → PendingResponse returned to the caller
//!
//! inbound message with correlationId != 0
//!     → tracker.on_message()
//!         ProtocolException          → Err(Exception), entry removed
//!         Acknowledge + NoData       → Ok(empty), entry removed
//!         Single                     → Ok([message]), entry removed
//!         MultiPart                  → reassembly.rs until FinalPart
//!     → oneshot → PendingResponse::wait()
//!
//! Session close → tracker.cancel_all(ConnectionClosed)
//! ```
//!
//! # Design Decisions
//! - One oneshot per request: exactly one terminal outcome, success or error
//! - Delivery happens after the table lock is released
//! - Unknown correlation ids are handed back to the session to log and drop

pub mod pending;
pub mod reassembly;
pub mod tracker;

pub use pending::PendingResponse;
pub use reassembly::{Reassembly, ReassemblyError, ReassemblyState, ReassemblyStep};
pub use tracker::{
    CancelReason, Correlation, CorrelationTracker, RequestError, RequestOutcome, ResponseKind,
    ResponseSet, TrackerError,
};
