//! Session lifecycle phase.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    Closed = 0,
    Opening = 1,
    Open = 2,
    Closing = 3,
}

impl SessionPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionPhase::Opening,
            2 => SessionPhase::Open,
            3 => SessionPhase::Closing,
            _ => SessionPhase::Closed,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Closed => "closed",
            SessionPhase::Opening => "opening",
            SessionPhase::Open => "open",
            SessionPhase::Closing => "closing",
        }
    }

    /// Closing or Closed.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Closing | SessionPhase::Closed)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free phase cell. Transitions only move forward:
/// `Closed -> Opening -> Open -> Closing -> Closed`.
#[derive(Debug)]
pub(crate) struct PhaseCell(AtomicU8);

impl PhaseCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(SessionPhase::Closed as u8))
    }

    pub(crate) fn get(&self) -> SessionPhase {
        SessionPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    fn transition(&self, from: &[SessionPhase], to: SessionPhase) -> Result<SessionPhase, SessionPhase> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                from.contains(&SessionPhase::from_u8(current)).then_some(to as u8)
            })
            .map(SessionPhase::from_u8)
            .map_err(SessionPhase::from_u8)
    }

    /// Closed -> Opening. Only a fresh session can be attached.
    pub(crate) fn begin_opening(&self) -> Result<(), SessionPhase> {
        self.transition(&[SessionPhase::Closed], SessionPhase::Opening).map(|_| ())
    }

    /// Opening -> Open.
    pub(crate) fn mark_open(&self) -> Result<(), SessionPhase> {
        self.transition(&[SessionPhase::Opening], SessionPhase::Open).map(|_| ())
    }

    /// Opening | Open -> Closing; returns the phase the session left.
    pub(crate) fn begin_close(&self) -> Result<SessionPhase, SessionPhase> {
        self.transition(&[SessionPhase::Opening, SessionPhase::Open], SessionPhase::Closing)
    }

    pub(crate) fn mark_closed(&self) {
        self.0.store(SessionPhase::Closed as u8, Ordering::Release);
    }
}
