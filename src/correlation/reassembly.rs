//! Multi-part response reassembly.
//!
//! ```text
//! Empty ──part──▶ Accumulating ──FinalPart──▶ Complete
//!   │                  │
//!   └──NoData──────────┴──────NoData─────────▶ Complete
//! ```
//!
//! Part counts are not validated: whatever arrived before the terminal
//! flag is the result, in arrival order.

use std::mem;

use thiserror::Error;

use crate::messages::EtpMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblyState {
    Empty,
    Accumulating,
    Complete,
}

#[derive(Debug, PartialEq)]
pub enum ReassemblyStep {
    Pending,
    Complete(Vec<EtpMessage>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReassemblyError {
    #[error("part received after the response completed")]
    AlreadyComplete,
}

#[derive(Debug)]
pub struct Reassembly {
    state: ReassemblyState,
    parts: Vec<EtpMessage>,
}

impl Default for Reassembly {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembly {
    pub fn new() -> Self {
        Self {
            state: ReassemblyState::Empty,
            parts: Vec::new(),
        }
    }

    pub fn state(&self) -> ReassemblyState {
        self.state
    }

    /// Parts accumulated so far.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn push(&mut self, part: EtpMessage) -> Result<ReassemblyStep, ReassemblyError> {
        if self.state == ReassemblyState::Complete {
            return Err(ReassemblyError::AlreadyComplete);
        }

        let flags = part.header().message_flags;
        if flags.has_no_data() {
            // The NoData carrier (usually an Acknowledge) is not a result element.
            self.state = ReassemblyState::Complete;
            return Ok(ReassemblyStep::Complete(mem::take(&mut self.parts)));
        }

        self.parts.push(part);
        if flags.is_final_part() {
            self.state = ReassemblyState::Complete;
            Ok(ReassemblyStep::Complete(mem::take(&mut self.parts)))
        } else {
            self.state = ReassemblyState::Accumulating;
            Ok(ReassemblyStep::Pending)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{MessageFlags, MessageHeader};
    use crate::messages::{Acknowledge, GetResourcesResponse, Protocol};

    fn part(id: i64, flags: MessageFlags) -> EtpMessage {
        let header = MessageHeader::new(Protocol::DISCOVERY, 2, 1, flags).with_message_id(id);
        EtpMessage::new(header, GetResourcesResponse { resources: Vec::new() })
    }

    #[test]
    fn accumulates_until_final_part() {
        let mut reassembly = Reassembly::new();
        assert_eq!(reassembly.state(), ReassemblyState::Empty);

        assert_eq!(reassembly.push(part(2, MessageFlags::MULTI_PART)).unwrap(), ReassemblyStep::Pending);
        assert_eq!(reassembly.push(part(3, MessageFlags::MULTI_PART)).unwrap(), ReassemblyStep::Pending);
        assert_eq!(reassembly.state(), ReassemblyState::Accumulating);
        assert_eq!(reassembly.len(), 2);

        let ReassemblyStep::Complete(parts) = reassembly
            .push(part(4, MessageFlags::MULTI_PART | MessageFlags::FINAL_PART))
            .unwrap()
        else {
            panic!("expected completion");
        };
        let ids: Vec<_> = parts.iter().map(|p| p.header().message_id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
        assert_eq!(reassembly.state(), ReassemblyState::Complete);
    }

    #[test]
    fn no_data_completes_empty() {
        let mut reassembly = Reassembly::new();
        let header = MessageHeader::new(
            Protocol::DISCOVERY,
            1001,
            1,
            MessageFlags::NO_DATA | MessageFlags::FINAL_PART,
        );
        let step = reassembly.push(EtpMessage::new(header, Acknowledge {})).unwrap();
        assert_eq!(step, ReassemblyStep::Complete(Vec::new()));
    }

    #[test]
    fn parts_after_completion_are_rejected() {
        let mut reassembly = Reassembly::new();
        reassembly.push(part(2, MessageFlags::FINAL_PART)).unwrap();
        assert_eq!(
            reassembly.push(part(3, MessageFlags::MULTI_PART)),
            Err(ReassemblyError::AlreadyComplete)
        );
    }
}
