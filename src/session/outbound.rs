//! Serialized outbound path: id allocation, encoding and the transport write
//! happen under one lock.

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::codec::{MessageCodec, MessageHeader, MessageId};
use crate::messages::{EtpMessage, MessageBody};
use crate::session::SessionError;
use crate::transport::Frame;

struct OutboundState {
    next_id: MessageId,
    sink: Option<mpsc::UnboundedSender<Frame>>,
    accepting: bool,
}

pub(crate) struct Outbound {
    codec: MessageCodec,
    state: Mutex<OutboundState>,
}

impl Outbound {
    pub(crate) fn new(codec: MessageCodec) -> Self {
        Self {
            codec,
            state: Mutex::new(OutboundState {
                next_id: 1,
                sink: None,
                accepting: false,
            }),
        }
    }

    pub(crate) fn codec(&self) -> &MessageCodec {
        &self.codec
    }

    pub(crate) fn attach(&self, sink: mpsc::UnboundedSender<Frame>) {
        let mut state = self.state.lock();
        state.sink = Some(sink);
        state.accepting = true;
    }

    pub(crate) fn stop_accepting(&self) {
        self.state.lock().accepting = false;
    }

    /// Drops the sink, which closes the underlying socket.
    pub(crate) fn detach(&self) {
        let mut state = self.state.lock();
        state.accepting = false;
        state.sink = None;
    }

    /// Assigns the next message id, encodes, runs `prepare` and hands the
    /// frame to the transport. `prepare` registers whatever must exist before
    /// a response can arrive; if it fails nothing is written and the id is
    /// not consumed.
    ///
    /// `closing` lets the final CloseSession through after new sends were
    /// refused.
    pub(crate) fn push<F>(
        &self,
        header: MessageHeader,
        body: MessageBody,
        closing: bool,
        prepare: F,
    ) -> Result<EtpMessage, SessionError>
    where
        F: FnOnce(&MessageHeader) -> Result<(), SessionError>,
    {
        let mut state = self.state.lock();
        if !state.accepting && !closing {
            return Err(SessionError::Closed);
        }
        let id = state.next_id;
        let sink = match &state.sink {
            Some(sink) if !sink.is_closed() => sink.clone(),
            _ => return Err(SessionError::Closed),
        };

        let message = EtpMessage::new(header.with_message_id(id), body);
        let frame = self.codec.encode(&message)?;
        prepare(message.header())?;
        state.next_id += 1;

        sink.send(frame).map_err(|_| SessionError::Closed)?;
        Ok(message)
    }

    #[cfg(test)]
    pub(crate) fn next_id(&self) -> MessageId {
        self.state.lock().next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Encoding, MessageFlags};
    use crate::messages::{Ping, Protocol};
    use crate::version::{adapter_for, EtpVersion};

    fn outbound() -> (Outbound, mpsc::UnboundedReceiver<Frame>) {
        let adapter = adapter_for(EtpVersion::V12);
        let outbound = Outbound::new(MessageCodec::new(adapter.as_ref(), Encoding::Json));
        let (tx, rx) = mpsc::unbounded_channel();
        outbound.attach(tx);
        (outbound, rx)
    }

    fn ping_header() -> MessageHeader {
        MessageHeader::new(Protocol::CORE, 8, 0, MessageFlags::NONE)
    }

    fn ping() -> MessageBody {
        Ping { current_date_time: 1 }.into()
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let (outbound, mut rx) = outbound();
        let first = outbound.push(ping_header(), ping(), false, |_| Ok(())).unwrap();
        let second = outbound.push(ping_header(), ping(), false, |_| Ok(())).unwrap();

        assert_eq!(first.header().message_id, 1);
        assert_eq!(second.header().message_id, 2);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn failed_prepare_writes_nothing_and_keeps_the_id() {
        let (outbound, mut rx) = outbound();
        let err = outbound
            .push(ping_header(), ping(), false, |_| Err(SessionError::Closed))
            .unwrap_err();
        assert!(matches!(err, SessionError::Closed));
        assert!(rx.try_recv().is_err());
        assert_eq!(outbound.next_id(), 1);
    }

    #[test]
    fn closing_sends_pass_after_stop() {
        let (outbound, mut rx) = outbound();
        outbound.stop_accepting();
        assert!(outbound.push(ping_header(), ping(), false, |_| Ok(())).is_err());
        assert!(outbound.push(ping_header(), ping(), true, |_| Ok(())).is_ok());
        assert!(rx.try_recv().is_ok());

        outbound.detach();
        assert!(outbound.push(ping_header(), ping(), true, |_| Ok(())).is_err());
    }
}
