//! In-process transports.

use tokio::sync::mpsc;

use crate::transport::{Frame, TransportEvent, TransportHandle, INBOUND_CAPACITY};

/// Two handles wired back to back. Must be called inside a Tokio runtime.
pub fn pair() -> (TransportHandle, TransportHandle) {
    let (left_out, left_out_rx) = mpsc::unbounded_channel();
    let (right_out, right_out_rx) = mpsc::unbounded_channel();
    let (left_in_tx, left_in) = mpsc::channel(INBOUND_CAPACITY);
    let (right_in_tx, right_in) = mpsc::channel(INBOUND_CAPACITY);

    tokio::spawn(forward(left_out_rx, right_in_tx));
    tokio::spawn(forward(right_out_rx, left_in_tx));

    (
        TransportHandle::new(left_out, left_in, "memory:left"),
        TransportHandle::new(right_out, right_in, "memory:right"),
    )
}

async fn forward(mut from: mpsc::UnboundedReceiver<Frame>, to: mpsc::Sender<TransportEvent>) {
    while let Some(frame) = from.recv().await {
        if to.send(TransportEvent::Frame(frame)).await.is_err() {
            return;
        }
    }
    let _ = to.send(TransportEvent::Closed(None)).await;
}

/// Raw access to the far end of one session's transport.
pub struct Probe {
    sent: mpsc::UnboundedReceiver<Frame>,
    inject: mpsc::Sender<TransportEvent>,
}

/// A handle for a session under test plus the probe that drives it.
pub fn probe() -> (TransportHandle, Probe) {
    let (outbound, sent) = mpsc::unbounded_channel();
    let (inject, inbound) = mpsc::channel(INBOUND_CAPACITY);
    (
        TransportHandle::new(outbound, inbound, "memory:probe"),
        Probe { sent, inject },
    )
}

impl Probe {
    /// Next frame the session wrote; `None` once it closed the transport.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.sent.recv().await
    }

    pub fn try_next_frame(&mut self) -> Option<Frame> {
        self.sent.try_recv().ok()
    }

    /// Delivers a frame to the session as if the peer sent it.
    pub async fn send(&self, frame: Frame) -> bool {
        self.inject.send(TransportEvent::Frame(frame)).await.is_ok()
    }

    /// Simulates the peer closing the socket.
    pub async fn close(&self) {
        let _ = self.inject.send(TransportEvent::Closed(None)).await;
    }

    pub async fn fail(&self, reason: &str) {
        let _ = self
            .inject
            .send(TransportEvent::Failed(crate::transport::TransportError::WebSocket(
                reason.to_string(),
            )))
            .await;
    }
}
