//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use etp_devkit::codec::{Encoding, MessageCodec, MessageFlags, MessageHeader};
use etp_devkit::handlers::{customer_registry, store_registry, MemoryStore};
use etp_devkit::messages::{EtpMessage, MessageBody};
use etp_devkit::registry::HandlerRegistry;
use etp_devkit::transport::{memory, Frame};
use etp_devkit::version::{adapter_for, EtpVersion};
use etp_devkit::{Session, SessionOptions};

pub const STEP: Duration = Duration::from_secs(5);

/// Two sessions over an in-memory transport, opened through the handshake.
pub struct Connected {
    pub client: Session,
    pub server: Session,
}

pub async fn connect(
    version: EtpVersion,
    encoding: Encoding,
    client_registry: HandlerRegistry,
    server_registry: HandlerRegistry,
) -> Connected {
    let (client_side, server_side) = memory::pair();
    let server = Session::new(SessionOptions::server(version, encoding), server_registry).unwrap();
    server.attach(server_side).unwrap();

    let client = Session::new(SessionOptions::client(version, encoding), client_registry).unwrap();
    client.attach(client_side).unwrap();
    within(client.open()).await.unwrap();
    eventually(|| server.is_open()).await;

    Connected { client, server }
}

/// Customer-side client against the sample store handlers.
pub async fn connect_to_store(version: EtpVersion, encoding: Encoding, store: Arc<MemoryStore>) -> Connected {
    connect(version, encoding, customer_registry(), store_registry(store, 10_000)).await
}

pub fn codec(version: EtpVersion, encoding: Encoding) -> MessageCodec {
    MessageCodec::new(adapter_for(version).as_ref(), encoding)
}

/// Encodes `body` with the catalog's protocol and message type.
pub fn frame(
    codec: &MessageCodec,
    version: EtpVersion,
    message_id: i64,
    correlation_id: i64,
    flags: MessageFlags,
    body: impl Into<MessageBody>,
) -> Frame {
    let body = body.into();
    let entry = adapter_for(version).catalog().entry(body.kind()).unwrap();
    let header = MessageHeader::new(entry.protocol, entry.message_type, correlation_id, flags)
        .with_message_id(message_id);
    codec.encode(&EtpMessage::new(header, body)).unwrap()
}

pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(STEP, future).await.expect("timed out")
}

/// Polls `condition` until it holds or the step timeout elapses.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}
