//! WebSocket transports: axum on the server side, tokio-tungstenite on the
//! client side. Both are pumped by the same pair of tasks.

use std::fmt::Display;

use axum::extract::ws::{Message as AxumMessage, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::auth::Credentials;
use crate::codec::{Encoding, ENCODING_HEADER};
use crate::transport::{Frame, TransportError, TransportEvent, TransportHandle, INBOUND_CAPACITY};
use crate::version::EtpVersion;

enum Incoming {
    Frame(Frame),
    Close(Option<String>),
    Control,
}

/// Wraps an upgraded axum socket.
pub fn from_axum(socket: WebSocket, peer: impl Into<String>, credentials: Option<Credentials>) -> TransportHandle {
    spawn_pumps(
        socket,
        |frame| match frame {
            Frame::Binary(bytes) => AxumMessage::Binary(bytes.into()),
            Frame::Text(text) => AxumMessage::Text(text.into()),
        },
        |message| match message {
            AxumMessage::Binary(bytes) => Incoming::Frame(Frame::Binary(bytes.to_vec())),
            AxumMessage::Text(text) => Incoming::Frame(Frame::Text(text.as_str().to_owned())),
            AxumMessage::Close(frame) => Incoming::Close(frame.map(|f| f.reason.as_str().to_owned())),
            AxumMessage::Ping(_) | AxumMessage::Pong(_) => Incoming::Control,
        },
        AxumMessage::Close(None),
        peer.into(),
    )
    .with_credentials(credentials)
}

/// Wraps a connected tokio-tungstenite stream.
pub fn from_tungstenite<S>(stream: S, peer: impl Into<String>) -> TransportHandle
where
    S: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>
        + Send
        + Unpin
        + 'static,
{
    spawn_pumps(
        stream,
        |frame| match frame {
            Frame::Binary(bytes) => WsMessage::Binary(bytes.into()),
            Frame::Text(text) => WsMessage::Text(text.into()),
        },
        |message| match message {
            WsMessage::Binary(bytes) => Incoming::Frame(Frame::Binary(bytes.to_vec())),
            WsMessage::Text(text) => Incoming::Frame(Frame::Text(text.as_str().to_owned())),
            WsMessage::Close(frame) => Incoming::Close(frame.map(|f| f.reason.as_str().to_owned())),
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => Incoming::Control,
        },
        WsMessage::Close(None),
        peer.into(),
    )
}

/// Opens a client connection offering exactly one ETP sub-protocol.
pub async fn connect(
    url: &str,
    version: EtpVersion,
    encoding: Encoding,
    credentials: Option<&Credentials>,
) -> Result<TransportHandle, TransportError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| TransportError::Connect(e.to_string()))?;
    let headers = request.headers_mut();
    headers.insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(version.subprotocol()));
    headers.insert(ENCODING_HEADER, HeaderValue::from_static(encoding.as_str()));
    if let Some(credentials) = credentials {
        let value = HeaderValue::from_str(&credentials.to_header_value())
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        headers.insert(AUTHORIZATION, value);
    }

    let (stream, response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    let selected = response
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    if selected.as_deref() != Some(version.subprotocol()) {
        return Err(TransportError::SubprotocolMismatch {
            expected: version.subprotocol(),
            selected,
        });
    }

    tracing::debug!(url, version = %version, encoding = %encoding, "websocket connected");
    Ok(from_tungstenite(stream, url.to_string()).with_credentials(credentials.cloned()))
}

fn spawn_pumps<S, M, E>(
    socket: S,
    encode: fn(Frame) -> M,
    decode: fn(M) -> Incoming,
    close: M,
    peer: String,
) -> TransportHandle
where
    S: Stream<Item = Result<M, E>> + Sink<M> + Send + 'static,
    <S as Sink<M>>::Error: Display + Send,
    M: Send + 'static,
    E: Display + Send + 'static,
{
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();
    let (inbound_tx, inbound) = mpsc::channel(INBOUND_CAPACITY);
    let (mut sink, mut stream) = socket.split();

    let writer_peer = peer.clone();
    tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = sink.send(encode(frame)).await {
                tracing::debug!(peer = %writer_peer, error = %e, "websocket write failed");
                return;
            }
        }
        // Session dropped its sender: close the socket.
        let _ = sink.send(close).await;
        let _ = sink.close().await;
    });

    let reader_peer = peer.clone();
    tokio::spawn(async move {
        while let Some(next) = stream.next().await {
            let event = match next {
                Ok(message) => match decode(message) {
                    Incoming::Frame(frame) => TransportEvent::Frame(frame),
                    Incoming::Close(reason) => {
                        let _ = inbound_tx.send(TransportEvent::Closed(reason)).await;
                        return;
                    }
                    Incoming::Control => continue,
                },
                Err(e) => {
                    tracing::debug!(peer = %reader_peer, error = %e, "websocket read failed");
                    let _ = inbound_tx
                        .send(TransportEvent::Failed(TransportError::WebSocket(e.to_string())))
                        .await;
                    return;
                }
            };
            if inbound_tx.send(event).await.is_err() {
                return;
            }
        }
        let _ = inbound_tx.send(TransportEvent::Closed(None)).await;
    });

    TransportHandle::new(outbound, inbound, peer)
}
