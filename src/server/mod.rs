//! WebSocket server hosting one ETP session per connection.
//!
//! # Data Flow
//! ```text
//! HTTP upgrade request
//!     → admission (connection limit)          503 when full
//!     → Sec-WebSocket-Protocol selection      400 when nothing acceptable
//!     → etp-encoding                          400 when unknown
//!     → Authorization                         401 + WWW-Authenticate
//!     → upgrade → Session (server side) → attach → wait for close
//! ```
//!
//! # Design Decisions
//! - Each connection gets a fresh registry from the factory closure
//! - Reloaded configuration applies to connections accepted afterwards
//! - Shutdown closes every live session with CloseSession before the
//!   listener stops

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::auth::{authenticate, challenge, Credentials};
use crate::capabilities::EndpointDescriptor;
use crate::codec::{Encoding, ENCODING_HEADER};
use crate::config::{EtpConfig, TlsConfig};
use crate::lifecycle::Shutdown;
use crate::registry::HandlerRegistry;
use crate::session::{Session, SessionOptions, SessionPhase};
use crate::transport::connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
use crate::transport::websocket;
use crate::version::{select_subprotocol, EtpVersion};

/// Builds the handler set for a new connection.
pub type RegistryFactory = Arc<dyn Fn() -> HandlerRegistry + Send + Sync>;

const SHUTDOWN_REASON: &str = "server shutting down";

/// ETP WebSocket server. Cheap to clone.
#[derive(Clone)]
pub struct EtpServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    config: Arc<ArcSwap<EtpConfig>>,
    factory: RegistryFactory,
    sessions: DashMap<ConnectionId, Session>,
    connections: ConnectionTracker,
}

impl EtpServer {
    pub fn new<F>(config: EtpConfig, factory: F) -> Self
    where
        F: Fn() -> HandlerRegistry + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(ServerInner {
                config: Arc::new(ArcSwap::from_pointee(config)),
                factory: Arc::new(factory),
                sessions: DashMap::new(),
                connections: ConnectionTracker::new(),
            }),
        }
    }

    /// Live configuration; stores here apply to the next connection.
    pub fn config_handle(&self) -> Arc<ArcSwap<EtpConfig>> {
        self.inner.config.clone()
    }

    pub fn active_sessions(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.inner.sessions.iter().map(|e| e.value().clone()).collect()
    }

    /// Closes every live session and waits for all of them.
    pub async fn close_all(&self, reason: &str) {
        let sessions = self.sessions();
        if sessions.is_empty() {
            return;
        }
        tracing::info!(sessions = sessions.len(), reason, "closing all sessions");
        join_all(sessions.iter().map(|session| session.close(reason))).await;
    }

    pub fn router(&self) -> Router {
        let path = self.inner.config.load().listener.path.clone();
        Router::new()
            .route(&path, get(upgrade))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    /// Serves plain `ws://` on an already bound listener until `shutdown`
    /// fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> io::Result<()> {
        let address = listener.local_addr()?;
        tracing::info!(address = %address, path = %self.inner.config.load().listener.path, "ETP server listening");

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        let server = self.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.wait().await;
                server.close_all(SHUTDOWN_REASON).await;
            })
            .await?;

        tracing::info!("ETP server stopped");
        Ok(())
    }

    /// Serves `wss://` with rustls until `shutdown` fires.
    pub async fn run_tls(self, address: SocketAddr, tls: &TlsConfig, shutdown: Shutdown) -> io::Result<()> {
        let rustls = axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path).await?;
        let handle = axum_server::Handle::new();

        let server = self.clone();
        let stopper = handle.clone();
        tokio::spawn(async move {
            shutdown.wait().await;
            server.close_all(SHUTDOWN_REASON).await;
            stopper.graceful_shutdown(Some(server.inner.config.load().session.open_timeout()));
        });

        tracing::info!(address = %address, "ETP server listening (tls)");
        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind_rustls(address, rustls).handle(handle).serve(app).await?;

        tracing::info!("ETP server stopped");
        Ok(())
    }

    async fn serve_session(
        self,
        socket: WebSocket,
        peer: SocketAddr,
        version: EtpVersion,
        encoding: Encoding,
        credentials: Option<Credentials>,
        guard: ConnectionGuard,
    ) {
        let config = self.inner.config.load_full();
        let options = SessionOptions::server(version, encoding)
            .with_endpoint(EndpointDescriptor::from_config(&config.endpoint))
            .with_config(config.session.clone());

        let session = match Session::new(options, (self.inner.factory)()) {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(connection = %guard.id(), error = %e, "could not create session");
                return;
            }
        };
        let transport = websocket::from_axum(socket, peer.to_string(), credentials);
        let reader = match session.attach(transport) {
            Ok(reader) => reader,
            Err(e) => {
                tracing::error!(connection = %guard.id(), error = %e, "could not attach session");
                return;
            }
        };
        self.inner.sessions.insert(session.id(), session.clone());

        let watchdog = {
            let session = session.clone();
            let open_timeout = config.session.open_timeout();
            tokio::spawn(async move {
                tokio::time::sleep(open_timeout).await;
                if session.phase() == SessionPhase::Opening {
                    tracing::warn!(session = %session.id(), "no RequestSession before the open timeout");
                    session.close("open timeout").await;
                }
            })
        };

        session.closed().await;
        watchdog.abort();
        let _ = reader.await;
        self.inner.sessions.remove(&session.id());
        tracing::debug!(connection = %guard.id(), session = %session.id(), "connection finished");
    }
}

/// Validates the upgrade request and hands the socket to a session.
async fn upgrade(
    State(server): State<EtpServer>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let config = server.inner.config.load_full();

    let Some(guard) = server.inner.connections.try_admit(config.listener.max_connections) else {
        tracing::warn!(peer = %peer, limit = config.listener.max_connections, "connection refused: limit reached");
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    };

    let offered = headers
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let Some(version) = select_subprotocol(offered) else {
        tracing::warn!(peer = %peer, offered, "no supported ETP sub-protocol offered");
        return (StatusCode::BAD_REQUEST, "no supported ETP sub-protocol offered").into_response();
    };

    let encoding = match headers.get(ENCODING_HEADER).map(|v| v.to_str()) {
        None => Encoding::default(),
        Some(Ok(value)) => match value.parse::<Encoding>() {
            Ok(encoding) => encoding,
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        },
        Some(Err(_)) => return (StatusCode::BAD_REQUEST, "invalid etp-encoding header").into_response(),
    };

    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let credentials = match authenticate(&config.auth, authorization) {
        Ok(credentials) => credentials,
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "authentication failed");
            let mut response = (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
            if let Some(value) = challenge(config.auth.mode) {
                response
                    .headers_mut()
                    .insert(WWW_AUTHENTICATE, HeaderValue::from_static(value));
            }
            return response;
        }
    };

    tracing::debug!(
        connection = %guard.id(),
        peer = %peer,
        version = %version,
        encoding = %encoding,
        principal = credentials.as_ref().map(Credentials::principal).unwrap_or("anonymous"),
        "upgrading connection"
    );
    let max_message_size = usize::try_from(config.endpoint.max_message_size).unwrap_or(usize::MAX);
    ws.protocols([version.subprotocol()])
        .max_message_size(max_message_size)
        .on_upgrade(move |socket| server.serve_session(socket, peer, version, encoding, credentials, guard))
}
