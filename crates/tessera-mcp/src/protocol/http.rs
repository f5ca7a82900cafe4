//! HTTP + SSE Transport for MCP
//!
//! Each `GET` on the SSE path opens a session whose outbound messages are
//! streamed as Server-Sent Events. Clients deliver their messages with
//! `POST`s to the message path, naming the session.
//!
//! Endpoints:
//! - GET /sse: event stream; the first `endpoint` event carries the POST URL
//! - POST /message?sessionId=<id>: one JSON-RPC message per request

use std::convert::Infallible;
use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        IntoResponse, Response, Sse,
        sse::{Event, KeepAlive},
    },
    routing::{get, post},
};
use futures::{Stream, StreamExt, stream};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, mpsc, watch};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tessera_core::error::{TransportError, TransportResult};
use tessera_core::{
    JsonRpcMessage, Session, SessionFactory, SessionRegistry, Transport, TransportProvider,
};

use super::encode_line;

/// Header that may carry the session id instead of the query parameter
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

/// Events queued per stream before a slow client is dropped
pub const EVENT_BUFFER: usize = 256;

/// Configuration for the HTTP transport
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub host: String,
    pub port: u16,
    pub sse_path: String,
    pub message_path: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3100,
            sse_path: "/sse".to_string(),
            message_path: "/message".to_string(),
        }
    }
}

/// Shared application state
struct AppState {
    /// Session store: session_id → Session
    sessions: SessionRegistry,
    factory: OnceLock<Arc<dyn SessionFactory>>,
    message_path: String,
}

/// HTTP Transport Provider for MCP server
pub struct HttpTransportProvider {
    config: HttpTransportConfig,
    state: Arc<AppState>,
    shutdown: Arc<Notify>,
}

impl HttpTransportProvider {
    pub fn new(config: HttpTransportConfig) -> Self {
        let state = Arc::new(AppState {
            sessions: SessionRegistry::new(),
            factory: OnceLock::new(),
            message_path: config.message_path.clone(),
        });
        Self {
            config,
            state,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    pub fn session(&self, id: &str) -> Option<Arc<Session>> {
        self.state.sessions.get(id)
    }

    pub fn session_count(&self) -> usize {
        self.state.sessions.len()
    }

    /// Routes for the SSE and message endpoints
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.config.sse_path, get(handle_sse))
            .route(&self.config.message_path, post(handle_message))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state))
    }

    /// Run the HTTP MCP server until Ctrl+C, SIGTERM or provider close
    pub async fn serve(&self) -> Result<(), std::io::Error> {
        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        info!(
            "MCP HTTP server listening on http://{}{}",
            listener.local_addr()?,
            self.config.sse_path
        );

        let shutdown = Arc::clone(&self.shutdown);
        let state = Arc::clone(&self.state);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = shutdown_signal() => {}
                    _ = shutdown.notified() => info!("Transport closed, shutting down"),
                }
                // Open event streams would otherwise hold the server up
                state.sessions.close_all_gracefully().await;
            })
            .await?;

        info!("MCP HTTP server shutting down");
        Ok(())
    }
}

#[async_trait]
impl TransportProvider for HttpTransportProvider {
    fn set_session_factory(&self, factory: Arc<dyn SessionFactory>) -> TransportResult<()> {
        self.state
            .factory
            .set(factory)
            .map_err(|_| TransportError::FactoryAlreadySet)
    }

    async fn notify_clients(&self, method: &str, params: Option<Value>) {
        self.state.sessions.broadcast(method, params).await;
    }

    async fn close_gracefully(&self) {
        self.state.sessions.close_all_gracefully().await;
        self.shutdown.notify_one();
    }

    async fn close(&self) {
        self.state.sessions.close_all().await;
        self.shutdown.notify_one();
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /sse: Open an event stream bound to a new session
async fn handle_sse(State(state): State<Arc<AppState>>) -> Response {
    let Some(factory) = state.factory.get().cloned() else {
        warn!("SSE connection before a server was bound");
        return (StatusCode::SERVICE_UNAVAILABLE, "Server not ready").into_response();
    };

    let session_id = Uuid::new_v4().to_string();
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let (kill_tx, kill_rx) = watch::channel(false);

    let transport = Arc::new(SseTransport {
        session_id: session_id.clone(),
        events: Mutex::new(Some(events_tx)),
        kill: kill_tx,
        sessions: state.sessions.clone(),
    });
    let session = factory.create(transport);
    state.sessions.insert(Arc::clone(&session));
    info!(session_id = %session_id, "SSE client connected");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("{}?sessionId={}", state.message_path, session_id));
    let guard = DisconnectGuard {
        session: Arc::downgrade(&session),
    };

    (
        [(MCP_SESSION_ID_HEADER, session_id)],
        Sse::new(event_stream(endpoint, events_rx, kill_rx, guard)).keep_alive(KeepAlive::default()),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// POST /message: Hand one JSON-RPC message to its session
async fn handle_message(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessageQuery>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let session_id = query.session_id.or_else(|| {
        headers
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });

    let Some(session_id) = session_id else {
        warn!("POST without a session id");
        return (StatusCode::BAD_REQUEST, "Missing sessionId").into_response();
    };

    let Some(session) = state.sessions.get(&session_id) else {
        warn!(session_id = %session_id, "POST for unknown session");
        return (StatusCode::NOT_FOUND, "Session not found").into_response();
    };

    match JsonRpcMessage::parse(&body) {
        Ok(message) => {
            session.handle(message).await;
            StatusCode::OK.into_response()
        }
        Err(e) => {
            warn!(session_id = %session_id, "Failed to parse message: {}", e);
            if let Some(response) = e.to_error_response() {
                if let Err(e) = session.transport().send(response.into()).await {
                    error!(session_id = %session_id, "Failed to send error response: {}", e);
                }
            }
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

// ============================================================================
// EVENT STREAM
// ============================================================================

/// Endpoint event, then session messages until the transport closes
fn event_stream(
    endpoint: Event,
    events: mpsc::Receiver<Event>,
    kill: watch::Receiver<bool>,
    guard: DisconnectGuard,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let messages = stream::unfold((events, guard), |(mut events, guard)| async move {
        events
            .recv()
            .await
            .map(|event| (Ok(event), (events, guard)))
    });

    stream::once(async move { Ok(endpoint) })
        .chain(messages)
        .take_until(killed(kill))
}

/// Resolves once a hard close was requested
async fn killed(mut kill: watch::Receiver<bool>) {
    loop {
        if *kill.borrow_and_update() {
            return;
        }
        if kill.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Closes the session when the client goes away
struct DisconnectGuard {
    session: Weak<Session>,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.upgrade() else {
            return;
        };
        if session.is_closed() {
            return;
        }
        info!(session_id = %session.id(), "SSE client disconnected");
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move { session.close().await });
        }
    }
}

/// Outbound half of one SSE session
struct SseTransport {
    session_id: String,
    events: Mutex<Option<mpsc::Sender<Event>>>,
    kill: watch::Sender<bool>,
    sessions: SessionRegistry,
}

#[async_trait]
impl Transport for SseTransport {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn send(&self, message: JsonRpcMessage) -> TransportResult<()> {
        let line = encode_line(&message)?;
        debug!(session_id = %self.session_id, "Sending: {} bytes", line.len());

        let event = Event::default().event("message").data(line);
        let sent = {
            let events = self.events.lock();
            let tx = events.as_ref().ok_or(TransportError::Closed)?;
            tx.try_send(event)
        };

        match sent {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(TransportError::Closed),
            Err(TrySendError::Full(_)) => {
                warn!(
                    session_id = %self.session_id,
                    "Client stopped reading after {} queued events, dropping stream",
                    EVENT_BUFFER
                );
                self.close().await;
                Err(TransportError::Unavailable("event buffer full".to_string()))
            }
        }
    }

    async fn close(&self) {
        self.events.lock().take();
        self.kill.send_replace(true);
        self.sessions.remove(&self.session_id);
    }

    async fn close_gracefully(&self) {
        // Queued events still drain before the stream ends
        self.events.lock().take();
        self.sessions.remove(&self.session_id);
    }

    fn is_closed(&self) -> bool {
        self.events.lock().is_none()
    }
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
