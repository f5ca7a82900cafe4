//! In-process transport
//!
//! Connects a client to a server through channels, with no I/O. Used by
//! tests and by hosts that embed a server in the same process as its client.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{McpResult, TransportError, TransportResult};
use crate::protocol::{JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId};
use crate::session::Session;
use crate::transport::{SessionFactory, SessionRegistry, Transport, TransportProvider};

/// Provider whose connections are opened by calling [`MemoryTransportProvider::connect`]
#[derive(Default)]
pub struct MemoryTransportProvider {
    factory: OnceLock<Arc<dyn SessionFactory>>,
    sessions: SessionRegistry,
}

impl MemoryTransportProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new client connection with its own session
    pub fn connect(&self) -> TransportResult<ClientConnection> {
        let factory = self.factory.get().ok_or(TransportError::NoSessionFactory)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(MemoryTransport {
            session_id: Uuid::new_v4().to_string(),
            outbound: Mutex::new(Some(tx)),
            sessions: self.sessions.clone(),
        });

        let session = factory.create(transport);
        self.sessions.insert(Arc::clone(&session));
        debug!(session_id = %session.id(), "In-memory client connected");

        Ok(ClientConnection { session, inbox: rx })
    }

    pub fn session(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[async_trait]
impl TransportProvider for MemoryTransportProvider {
    fn set_session_factory(&self, factory: Arc<dyn SessionFactory>) -> TransportResult<()> {
        self.factory
            .set(factory)
            .map_err(|_| TransportError::FactoryAlreadySet)
    }

    async fn notify_clients(&self, method: &str, params: Option<Value>) {
        self.sessions.broadcast(method, params).await;
    }

    async fn close_gracefully(&self) {
        self.sessions.close_all_gracefully().await;
    }

    async fn close(&self) {
        self.sessions.close_all().await;
    }
}

impl std::fmt::Debug for MemoryTransportProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransportProvider")
            .field("sessions", &self.sessions)
            .field("bound", &self.factory.get().is_some())
            .finish()
    }
}

/// Server-side transport of one in-memory connection
pub struct MemoryTransport {
    session_id: String,
    outbound: Mutex<Option<mpsc::UnboundedSender<JsonRpcMessage>>>,
    sessions: SessionRegistry,
}

impl MemoryTransport {
    fn shutdown(&self) {
        self.outbound.lock().take();
        self.sessions.remove(&self.session_id);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn send(&self, message: JsonRpcMessage) -> TransportResult<()> {
        let outbound = self.outbound.lock();
        let tx = outbound.as_ref().ok_or(TransportError::Closed)?;
        tx.send(message).map_err(|_| TransportError::Closed)
    }

    async fn close(&self) {
        self.shutdown();
    }

    // Channel delivery is immediate, so nothing is ever left to flush
    async fn close_gracefully(&self) {
        self.shutdown();
    }

    fn is_closed(&self) -> bool {
        self.outbound.lock().is_none()
    }
}

/// Client end of an in-memory connection
#[derive(Debug)]
pub struct ClientConnection {
    session: Arc<Session>,
    inbox: mpsc::UnboundedReceiver<JsonRpcMessage>,
}

impl ClientConnection {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Deliver a message to the server and wait until it has been processed
    pub async fn send(&self, message: impl Into<JsonRpcMessage>) {
        self.session.handle(message.into()).await;
    }

    /// Next message the server sent, or `None` once the connection closed
    pub async fn recv(&mut self) -> Option<JsonRpcMessage> {
        self.inbox.recv().await
    }

    pub fn try_recv(&mut self) -> Option<JsonRpcMessage> {
        self.inbox.try_recv().ok()
    }

    /// Send a request and return the response carrying its id.
    ///
    /// Other messages that arrive first are discarded.
    pub async fn request(
        &mut self,
        id: impl Into<RequestId>,
        method: &str,
        params: Option<Value>,
    ) -> McpResult<JsonRpcResponse> {
        let id = id.into();
        self.send(JsonRpcRequest::new(id.clone(), method, params))
            .await;

        while let Some(message) = self.recv().await {
            if let JsonRpcMessage::Response(response) = message {
                if response.id.as_ref() == Some(&id) {
                    return Ok(response);
                }
            }
        }
        Err(TransportError::Closed.into())
    }
}
