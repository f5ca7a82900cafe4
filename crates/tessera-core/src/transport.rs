//! Transport abstraction
//!
//! A [`Transport`] is the outbound half of one client connection: the
//! session pushes messages through it. A [`TransportProvider`] accepts
//! connections, asks its [`SessionFactory`] for a [`Session`] per
//! connection, and feeds inbound messages to that session.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::error::{McpResult, TransportResult};
use crate::protocol::{self, JsonRpcMessage};
use crate::session::Session;

/// Outbound half of one client connection
#[async_trait]
pub trait Transport: Send + Sync {
    /// Id of the session this transport belongs to
    fn session_id(&self) -> &str;

    /// Deliver one message to the client
    async fn send(&self, message: JsonRpcMessage) -> TransportResult<()>;

    /// Terminate immediately. Unsent messages may be lost.
    async fn close(&self);

    /// Flush whatever is queued, then terminate
    async fn close_gracefully(&self);

    fn is_closed(&self) -> bool;
}

impl dyn Transport {
    /// Decode request params with this transport's serializer
    pub fn unmarshal<T: DeserializeOwned>(&self, params: Option<Value>) -> McpResult<T> {
        protocol::unmarshal(params)
    }
}

/// Creates one session per accepted connection
pub trait SessionFactory: Send + Sync {
    fn create(&self, transport: Arc<dyn Transport>) -> Arc<Session>;
}

impl<F> SessionFactory for F
where
    F: Fn(Arc<dyn Transport>) -> Arc<Session> + Send + Sync,
{
    fn create(&self, transport: Arc<dyn Transport>) -> Arc<Session> {
        (self)(transport)
    }
}

/// Accepts connections and owns their sessions
#[async_trait]
pub trait TransportProvider: Send + Sync {
    /// Bind the factory used for new connections. Set exactly once.
    fn set_session_factory(&self, factory: Arc<dyn SessionFactory>) -> TransportResult<()>;

    /// Send a notification to every live session
    async fn notify_clients(&self, method: &str, params: Option<Value>);

    /// Close every session gracefully and stop accepting connections
    async fn close_gracefully(&self);

    /// Close every session immediately and stop accepting connections
    async fn close(&self);
}

/// Live sessions of one provider, keyed by session id
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<Session>) {
        self.sessions.insert(session.id().to_string(), session);
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|s| Arc::clone(s.value()))
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Point-in-time copy, safe to iterate while sessions come and go
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|s| Arc::clone(s.value())).collect()
    }

    /// Notify every session, logging failures instead of aborting
    pub async fn broadcast(&self, method: &str, params: Option<Value>) {
        for session in self.snapshot() {
            if let Err(e) = session.send_notification(method, params.clone()).await {
                warn!(session_id = %session.id(), method, "Failed to notify client: {}", e);
            }
        }
    }

    pub async fn close_all(&self) {
        for session in self.snapshot() {
            session.close().await;
        }
    }

    pub async fn close_all_gracefully(&self) {
        for session in self.snapshot() {
            session.close_gracefully().await;
        }
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
