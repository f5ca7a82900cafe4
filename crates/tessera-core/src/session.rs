//! MCP Session
//!
//! Per-connection protocol state: the initialize handshake, routing of
//! inbound requests to the server, and correlation of responses to
//! requests the server sent to the client.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{McpError, McpResult, TransportResult};
use crate::protocol::messages::{
    ClientCapabilities, CreateMessageRequest, CreateMessageResult, Implementation,
    InitializeRequest, ListRootsResult, LoggingLevel, LoggingMessageNotification,
};
use crate::protocol::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    RequestId, methods, negotiate_protocol_version,
};
use crate::server::Server;
use crate::transport::Transport;

/// How long typed server-to-client requests wait for an answer
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Handshake progress of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing received yet
    Uninitialized,
    /// `initialize` answered, waiting for `notifications/initialized`
    Initializing,
    /// Handshake complete
    Initialized,
    /// Terminal; further input is ignored
    Closed,
}

/// What the client told us during `initialize`
#[derive(Debug, Clone, Default)]
struct ClientDetails {
    info: Option<Implementation>,
    capabilities: ClientCapabilities,
    protocol_version: Option<String>,
}

/// One client connection's protocol state
pub struct Session {
    id: String,
    transport: Arc<dyn Transport>,
    server: Arc<Server>,
    state: Mutex<SessionState>,
    client: Mutex<ClientDetails>,
    log_level: Mutex<LoggingLevel>,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>,
    created_at: DateTime<Utc>,
    this: Weak<Session>,
}

impl Session {
    pub fn new(transport: Arc<dyn Transport>, server: Arc<Server>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: transport.session_id().to_string(),
            transport,
            server,
            state: Mutex::new(SessionState::Uninitialized),
            client: Mutex::new(ClientDetails::default()),
            log_level: Mutex::new(LoggingLevel::default()),
            pending: Mutex::new(HashMap::new()),
            created_at: Utc::now(),
            this: this.clone(),
        })
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn client_info(&self) -> Option<Implementation> {
        self.client.lock().info.clone()
    }

    pub fn client_capabilities(&self) -> ClientCapabilities {
        self.client.lock().capabilities.clone()
    }

    /// Version agreed during `initialize`
    pub fn protocol_version(&self) -> Option<String> {
        self.client.lock().protocol_version.clone()
    }

    pub fn log_level(&self) -> LoggingLevel {
        *self.log_level.lock()
    }

    pub fn set_log_level(&self, level: LoggingLevel) {
        debug!(session_id = %self.id, ?level, "Client log level changed");
        *self.log_level.lock() = level;
    }

    pub(crate) fn downgrade(&self) -> Weak<Session> {
        self.this.clone()
    }

    // ========================================================================
    // INBOUND
    // ========================================================================

    /// Process one inbound message. Requests are always answered.
    pub async fn handle(&self, message: JsonRpcMessage) {
        if self.is_closed() {
            debug!(session_id = %self.id, "Ignoring message for closed session");
            return;
        }

        match message {
            JsonRpcMessage::Request(request) => {
                let response = self.handle_request(request).await;
                if let Err(e) = self.transport.send(response.into()).await {
                    error!(session_id = %self.id, "Failed to send response: {}", e);
                }
            }
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(notification).await
            }
            JsonRpcMessage::Response(response) => self.handle_response(response),
        }
    }

    /// Answer a request without sending the answer anywhere
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;
        debug!(session_id = %self.id, %id, method = %method, "Handling request");

        if method == methods::INITIALIZE {
            return self.handle_initialize(id, params);
        }

        if self.state() == SessionState::Uninitialized && method != methods::PING {
            warn!(session_id = %self.id, method = %method, "Request before initialize");
            return JsonRpcResponse::error(
                Some(id),
                JsonRpcError::invalid_request("Session not initialized"),
            );
        }

        let Some(route) = self.server.route(&method) else {
            warn!(session_id = %self.id, method = %method, "Method not found");
            return JsonRpcResponse::error(Some(id), JsonRpcError::method_not_found(&method));
        };

        let outcome = AssertUnwindSafe(self.server.dispatch(route, params, self))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => JsonRpcResponse::success(Some(id), result),
            Ok(Err(e)) => {
                warn!(session_id = %self.id, method = %method, "Request failed: {}", e);
                JsonRpcResponse::error(Some(id), e.to_jsonrpc_error())
            }
            Err(_) => {
                error!(session_id = %self.id, method = %method, "Handler panicked");
                JsonRpcResponse::error(
                    Some(id),
                    JsonRpcError::internal_error("Handler panicked"),
                )
            }
        }
    }

    fn handle_initialize(&self, id: RequestId, params: Option<Value>) -> JsonRpcResponse {
        let request: InitializeRequest = match self.transport.unmarshal(params) {
            Ok(request) => request,
            Err(e) => return JsonRpcResponse::error(Some(id), e.to_jsonrpc_error()),
        };

        {
            let mut state = self.state.lock();
            if *state != SessionState::Uninitialized {
                warn!(session_id = %self.id, "Duplicate initialize");
                return JsonRpcResponse::error(
                    Some(id),
                    JsonRpcError::invalid_request("Session already initialized"),
                );
            }
            *state = SessionState::Initializing;
        }

        let version =
            negotiate_protocol_version(&request.protocol_version, self.server.protocol_versions());
        info!(
            session_id = %self.id,
            client = %request.client_info.name,
            client_version = %request.client_info.version,
            requested = %request.protocol_version,
            negotiated = %version,
            "Session initializing"
        );

        {
            let mut client = self.client.lock();
            client.info = Some(request.client_info);
            client.capabilities = request.capabilities;
            client.protocol_version = Some(version.clone());
        }

        match serde_json::to_value(self.server.initialize_result(&version)) {
            Ok(result) => JsonRpcResponse::success(Some(id), result),
            Err(e) => JsonRpcResponse::error(
                Some(id),
                JsonRpcError::internal_error(&e.to_string()),
            ),
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            methods::NOTIFICATION_INITIALIZED => {
                let mut state = self.state.lock();
                if *state == SessionState::Initializing {
                    *state = SessionState::Initialized;
                    info!(session_id = %self.id, "Session initialized");
                } else {
                    warn!(session_id = %self.id, state = ?*state, "Unexpected initialized notification");
                }
            }
            methods::NOTIFICATION_CANCELLED => {
                let reason = notification
                    .params
                    .as_ref()
                    .and_then(|p| p.get("reason"))
                    .and_then(Value::as_str)
                    .unwrap_or("none given");
                info!(session_id = %self.id, reason, "Client cancelled, disconnecting");
                self.close().await;
            }
            other => {
                debug!(session_id = %self.id, method = other, "Ignoring notification");
            }
        }
    }

    fn handle_response(&self, response: JsonRpcResponse) {
        let Some(id) = response.id.clone() else {
            debug!(session_id = %self.id, "Discarding response without id");
            return;
        };

        let waiter = self.pending.lock().remove(&id);
        match waiter {
            Some(tx) => {
                if tx.send(response).is_err() {
                    debug!(session_id = %self.id, %id, "Requester stopped waiting");
                }
            }
            None => debug!(session_id = %self.id, %id, "Response for unknown request"),
        }
    }

    // ========================================================================
    // OUTBOUND
    // ========================================================================

    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> TransportResult<()> {
        self.transport
            .send(JsonRpcNotification::new(method, params).into())
            .await
    }

    /// Send a request to the client and register a waiter for its answer.
    ///
    /// Must not be awaited from inside a handler on a transport that feeds
    /// the session serially (stdio), since the answer could never be read.
    pub async fn send_request(&self, method: &str, params: Option<Value>) -> McpResult<PendingRequest> {
        if self.is_closed() {
            return Err(McpError::SessionClosed);
        }

        let (tx, rx) = oneshot::channel();
        let id = {
            let mut pending = self.pending.lock();
            let id = loop {
                let candidate = RequestId::String(Uuid::new_v4().to_string());
                if !pending.contains_key(&candidate) {
                    break candidate;
                }
            };
            pending.insert(id.clone(), tx);
            id
        };

        let request = JsonRpcRequest::new(id.clone(), method, params);
        if let Err(e) = self.transport.send(request.into()).await {
            self.pending.lock().remove(&id);
            return Err(e.into());
        }

        Ok(PendingRequest {
            id,
            receiver: rx,
            session: self.downgrade(),
        })
    }

    /// Ask the client for its filesystem roots
    pub async fn list_roots(&self) -> McpResult<ListRootsResult> {
        if !self.client_capabilities().supports_roots() {
            return Err(McpError::InvalidRequest(
                "Client does not support roots".to_string(),
            ));
        }
        self.typed_request(methods::ROOTS_LIST, Option::<()>::None).await
    }

    /// Ask the client to sample an LLM completion
    pub async fn create_message(&self, request: CreateMessageRequest) -> McpResult<CreateMessageResult> {
        if !self.client_capabilities().supports_sampling() {
            return Err(McpError::InvalidRequest(
                "Client does not support sampling".to_string(),
            ));
        }
        self.typed_request(methods::SAMPLING_CREATE_MESSAGE, Some(request))
            .await
    }

    async fn typed_request<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<P>,
    ) -> McpResult<R> {
        let params = params
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| McpError::Internal(e.to_string()))?;
        let value = self
            .send_request(method, params)
            .await?
            .response_timeout(DEFAULT_REQUEST_TIMEOUT)
            .await?;
        serde_json::from_value(value).map_err(|e| McpError::InvalidParams(e.to_string()))
    }

    /// Emit a `notifications/message` if `level` passes the client's filter
    pub async fn log(&self, level: LoggingLevel, logger: Option<&str>, data: Value) -> TransportResult<()> {
        if level < self.log_level() {
            return Ok(());
        }
        let notification = LoggingMessageNotification {
            level,
            logger: logger.map(str::to_string),
            data,
        };
        self.send_notification(
            methods::NOTIFICATION_MESSAGE,
            serde_json::to_value(notification).ok(),
        )
        .await
    }

    fn forget_request(&self, id: &RequestId) {
        self.pending.lock().remove(id);
    }

    // ========================================================================
    // SHUTDOWN
    // ========================================================================

    /// Close the session and its transport immediately. Idempotent.
    pub async fn close(&self) {
        if self.mark_closed() {
            self.transport.close().await;
        }
    }

    /// Close after flushing queued output. Idempotent.
    pub async fn close_gracefully(&self) {
        if self.mark_closed() {
            self.transport.close_gracefully().await;
        }
    }

    /// Transition to `Closed`; false if already there
    fn mark_closed(&self) -> bool {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Closed {
                return false;
            }
            *state = SessionState::Closed;
        }

        // Dropping the senders wakes every waiter with SessionClosed
        let abandoned = std::mem::take(&mut *self.pending.lock());
        if !abandoned.is_empty() {
            debug!(session_id = %self.id, count = abandoned.len(), "Failing pending requests");
        }
        self.server.forget_session(&self.id);

        let lifetime = Utc::now().signed_duration_since(self.created_at);
        info!(session_id = %self.id, lifetime_secs = lifetime.num_seconds(), "Session closed");
        true
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Waiter for the client's answer to a server-initiated request
#[derive(Debug)]
pub struct PendingRequest {
    id: RequestId,
    receiver: oneshot::Receiver<JsonRpcResponse>,
    session: Weak<Session>,
}

impl PendingRequest {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Wait for the answer with no deadline
    pub async fn response(self) -> McpResult<Value> {
        let response = self.receiver.await.map_err(|_| McpError::SessionClosed)?;
        into_result(response)
    }

    /// Wait for the answer, giving up after `timeout`
    pub async fn response_timeout(self, timeout: Duration) -> McpResult<Value> {
        let Self {
            id,
            receiver,
            session,
        } = self;

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(response)) => into_result(response),
            Ok(Err(_)) => Err(McpError::SessionClosed),
            Err(_) => {
                if let Some(session) = session.upgrade() {
                    session.forget_request(&id);
                }
                Err(McpError::Timeout(id))
            }
        }
    }
}

fn into_result(response: JsonRpcResponse) -> McpResult<Value> {
    if let Some(error) = response.error {
        return Err(McpError::Remote(error));
    }
    Ok(response.result.unwrap_or(Value::Null))
}
