//! Test Harness
//!
//! Runs a server on the in-memory transport and drives it with scripted
//! clients, one session per client.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tessera_core::prelude::*;
use tessera_core::protocol::{JsonRpcError, JsonRpcNotification};
use tessera_core::protocol::methods;

use crate::fixtures;

/// How long a client waits for an expected message
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// A server bound to an in-memory transport provider
pub struct TestHarness {
    pub provider: Arc<MemoryTransportProvider>,
    pub server: McpServer,
}

impl TestHarness {
    pub fn new(config: ServerConfig) -> Self {
        let provider = Arc::new(MemoryTransportProvider::new());
        let server = McpServer::new(config, provider.clone()).expect("bind server to provider");
        Self { provider, server }
    }

    /// Server with every fixture component registered
    pub fn with_fixtures() -> Self {
        let harness = Self::new(fixtures::server_config());
        fixtures::install(harness.server.server());
        harness
    }

    pub fn connect(&self) -> TestClient {
        TestClient {
            connection: self.provider.connect().expect("open session"),
            next_id: 1,
        }
    }

    /// Connect and complete the handshake
    pub async fn connect_initialized(&self) -> TestClient {
        let mut client = self.connect();
        client.initialize().await;
        client
    }
}

/// Scripted MCP client with its own id counter
pub struct TestClient {
    connection: ClientConnection,
    next_id: i64,
}

impl TestClient {
    pub fn session(&self) -> &Arc<Session> {
        self.connection.session()
    }

    /// Send a request and wait for its response
    pub async fn request(&mut self, method: &str, params: Value) -> JsonRpcResponse {
        let id = self.next_id;
        self.next_id += 1;
        tokio::time::timeout(
            RECV_TIMEOUT,
            self.connection.request(id, method, Some(params)),
        )
        .await
        .expect("response in time")
        .expect("connection open")
    }

    /// Send a request that must succeed and return its result
    pub async fn call(&mut self, method: &str, params: Value) -> Value {
        let response = self.request(method, params).await;
        match (response.result, response.error) {
            (Some(result), None) => result,
            (_, error) => panic!("{} failed: {:?}", method, error),
        }
    }

    /// Send a request that must fail and return the error code
    pub async fn error_code(&mut self, method: &str, params: Value) -> i32 {
        let response = self.request(method, params).await;
        response
            .error
            .unwrap_or_else(|| panic!("{} unexpectedly succeeded", method))
            .code
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) {
        self.connection
            .send(JsonRpcNotification::new(method, params))
            .await;
    }

    /// Reply to a server-initiated request
    pub async fn respond(&self, id: RequestId, result: Value) {
        self.connection
            .send(JsonRpcResponse::success(Some(id), result))
            .await;
    }

    /// Reject a server-initiated request
    pub async fn send_error(&self, id: RequestId, code: i32, message: &str) {
        let error = JsonRpcError {
            code,
            message: message.to_string(),
            data: None,
        };
        self.connection
            .send(JsonRpcResponse::error(Some(id), error))
            .await;
    }

    pub async fn initialize(&mut self) -> Value {
        self.initialize_with("2024-11-05", json!({})).await
    }

    /// `initialize` with the given version and capabilities, then `initialized`
    pub async fn initialize_with(&mut self, version: &str, capabilities: Value) -> Value {
        let result = self
            .call(
                methods::INITIALIZE,
                json!({
                    "protocolVersion": version,
                    "capabilities": capabilities,
                    "clientInfo": {"name": "e2e-client", "version": "0.1.0"}
                }),
            )
            .await;
        self.notify(methods::NOTIFICATION_INITIALIZED, None).await;
        result
    }

    /// Next message from the server
    pub async fn next_message(&mut self) -> JsonRpcMessage {
        tokio::time::timeout(RECV_TIMEOUT, self.connection.recv())
            .await
            .expect("message in time")
            .expect("connection open")
    }

    /// Next message, which must be a notification
    pub async fn next_notification(&mut self) -> JsonRpcNotification {
        match self.next_message().await {
            JsonRpcMessage::Notification(notification) => notification,
            other => panic!("expected a notification, got {:?}", other),
        }
    }

    /// Next message, which must be a request
    pub async fn next_request(&mut self) -> JsonRpcRequest {
        match self.next_message().await {
            JsonRpcMessage::Request(request) => request,
            other => panic!("expected a request, got {:?}", other),
        }
    }

    /// Messages already delivered but not yet read
    pub fn pending_messages(&mut self) -> Vec<JsonRpcMessage> {
        std::iter::from_fn(|| self.connection.try_recv()).collect()
    }
}
