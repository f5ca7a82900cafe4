//! stdio Transport for MCP
//!
//! One session per process: JSON-RPC messages are read line by line from
//! the input stream and written one per line to the output stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tessera_core::error::{TransportError, TransportResult};
use tessera_core::{JsonRpcMessage, Session, SessionFactory, Transport, TransportProvider};

use super::encode_line;

type BoxReader = Box<dyn AsyncBufRead + Unpin + Send>;
type SharedWriter = Arc<tokio::sync::Mutex<Box<dyn AsyncWrite + Unpin + Send>>>;

/// Written when a response cannot be serialized, so the client doesn't hang
const FALLBACK_RESPONSE: &str =
    r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#;

/// stdio Transport Provider for MCP server
pub struct StdioTransportProvider {
    reader: Mutex<Option<BoxReader>>,
    writer: SharedWriter,
    session: OnceLock<Arc<Session>>,
    shutdown: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StdioTransportProvider {
    /// Serve a single session over an arbitrary reader/writer pair
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self {
            reader: Mutex::new(Some(Box::new(BufReader::new(reader)))),
            writer: Arc::new(tokio::sync::Mutex::new(Box::new(writer))),
            session: OnceLock::new(),
            shutdown: Arc::new(Notify::new()),
            task: Mutex::new(None),
        }
    }

    /// Serve over the process's stdin/stdout
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.get().cloned()
    }

    /// Wait for the read loop to finish (EOF, read error or close)
    pub async fn wait(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("stdio read loop failed: {}", e);
            }
        }
    }
}

#[async_trait]
impl TransportProvider for StdioTransportProvider {
    /// Starts the read loop, so it must be called inside a Tokio runtime
    fn set_session_factory(&self, factory: Arc<dyn SessionFactory>) -> TransportResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        let reader = self
            .reader
            .lock()
            .take()
            .ok_or(TransportError::FactoryAlreadySet)?;

        let transport = Arc::new(StdioTransport {
            session_id: Uuid::new_v4().to_string(),
            writer: Arc::clone(&self.writer),
            closed: AtomicBool::new(false),
            shutdown: Arc::clone(&self.shutdown),
        });
        let session = factory.create(transport);
        // The reader was still present, so no session exists yet
        let _ = self.session.set(Arc::clone(&session));

        info!(session_id = %session.id(), "stdio transport started");
        let handle = runtime.spawn(read_loop(reader, session, Arc::clone(&self.shutdown)));
        *self.task.lock() = Some(handle);
        Ok(())
    }

    async fn notify_clients(&self, method: &str, params: Option<Value>) {
        if let Some(session) = self.session() {
            if let Err(e) = session.send_notification(method, params).await {
                warn!(method, "Failed to notify client: {}", e);
            }
        }
    }

    async fn close_gracefully(&self) {
        match self.session() {
            Some(session) => session.close_gracefully().await,
            None => self.shutdown.notify_one(),
        }
    }

    async fn close(&self) {
        match self.session() {
            Some(session) => session.close().await,
            None => self.shutdown.notify_one(),
        }
    }
}

async fn read_loop(reader: BoxReader, session: Arc<Session>, shutdown: Arc<Notify>) {
    let mut lines = reader.lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.notified() => {
                debug!("stdio read loop stopped");
                break;
            }
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("stdin closed");
                break;
            }
            Err(e) => {
                error!("Failed to read line: {}", e);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        debug!("Received: {} bytes", line.len());

        match JsonRpcMessage::parse(line) {
            Ok(message) => session.handle(message).await,
            Err(e) => {
                warn!("Failed to parse message: {}", e);
                if let Some(response) = e.to_error_response() {
                    if let Err(e) = session.transport().send(response.into()).await {
                        error!("Failed to send error response: {}", e);
                    }
                }
            }
        }
    }

    session.close().await;
}

/// Outbound half of the stdio session
struct StdioTransport {
    session_id: String,
    writer: SharedWriter,
    closed: AtomicBool,
    shutdown: Arc<Notify>,
}

#[async_trait]
impl Transport for StdioTransport {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn send(&self, message: JsonRpcMessage) -> TransportResult<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let line = match encode_line(&message) {
            Ok(line) => line,
            Err(e) if matches!(message, JsonRpcMessage::Response(_)) => {
                error!("Failed to serialize response: {}", e);
                FALLBACK_RESPONSE.to_string()
            }
            Err(e) => return Err(e),
        };

        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        debug!("Sent: {} bytes", line.len());
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.shutdown.notify_one();
        }
    }

    async fn close_gracefully(&self) {
        if let Err(e) = self.writer.lock().await.flush().await {
            warn!("Failed to flush stdout: {}", e);
        }
        self.close().await;
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
