//! Error types
//!
//! Parse failures, transport failures, handler failures and the top-level
//! [`McpError`] that every dispatch path maps onto a JSON-RPC error object.

use crate::protocol::types::{JsonRpcError, JsonRpcResponse, RequestId};

/// Failure to turn wire text into a [`crate::protocol::JsonRpcMessage`]
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported JSON-RPC version: {}", found.as_deref().unwrap_or("<missing>"))]
    UnsupportedVersion {
        found: Option<String>,
        id: Option<RequestId>,
    },

    #[error("Invalid JSON-RPC message: {reason}")]
    InvalidShape {
        id: Option<RequestId>,
        reason: String,
    },
}

impl ParseError {
    /// Id recovered from the offending message, if any
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::Json(_) => None,
            Self::UnsupportedVersion { id, .. } | Self::InvalidShape { id, .. } => id.as_ref(),
        }
    }

    /// Error response worth sending back to the peer.
    ///
    /// Only well-formed JSON with a recoverable id gets an answer; anything
    /// else has nobody to correlate with and is dropped by the transports.
    pub fn to_error_response(&self) -> Option<JsonRpcResponse> {
        let id = self.request_id()?.clone();
        Some(JsonRpcResponse::error(
            Some(id),
            JsonRpcError::invalid_request(&self.to_string()),
        ))
    }
}

/// Transport-level failures
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport closed")]
    Closed,

    #[error("Session factory already set")]
    FactoryAlreadySet,

    #[error("No session factory has been set")]
    NoSessionFactory,

    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported by a tool, resource or prompt handler
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    /// Caller-supplied arguments were unusable
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The handler broke
    #[error("Handler failed: {0}")]
    Failed(String),

    /// Domain-level refusal
    #[error("{0}")]
    Application(String),
}

impl HandlerError {
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn application(message: impl Into<String>) -> Self {
        Self::Application(message.into())
    }
}

/// Top-level error type
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Application(String),

    /// Error object returned by the peer for a server-initiated request
    #[error("Peer returned error: {0}")]
    Remote(JsonRpcError),

    #[error("Request {0} timed out")]
    Timeout(RequestId),

    #[error("Session closed")]
    SessionClosed,
}

impl McpError {
    /// JSON-RPC error object to answer a failed request with
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        match self {
            Self::Parse(ParseError::Json(_)) => JsonRpcError::parse_error(),
            Self::Parse(e) => JsonRpcError::invalid_request(&e.to_string()),
            Self::Handler(HandlerError::InvalidArguments(msg)) => JsonRpcError::invalid_params(msg),
            Self::Handler(HandlerError::Failed(msg)) => JsonRpcError::internal_error(msg),
            Self::Handler(HandlerError::Application(msg)) => JsonRpcError::application(msg),
            Self::MethodNotFound(method) => JsonRpcError::method_not_found(method),
            Self::InvalidParams(msg) => JsonRpcError::invalid_params(msg),
            Self::InvalidRequest(msg) => JsonRpcError::invalid_request(msg),
            Self::Application(msg) => JsonRpcError::application(msg),
            Self::Remote(error) => error.clone(),
            Self::Transport(_) | Self::Internal(_) | Self::Timeout(_) | Self::SessionClosed => {
                JsonRpcError::internal_error(&self.to_string())
            }
        }
    }
}

pub type McpResult<T> = std::result::Result<T, McpError>;
pub type HandlerResult<T> = std::result::Result<T, HandlerError>;
pub type TransportResult<T> = std::result::Result<T, TransportError>;
